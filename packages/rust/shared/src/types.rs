//! Domain types shared across staffsync crates.
//!
//! These types define the roster input, the staff output document
//! (`canvas-staff.json`), and the persisted bio store (`instructor-bio.json`).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Course name used when the upstream course has no name.
pub const DEFAULT_COURSE_NAME: &str = "CSE 140";

/// Placeholder bio for instructors without biography content.
pub const FALLBACK_BIO: &str = "Bio not available for this instructor.";

/// Display name used for members the upstream reports without a name.
pub const UNKNOWN_NAME: &str = "Unknown";

// ---------------------------------------------------------------------------
// Roster input
// ---------------------------------------------------------------------------

/// Normalized privilege level reported alongside the free-text enrollment label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleHint {
    Owner,
    Admin,
    Grader,
    Student,
    Observer,
}

impl RoleHint {
    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Grader => "grader",
            Self::Student => "student",
            Self::Observer => "observer",
        }
    }
}

impl fmt::Display for RoleHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One upstream roster entry, immutable as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: String,
    pub name: String,
    /// Free-text enrollment label, e.g. `TeacherEnrollment` or `Reader`.
    pub raw_role: String,
    pub hint: Option<RoleHint>,
    /// Possibly empty.
    pub email: String,
}

/// A resolved upstream course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    pub id: String,
    pub name: Option<String>,
}

impl Course {
    /// Course name, or `fallback` when the upstream name is absent or blank.
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => fallback,
        }
    }
}

/// A parsed course identifier, ready to be put into an API path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CourseQuery {
    /// Numeric Canvas course id.
    Id(u64),
    /// Institution-assigned SIS course id.
    Sis(String),
}

impl CourseQuery {
    /// Path segment used in `/api/v1/courses/{segment}`.
    pub fn path_segment(&self) -> String {
        match self {
            Self::Id(id) => id.to_string(),
            Self::Sis(sis) => format!("sis_course_id:{sis}"),
        }
    }
}

impl fmt::Display for CourseQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path_segment())
    }
}

// ---------------------------------------------------------------------------
// Staff output
// ---------------------------------------------------------------------------

/// Output staff role group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaffRole {
    Instructor,
    Ta,
    Tutor,
}

impl StaffRole {
    /// All groups in output (and backfill) order.
    pub const ALL: [StaffRole; 3] = [Self::Instructor, Self::Ta, Self::Tutor];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Instructor => "instructor",
            Self::Ta => "ta",
            Self::Tutor => "tutor",
        }
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One entry in a staff role group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffEntry {
    pub name: String,
    pub email: String,
    pub id: String,
    /// Section assignment; present (possibly empty) on TA entries only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<String>,
}

impl StaffEntry {
    /// Build the output entry for `member` in the given group.
    pub fn from_member(member: &Member, role: StaffRole) -> Self {
        let name = if member.name.is_empty() {
            UNKNOWN_NAME.to_string()
        } else {
            member.name.clone()
        };
        Self {
            name,
            email: member.email.clone(),
            id: member.id.clone(),
            sections: (role == StaffRole::Ta).then(String::new),
        }
    }

    /// Whether the entry already carries a usable email.
    pub fn has_email(&self) -> bool {
        !self.email.trim().is_empty()
    }
}

/// The staff document written to `canvas-staff.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffRecord {
    pub course_name: String,
    pub instructors: Vec<StaffEntry>,
    pub tas: Vec<StaffEntry>,
    pub tutors: Vec<StaffEntry>,
}

impl StaffRecord {
    /// Create an empty record for the named course.
    pub fn new(course_name: impl Into<String>) -> Self {
        Self {
            course_name: course_name.into(),
            instructors: Vec::new(),
            tas: Vec::new(),
            tutors: Vec::new(),
        }
    }

    pub fn group(&self, role: StaffRole) -> &[StaffEntry] {
        match role {
            StaffRole::Instructor => &self.instructors,
            StaffRole::Ta => &self.tas,
            StaffRole::Tutor => &self.tutors,
        }
    }

    pub fn group_mut(&mut self, role: StaffRole) -> &mut Vec<StaffEntry> {
        match role {
            StaffRole::Instructor => &mut self.instructors,
            StaffRole::Ta => &mut self.tas,
            StaffRole::Tutor => &mut self.tutors,
        }
    }

    /// Group the member with `id` was placed in, if any.
    pub fn role_of(&self, id: &str) -> Option<StaffRole> {
        StaffRole::ALL
            .into_iter()
            .find(|role| self.group(*role).iter().any(|e| e.id == id))
    }

    /// Write `email` onto the entry with `id` in the `role` group.
    ///
    /// Returns `false` if no such entry exists.
    pub fn set_email(&mut self, role: StaffRole, id: &str, email: &str) -> bool {
        match self.group_mut(role).iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.email = email.to_string();
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Bio store
// ---------------------------------------------------------------------------

/// Normalize a name for bio deduplication (trimmed, lowercased).
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A persisted instructor bio, kept as the raw JSON value it was read as.
///
/// Only `name` is ever inspected. Entries of any shape (non-string bios,
/// explicit nulls, extra fields) are written back exactly as they were read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BioEntry(Value);

impl BioEntry {
    pub fn new(name: impl Into<String>, bio: impl Into<String>) -> Self {
        let mut entry = Map::new();
        entry.insert("name".into(), Value::String(name.into()));
        entry.insert("bio".into(), Value::String(bio.into()));
        Self(Value::Object(entry))
    }

    /// The entry's `name`, when it is a string.
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    /// The entry's `bio`, when it is a string.
    pub fn bio(&self) -> Option<&str> {
        self.0.get("bio").and_then(Value::as_str)
    }

    /// A field of the underlying object, whatever its type.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Dedup key; entries without a string name normalize to the empty string.
    pub fn normalized_name(&self) -> String {
        normalize_name(self.name().unwrap_or_default())
    }
}

/// The document written to `instructor-bio.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BioStore {
    #[serde(default)]
    pub instructor_bios: Vec<BioEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, name: &str, email: &str) -> Member {
        Member {
            id: id.into(),
            name: name.into(),
            raw_role: "TaEnrollment".into(),
            hint: Some(RoleHint::Grader),
            email: email.into(),
        }
    }

    #[test]
    fn whitespace_email_counts_as_missing() {
        let blank = StaffEntry::from_member(&member("1", "A", "   "), StaffRole::Ta);
        let set = StaffEntry::from_member(&member("1", "A", "a@example.edu"), StaffRole::Ta);
        assert!(!blank.has_email());
        assert!(set.has_email());
    }

    #[test]
    fn ta_entries_carry_sections() {
        let m = member("7", "Bea", "");
        let ta = StaffEntry::from_member(&m, StaffRole::Ta);
        let tutor = StaffEntry::from_member(&m, StaffRole::Tutor);

        let ta_json = serde_json::to_value(&ta).unwrap();
        let tutor_json = serde_json::to_value(&tutor).unwrap();
        assert_eq!(ta_json["sections"], "");
        assert!(tutor_json.get("sections").is_none());
    }

    #[test]
    fn unnamed_member_is_unknown() {
        let entry = StaffEntry::from_member(&member("3", "", ""), StaffRole::Instructor);
        assert_eq!(entry.name, UNKNOWN_NAME);
    }

    #[test]
    fn staff_record_shape() {
        let mut record = StaffRecord::new("CSE 101");
        record
            .instructors
            .push(StaffEntry::from_member(&member("1", "A", ""), StaffRole::Instructor));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["course_name"], "CSE 101");
        assert_eq!(json["instructors"][0]["name"], "A");
        assert_eq!(json["tas"], serde_json::json!([]));
        assert_eq!(json["tutors"], serde_json::json!([]));
    }

    #[test]
    fn set_email_targets_group_entry() {
        let mut record = StaffRecord::new("CSE 101");
        record
            .tas
            .push(StaffEntry::from_member(&member("9", "T", ""), StaffRole::Ta));

        assert!(!record.set_email(StaffRole::Instructor, "9", "t@example.edu"));
        assert!(record.set_email(StaffRole::Ta, "9", "t@example.edu"));
        assert_eq!(record.tas[0].email, "t@example.edu");
        assert_eq!(record.role_of("9"), Some(StaffRole::Ta));
    }

    #[test]
    fn course_name_fallback() {
        let named = Course {
            id: "1".into(),
            name: Some("Compilers".into()),
        };
        let blank = Course {
            id: "1".into(),
            name: Some("  ".into()),
        };
        assert_eq!(named.display_name(DEFAULT_COURSE_NAME), "Compilers");
        assert_eq!(blank.display_name(DEFAULT_COURSE_NAME), DEFAULT_COURSE_NAME);
    }

    #[test]
    fn course_query_path_segment() {
        assert_eq!(CourseQuery::Id(42).path_segment(), "42");
        assert_eq!(
            CourseQuery::Sis("CSE140-F24".into()).path_segment(),
            "sis_course_id:CSE140-F24"
        );
    }

    #[test]
    fn bio_store_preserves_unknown_fields() {
        let raw = r#"{
            "instructor_bios": [
                {"name": "Jane Doe", "bio": "Teaches things.", "title": "Professor"}
            ],
            "updated_by": "hand"
        }"#;
        let store: BioStore = serde_json::from_str(raw).unwrap();
        assert_eq!(store.instructor_bios[0].field("title").unwrap(), "Professor");

        let back = serde_json::to_value(&store).unwrap();
        assert_eq!(back["instructor_bios"][0]["title"], "Professor");
        assert_eq!(back["instructor_bios"][0]["bio"], "Teaches things.");
        assert_eq!(back["updated_by"], "hand");
    }

    #[test]
    fn bio_entries_of_any_shape_round_trip() {
        let raw = r#"{"instructor_bios": [
            {"name": "A", "bio": ["para one", "para two"]},
            {"name": "B", "bio": null},
            {"name": 7},
            "stray"
        ]}"#;
        let store: BioStore = serde_json::from_str(raw).unwrap();
        assert_eq!(store.instructor_bios.len(), 4);
        assert_eq!(store.instructor_bios[0].name(), Some("A"));
        assert_eq!(store.instructor_bios[0].bio(), None);
        assert_eq!(store.instructor_bios[2].normalized_name(), "");

        let back = serde_json::to_value(&store).unwrap();
        let expected: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(back, expected);
        assert!(back["instructor_bios"][1]["bio"].is_null());
    }

    #[test]
    fn normalized_names_ignore_case_and_padding() {
        let a = BioEntry::new("Jane Doe", FALLBACK_BIO);
        let b = BioEntry::new(" jane doe ", FALLBACK_BIO);
        let c = BioEntry::new("JANE DOE", FALLBACK_BIO);
        assert_eq!(a.normalized_name(), b.normalized_name());
        assert_eq!(b.normalized_name(), c.normalized_name());
    }
}
