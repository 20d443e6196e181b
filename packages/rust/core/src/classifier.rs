//! Enrollment label to staff role mapping.
//!
//! Upstream labels are open-ended free text, so the mapping is an ordered
//! rule table: rules are tried in priority order and the first match wins.
//! New label variants are added to [`RULES`] without touching callers.

use staffsync_shared::{Member, RoleHint, StaffRole};

/// One classification rule: a member matches if its raw label is one of
/// `labels` (case-sensitive) or its hint is one of `hints`.
#[derive(Debug, Clone, Copy)]
pub struct RoleRule {
    pub role: StaffRole,
    pub labels: &'static [&'static str],
    pub hints: &'static [RoleHint],
}

impl RoleRule {
    pub fn matches(&self, raw_role: &str, hint: Option<RoleHint>) -> bool {
        self.labels.contains(&raw_role) || hint.is_some_and(|h| self.hints.contains(&h))
    }
}

/// Classification rules in priority order.
pub const RULES: &[RoleRule] = &[
    RoleRule {
        role: StaffRole::Instructor,
        labels: &["TeacherEnrollment"],
        hints: &[RoleHint::Owner],
    },
    RoleRule {
        role: StaffRole::Ta,
        labels: &["TaEnrollment"],
        hints: &[RoleHint::Grader],
    },
    RoleRule {
        role: StaffRole::Tutor,
        labels: &["TutorEnrollment", "ReaderEnrollment", "Tutor", "Reader"],
        hints: &[],
    },
];

/// Promotion rule applied when a roster yields no instructor at all.
pub const FALLBACK_INSTRUCTOR: RoleRule = RoleRule {
    role: StaffRole::Instructor,
    labels: &["DesignerEnrollment"],
    hints: &[RoleHint::Owner, RoleHint::Admin],
};

/// Classify a raw label and hint. `None` means the member is not staff.
pub fn classify(raw_role: &str, hint: Option<RoleHint>) -> Option<StaffRole> {
    RULES
        .iter()
        .find(|rule| rule.matches(raw_role, hint))
        .map(|rule| rule.role)
}

pub fn classify_member(member: &Member) -> Option<StaffRole> {
    classify(&member.raw_role, member.hint)
}

/// First member eligible for instructor promotion, in roster order.
pub fn fallback_instructor<'a, I>(roster: I) -> Option<&'a Member>
where
    I: IntoIterator<Item = &'a Member>,
{
    roster
        .into_iter()
        .find(|m| FALLBACK_INSTRUCTOR.matches(&m.raw_role, m.hint))
}
