//! Roster to staff record: classification, instructor fallback, email backfill.

use std::collections::BTreeMap;

use tracing::{debug, info, instrument};

use staffsync_lms::{EmailTransport, RosterSource};
use staffsync_shared::{Member, Result, StaffEntry, StaffRecord, StaffRole};

use crate::backfill::{self, BackfillItem, BackfillOptions, BackfillReport, Interrupt};
use crate::classifier;
use crate::pipeline::ProgressReporter;

/// Classification of a whole roster, before any backfill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedRoster {
    pub record: StaffRecord,
    /// Ids of members that matched no staff rule.
    pub unclassified: Vec<String>,
    /// Id of the member promoted by the instructor fallback, if any.
    pub promoted: Option<String>,
}

/// Result of [`fetch_staff`].
#[derive(Debug, Clone)]
pub struct StaffRun {
    pub record: StaffRecord,
    pub roster_size: usize,
    pub unclassified: usize,
    pub promoted: Option<String>,
    pub backfill: BackfillReport,
}

/// Sort every member into its group, preserving roster order within groups.
///
/// When no member classifies as instructor, the first member eligible for
/// promotion (designer label, owner or admin hint) becomes the sole
/// instructor. Members already placed in a group are not promoted.
pub fn classify_roster(roster: &[Member], course_name: &str) -> ClassifiedRoster {
    let mut record = StaffRecord::new(course_name);
    let mut unclassified = Vec::new();

    for member in roster {
        match classifier::classify_member(member) {
            Some(role) => {
                debug!(name = %member.name, raw_role = %member.raw_role, %role, "classified");
                record
                    .group_mut(role)
                    .push(StaffEntry::from_member(member, role));
            }
            None => unclassified.push(member.id.clone()),
        }
    }

    let mut promoted = None;
    if record.instructors.is_empty() {
        let candidates = roster.iter().filter(|m| record.role_of(&m.id).is_none());
        if let Some(member) = classifier::fallback_instructor(candidates) {
            info!(name = %member.name, raw_role = %member.raw_role, "promoted fallback instructor");
            unclassified.retain(|id| id != &member.id);
            promoted = Some(member.id.clone());
            record
                .instructors
                .push(StaffEntry::from_member(member, StaffRole::Instructor));
        }
    }

    ClassifiedRoster {
        record,
        unclassified,
        promoted,
    }
}

/// Members still lacking an email: instructors, then TAs, then tutors.
pub fn build_worklist(record: &StaffRecord) -> Vec<BackfillItem> {
    StaffRole::ALL
        .into_iter()
        .flat_map(|role| {
            record
                .group(role)
                .iter()
                .filter(|e| !e.has_email())
                .map(move |e| BackfillItem {
                    id: e.id.clone(),
                    name: e.name.clone(),
                    role,
                })
        })
        .collect()
}

/// Count members per `raw_role (hint)` key, for diagnostics.
pub fn role_summary(roster: &[Member]) -> BTreeMap<String, usize> {
    let mut summary = BTreeMap::new();
    for member in roster {
        let hint = member.hint.map_or("None", |h| h.as_str());
        let raw = if member.raw_role.is_empty() {
            "Unknown"
        } else {
            member.raw_role.as_str()
        };
        *summary.entry(format!("{raw} ({hint})")).or_insert(0) += 1;
    }
    summary
}

/// Resolve the course, classify its roster, and backfill missing emails.
///
/// Failing to parse or resolve the course query is fatal. Backfill problems
/// never are.
#[instrument(skip_all, fields(course = %course))]
pub async fn fetch_staff<R, T>(
    source: &R,
    transport: Option<&T>,
    course: &str,
    default_course_name: &str,
    options: &BackfillOptions,
    interrupt: &Interrupt,
    progress: &dyn ProgressReporter,
) -> Result<StaffRun>
where
    R: RosterSource,
    T: EmailTransport,
{
    progress.phase("Resolving course");
    let query = source.parse_course_query(course)?;
    let resolved = source.resolve_course(&query).await?;
    let course_name = resolved.display_name(default_course_name).to_string();
    info!(course_name = %course_name, id = %resolved.id, "course resolved");

    progress.phase("Fetching course users");
    let roster = source.list_members(&query).await?;
    info!(count = roster.len(), "fetched course users");

    for member in &roster {
        debug!(
            name = %member.name,
            id = %member.id,
            raw_role = %member.raw_role,
            hint = member.hint.map_or("None", |h| h.as_str()),
            "roster member"
        );
    }
    for (key, count) in role_summary(&roster) {
        info!(role = %key, count, "role summary");
    }

    progress.phase("Organizing users by role");
    let ClassifiedRoster {
        mut record,
        unclassified,
        promoted,
    } = classify_roster(&roster, &course_name);
    info!(
        instructors = record.instructors.len(),
        tas = record.tas.len(),
        tutors = record.tutors.len(),
        unclassified = unclassified.len(),
        "staff organized"
    );

    progress.phase("Fetching email addresses");
    let worklist = build_worklist(&record);
    let report = backfill::backfill_emails(
        &mut record,
        &worklist,
        transport,
        options,
        interrupt,
        progress,
    )
    .await;

    Ok(StaffRun {
        record,
        roster_size: roster.len(),
        unclassified: unclassified.len(),
        promoted,
        backfill: report,
    })
}
