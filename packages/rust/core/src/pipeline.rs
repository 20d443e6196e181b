//! End-to-end run: course -> roster -> staff record -> staff file -> bio store.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{info, instrument};

use staffsync_lms::{CanvasClient, EmailTransport, RosterSource};
use staffsync_shared::{Result, RunSettings};

use crate::aggregator::{self, StaffRun};
use crate::backfill::{BackfillOptions, Interrupt};
use crate::bios::{self, BioUpdate};

/// Everything a run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Unparsed course identifier.
    pub course: String,
    pub default_course_name: String,
    pub fallback_bio: String,
    pub staff_path: PathBuf,
    pub bio_path: PathBuf,
    /// Compute everything but write nothing.
    pub dry_run: bool,
    pub backfill: BackfillOptions,
}

impl RunPlan {
    /// Plan a run against the Canvas instance behind `client`.
    pub fn new(settings: &RunSettings, client: &CanvasClient, dry_run: bool) -> Self {
        Self {
            course: settings.course.clone(),
            default_course_name: settings.default_course_name.clone(),
            fallback_bio: settings.fallback_bio.clone(),
            staff_path: settings.staff_path.clone(),
            bio_path: settings.bio_path.clone(),
            dry_run,
            backfill: BackfillOptions {
                skip: settings.skip_emails,
                api_root: client.api_url(""),
                headers: client.standard_headers(),
                timeout: settings.lookup_timeout,
            },
        }
    }
}

/// Result of [`run`].
#[derive(Debug)]
pub struct RunSummary {
    pub staff: StaffRun,
    /// `None` when there were no instructors to reconcile.
    pub bios: Option<BioUpdate>,
    pub staff_written: bool,
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each email lookup.
    fn lookup_started(&self, name: &str, current: usize, total: usize);
    /// Called after each email lookup with the address found, if any.
    fn lookup_finished(&self, name: &str, email: Option<&str>);
    /// Called when the pipeline completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn lookup_started(&self, _name: &str, _current: usize, _total: usize) {}
    fn lookup_finished(&self, _name: &str, _email: Option<&str>) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Run the full pipeline.
///
/// 1. Resolve the course and list its members
/// 2. Classify into instructors, TAs, tutors
/// 3. Backfill missing emails
/// 4. Write the staff document
/// 5. Append new instructors to the bio store
#[instrument(skip_all, fields(course = %plan.course, dry_run = plan.dry_run))]
pub async fn run<R, T>(
    source: &R,
    transport: Option<&T>,
    plan: &RunPlan,
    interrupt: &Interrupt,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary>
where
    R: RosterSource,
    T: EmailTransport,
{
    let start = Instant::now();

    let staff = aggregator::fetch_staff(
        source,
        transport,
        &plan.course,
        &plan.default_course_name,
        &plan.backfill,
        interrupt,
        progress,
    )
    .await?;

    progress.phase("Saving staff data");
    let staff_written = if plan.dry_run {
        info!(path = %plan.staff_path.display(), "dry run, staff data not written");
        false
    } else {
        staffsync_storage::save_staff_record(&plan.staff_path, &staff.record)?;
        info!(
            path = %plan.staff_path.display(),
            instructors = staff.record.instructors.len(),
            tas = staff.record.tas.len(),
            tutors = staff.record.tutors.len(),
            "staff data saved"
        );
        true
    };

    let bios = if staff.record.instructors.is_empty() {
        None
    } else {
        progress.phase("Updating instructor bios");
        Some(bios::update_bio_store(
            &plan.bio_path,
            &staff.record.instructors,
            &plan.fallback_bio,
            plan.dry_run,
        )?)
    };

    let summary = RunSummary {
        staff,
        bios,
        staff_written,
        elapsed: start.elapsed(),
    };
    progress.done(&summary);
    Ok(summary)
}
