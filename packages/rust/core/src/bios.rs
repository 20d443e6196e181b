//! Instructor bio store reconciliation.
//!
//! New instructors get an entry with the fallback bio; everything already in
//! the store stays exactly as it was. Names are compared trimmed and
//! case-insensitively.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, instrument, warn};

use staffsync_shared::{BioEntry, BioStore, Result, StaffEntry, normalize_name};
use staffsync_storage::{self as storage, StoredDocument};

/// Outcome of [`update_bio_store`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BioUpdate {
    /// Names appended, in instructor order.
    pub added: Vec<String>,
    /// Whether the store file was rewritten.
    pub written: bool,
    /// Set when an existing store could not be read and was treated as empty.
    pub warning: Option<String>,
}

/// Append an entry for every instructor not yet in `store`.
///
/// Returns the names appended. Existing entries are never modified.
pub fn reconcile(store: &mut BioStore, instructors: &[StaffEntry], fallback_bio: &str) -> Vec<String> {
    let mut known: HashSet<String> = store
        .instructor_bios
        .iter()
        .map(BioEntry::normalized_name)
        .collect();

    let mut added = Vec::new();
    for instructor in instructors {
        if !known.insert(normalize_name(&instructor.name)) {
            continue;
        }
        store
            .instructor_bios
            .push(BioEntry::new(instructor.name.clone(), fallback_bio));
        added.push(instructor.name.clone());
    }
    added
}

/// Read the store at `path`, reconcile, and write it back if anything was added.
///
/// A corrupt store is treated as empty (with a warning) rather than failing
/// the run. With `dry_run` the file is never written.
#[instrument(skip_all, fields(path = %path.display(), instructors = instructors.len()))]
pub fn update_bio_store(
    path: &Path,
    instructors: &[StaffEntry],
    fallback_bio: &str,
    dry_run: bool,
) -> Result<BioUpdate> {
    let mut update = BioUpdate::default();

    let mut store = match storage::load_bio_store(path)? {
        StoredDocument::Loaded(store) => store,
        StoredDocument::Missing => BioStore::default(),
        StoredDocument::Corrupt(reason) => {
            warn!(%reason, "could not read existing bio store, starting empty");
            update.warning = Some(format!(
                "could not read existing {}: {reason}",
                path.display()
            ));
            BioStore::default()
        }
    };

    update.added = reconcile(&mut store, instructors, fallback_bio);
    for name in &update.added {
        info!(%name, "added new instructor bio entry");
    }

    if update.added.is_empty() {
        info!("all instructors already have bio entries");
        return Ok(update);
    }

    if dry_run {
        info!(added = update.added.len(), "dry run, bio store not written");
        return Ok(update);
    }

    storage::save_bio_store(path, &store)?;
    update.written = true;
    info!(added = update.added.len(), "updated bio store");
    Ok(update)
}
