//! JSON file persistence for the staff document and the instructor bio store.
//!
//! **Access rules:**
//! - `canvas-staff.json` is overwritten in full on every successful run
//! - `instructor-bio.json` is read once and rewritten only when entries were appended
//!
//! Writes go to a sibling temp file first and are renamed into place, so a
//! killed process never leaves a half-written document behind.

use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use staffsync_shared::{BioStore, Result, StaffRecord, StaffSyncError};

/// Outcome of reading a persisted JSON document.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredDocument<T> {
    /// No file at the path.
    Missing,
    /// Parsed successfully.
    Loaded(T),
    /// The file exists but could not be decoded; carries the reason.
    Corrupt(String),
}

/// Read and decode a JSON document.
///
/// Undecodable content (bad JSON, wrong shape, invalid UTF-8) is reported as
/// [`StoredDocument::Corrupt`]; other I/O failures are errors.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<StoredDocument<T>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoredDocument::Missing),
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            return Ok(StoredDocument::Corrupt(e.to_string()));
        }
        Err(e) => return Err(StaffSyncError::io(path, e)),
    };

    match serde_json::from_str(&content) {
        Ok(value) => Ok(StoredDocument::Loaded(value)),
        Err(e) => Ok(StoredDocument::Corrupt(e.to_string())),
    }
}

/// Write a JSON file (pretty-printed, two-space indent), creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| StaffSyncError::validation(format!("JSON serialization failed: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StaffSyncError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| StaffSyncError::validation(format!("not a file path: {}", path.display())))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, json).map_err(|e| StaffSyncError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| StaffSyncError::io(path, e))?;

    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

/// Overwrite the staff document.
pub fn save_staff_record(path: &Path, record: &StaffRecord) -> Result<()> {
    write_json(path, record)
}

/// Read the bio store, distinguishing missing and corrupt files.
pub fn load_bio_store(path: &Path) -> Result<StoredDocument<BioStore>> {
    read_json(path)
}

/// Overwrite the bio store.
pub fn save_bio_store(path: &Path, store: &BioStore) -> Result<()> {
    write_json(path, store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use staffsync_shared::{BioEntry, FALLBACK_BIO, StaffEntry};
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("staffsync-storage-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_file_is_missing() {
        let dir = temp_dir();
        let loaded = load_bio_store(&dir.join("nope.json")).unwrap();
        assert_eq!(loaded, StoredDocument::Missing);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_file_is_reported_not_fatal() {
        let dir = temp_dir();
        let path = dir.join("instructor-bio.json");
        std::fs::write(&path, "{ not json").unwrap();

        match load_bio_store(&path).unwrap() {
            StoredDocument::Corrupt(reason) => assert!(!reason.is_empty()),
            other => panic!("expected corrupt, got {other:?}"),
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn wrong_shape_is_corrupt() {
        let dir = temp_dir();
        let path = dir.join("instructor-bio.json");
        std::fs::write(&path, r#"{"instructor_bios": "oops"}"#).unwrap();

        assert!(matches!(
            load_bio_store(&path).unwrap(),
            StoredDocument::Corrupt(_)
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bio_store_roundtrip_creates_parents() {
        let dir = temp_dir();
        let path = dir.join("src").join("data").join("instructor-bio.json");
        let store = BioStore {
            instructor_bios: vec![BioEntry::new("Ada Lovelace", FALLBACK_BIO)],
            ..Default::default()
        };

        save_bio_store(&path, &store).unwrap();
        assert_eq!(load_bio_store(&path).unwrap(), StoredDocument::Loaded(store));

        // No temp file left behind
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn staff_record_is_pretty_printed() {
        let dir = temp_dir();
        let path = dir.join("canvas-staff.json");
        let mut record = StaffRecord::new("CSE 140");
        record.tas.push(StaffEntry {
            name: "Bea".into(),
            email: String::new(),
            id: "2".into(),
            sections: Some(String::new()),
        });

        save_staff_record(&path, &record).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("{\n  \"course_name\": \"CSE 140\""));
        assert!(written.contains("\"sections\": \"\""));

        // Overwritten in full on the next save
        save_staff_record(&path, &StaffRecord::new("CSE 141")).unwrap();
        let reread: StaffRecord =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(reread.course_name, "CSE 141");
        assert!(reread.tas.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
