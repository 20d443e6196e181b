//! Shared types, error model, and configuration for staffsync.
//!
//! This crate is the foundation depended on by all other staffsync crates.
//! It provides:
//! - [`StaffSyncError`]: the unified error type
//! - Domain types ([`Member`], [`StaffEntry`], [`StaffRecord`], [`BioStore`])
//! - Configuration ([`AppConfig`], [`RunSettings`], env and config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CanvasConfig, EnvLayer, OutputConfig, RunSettings, SettingsOverrides,
    load_config, load_config_from, parse_env_file,
};
pub use error::{Result, StaffSyncError};
pub use types::{
    BioEntry, BioStore, Course, CourseQuery, DEFAULT_COURSE_NAME, FALLBACK_BIO, Member, RoleHint,
    StaffEntry, StaffRecord, StaffRole, UNKNOWN_NAME, normalize_name,
};
