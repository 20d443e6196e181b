//! Staff classification and reconciliation for staffsync.
//!
//! This crate turns a course roster into the staff document and keeps the
//! instructor bio store in step with it (e.g., [`pipeline::run`]).

pub mod aggregator;
pub mod backfill;
pub mod bios;
pub mod classifier;
pub mod pipeline;
