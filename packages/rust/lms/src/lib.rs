//! Upstream LMS access: the roster source and the email lookup transport.
//!
//! This crate provides:
//! - [`RosterSource`]: resolve a course and list its members
//! - [`EmailTransport`]: bare HTTP GET used for per-user email lookups
//! - [`CanvasClient`] and [`HttpTransport`]: the Canvas/reqwest implementations

pub mod canvas;
pub mod transport;

use std::future::Future;

use staffsync_shared::{Course, CourseQuery, Member, Result};

pub use canvas::{CanvasClient, parse_course_query};
pub use transport::{HttpTransport, LookupRequest, LookupResponse};

/// User-Agent string for all LMS requests.
pub(crate) const USER_AGENT: &str = concat!("staffsync/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Read access to a course roster.
pub trait RosterSource {
    /// Parse a user-supplied course identifier.
    fn parse_course_query(&self, raw: &str) -> Result<CourseQuery>;

    /// Look up the course the query refers to.
    fn resolve_course(&self, query: &CourseQuery) -> impl Future<Output = Result<Course>> + Send;

    /// Every member enrolled in the course, in upstream order.
    fn list_members(
        &self,
        query: &CourseQuery,
    ) -> impl Future<Output = Result<Vec<Member>>> + Send;
}

/// Generic GET capability used for email lookups.
///
/// Implementations return `Ok` for any HTTP status and reserve `Err` for
/// transport failures (timeouts, connection errors, unreadable bodies).
pub trait EmailTransport {
    fn get(&self, request: &LookupRequest) -> impl Future<Output = Result<LookupResponse>> + Send;
}
