//! Best-effort email backfill for staff entries missing an address.
//!
//! Members are processed strictly one at a time, in worklist order. Each gets
//! at most two lookups (user record, then profile) bounded by a short timeout.
//! Any per-member failure leaves that member's email empty and moves on.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use staffsync_lms::{EmailTransport, LookupRequest, LookupResponse};
use staffsync_shared::{Result, StaffRecord, StaffRole, StaffSyncError};

use crate::pipeline::ProgressReporter;

/// Response fields that may hold an address, in preference order.
pub const EMAIL_FIELDS: &[&str] = &["email", "login_id", "primary_email"];

/// Status that suppresses the profile lookup.
const FORBIDDEN: u16 = 403;

// ---------------------------------------------------------------------------
// Interrupt
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct InterruptState {
    requested: AtomicBool,
    cooperative: AtomicBool,
}

/// Cooperative stop signal, checked between members only.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    state: Arc<InterruptState>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running backfill to stop after the current member.
    ///
    /// Returns `false` when no backfill is listening (or a stop was already
    /// requested); the caller should then terminate the process instead.
    pub fn request(&self) -> bool {
        if !self.state.cooperative.load(Ordering::SeqCst) {
            return false;
        }
        !self.state.requested.swap(true, Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.state.requested.load(Ordering::SeqCst)
    }

    fn listen(&self) -> ListenGuard<'_> {
        self.state.cooperative.store(true, Ordering::SeqCst);
        ListenGuard { interrupt: self }
    }
}

struct ListenGuard<'a> {
    interrupt: &'a Interrupt,
}

impl Drop for ListenGuard<'_> {
    fn drop(&mut self) {
        self.interrupt
            .state
            .cooperative
            .store(false, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Options, worklist & report
// ---------------------------------------------------------------------------

/// Where and how to look emails up.
#[derive(Debug, Clone)]
pub struct BackfillOptions {
    /// Skip the whole backfill.
    pub skip: bool,
    /// API root, e.g. `https://canvas.example.edu`; paths are appended to it.
    pub api_root: String,
    /// Headers sent with every lookup (authorization).
    pub headers: Vec<(String, String)>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// One member awaiting an email, tagged with the group holding its entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillItem {
    pub id: String,
    pub name: String,
    pub role: StaffRole,
}

/// Why the backfill did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Disabled by flag or `SKIP_EMAIL_FETCH=1`.
    Disabled,
    /// No HTTP transport could be set up.
    NoTransport,
    /// Every staff member already has an email.
    NothingToFetch,
}

/// Counters describing a backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Members in the worklist.
    pub requested: usize,
    /// Members a lookup was attempted for.
    pub attempted: usize,
    /// Members whose email was filled in.
    pub found: usize,
    /// Members that errored (timeout, network, bad body).
    pub failed: usize,
    /// Stopped early by an interrupt; partial results were kept.
    pub interrupted: bool,
    pub skipped: Option<SkipReason>,
}

// ---------------------------------------------------------------------------
// Email extraction
// ---------------------------------------------------------------------------

/// First non-empty string among [`EMAIL_FIELDS`] in a user or profile body.
pub fn extract_email(body: &Value) -> Option<String> {
    EMAIL_FIELDS.iter().find_map(|field| {
        body.get(*field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Email from a 200 response. A 200 whose body is not JSON is a parse error.
fn email_from_ok(response: &LookupResponse, url: &str) -> Result<Option<String>> {
    let body = response
        .body
        .as_ref()
        .ok_or_else(|| StaffSyncError::parse(format!("{url}: response body is not JSON")))?;
    Ok(extract_email(body))
}

fn request(options: &BackfillOptions, path: String) -> LookupRequest {
    LookupRequest {
        url: format!("{}{path}", options.api_root.trim_end_matches('/')),
        headers: options.headers.clone(),
        timeout: options.timeout,
    }
}

/// Look up one member's email: user record first, then profile.
///
/// The profile lookup is skipped when the user record answered 403.
/// Transport failures and malformed 200 bodies are returned as errors; a
/// clean miss is `Ok(None)`.
pub async fn lookup_email<T: EmailTransport>(
    transport: &T,
    options: &BackfillOptions,
    user_id: &str,
) -> Result<Option<String>> {
    let primary_request = request(options, format!("/api/v1/users/{user_id}"));
    let primary = transport.get(&primary_request).await?;

    if primary.is_ok() {
        if let Some(email) = email_from_ok(&primary, &primary_request.url)? {
            return Ok(Some(email));
        }
    }

    if primary.status == FORBIDDEN {
        debug!(user_id, "user record forbidden, skipping profile lookup");
        return Ok(None);
    }

    let profile_request = request(options, format!("/api/v1/users/{user_id}/profile"));
    let profile = transport.get(&profile_request).await?;

    if profile.is_ok() {
        return email_from_ok(&profile, &profile_request.url);
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Backfill loop
// ---------------------------------------------------------------------------

/// Fill in missing emails on `record` for every member in `worklist`.
///
/// Found addresses are written into the entry of the item's group, matched by
/// member id. Entries that already hold an email are left untouched.
#[instrument(skip_all, fields(worklist = worklist.len()))]
pub async fn backfill_emails<T: EmailTransport>(
    record: &mut StaffRecord,
    worklist: &[BackfillItem],
    transport: Option<&T>,
    options: &BackfillOptions,
    interrupt: &Interrupt,
    progress: &dyn ProgressReporter,
) -> BackfillReport {
    let mut report = BackfillReport {
        requested: worklist.len(),
        ..Default::default()
    };

    if worklist.is_empty() {
        info!("all staff members already have email addresses");
        report.skipped = Some(SkipReason::NothingToFetch);
        return report;
    }
    if options.skip {
        info!("skipping email fetch (disabled)");
        report.skipped = Some(SkipReason::Disabled);
        return report;
    }
    let Some(transport) = transport else {
        warn!("no HTTP transport available, skipping email fetch");
        report.skipped = Some(SkipReason::NoTransport);
        return report;
    };

    info!(count = worklist.len(), "fetching email addresses for staff members");
    let _listening = interrupt.listen();

    for (index, item) in worklist.iter().enumerate() {
        if interrupt.is_requested() {
            warn!(
                processed = report.attempted,
                "email fetching interrupted, continuing with available data"
            );
            report.interrupted = true;
            break;
        }

        let already_set = record
            .group(item.role)
            .iter()
            .any(|e| e.id == item.id && e.has_email());
        if already_set {
            debug!(id = %item.id, "email already present, skipping");
            continue;
        }

        progress.lookup_started(&item.name, index + 1, worklist.len());
        report.attempted += 1;

        let email = match lookup_email(transport, options, &item.id).await {
            Ok(email) => email,
            Err(e) => {
                debug!(id = %item.id, error = %e, "email lookup failed");
                report.failed += 1;
                None
            }
        };

        if let Some(email) = email.as_deref() {
            if record.set_email(item.role, &item.id, email) {
                report.found += 1;
            } else {
                warn!(id = %item.id, role = %item.role, "no staff entry to receive email");
            }
        }
        progress.lookup_finished(&item.name, email.as_deref());
    }

    info!(
        attempted = report.attempted,
        found = report.found,
        failed = report.failed,
        interrupted = report.interrupted,
        "completed email fetching"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::json;
    use staffsync_lms::LookupResponse;
    use staffsync_shared::{StaffEntry, StaffSyncError};

    use crate::pipeline::SilentProgress;

    #[derive(Clone)]
    enum Canned {
        Reply(u16, Value),
        NotJson(u16),
        Fail,
    }

    #[derive(Default)]
    struct FakeTransport {
        routes: HashMap<String, Canned>,
        calls: Mutex<Vec<String>>,
        interrupt_after: Option<(usize, Interrupt)>,
    }

    impl FakeTransport {
        fn route(mut self, path: &str, canned: Canned) -> Self {
            self.routes.insert(path.to_string(), canned);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl EmailTransport for FakeTransport {
        async fn get(&self, request: &LookupRequest) -> Result<LookupResponse> {
            let path = request
                .url
                .strip_prefix("https://canvas.test")
                .unwrap_or(&request.url)
                .to_string();
            let count = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(path.clone());
                calls.len()
            };
            if let Some((after, interrupt)) = &self.interrupt_after {
                if count == *after {
                    interrupt.request();
                }
            }
            match self.routes.get(&path) {
                Some(Canned::Reply(status, body)) => Ok(LookupResponse {
                    status: *status,
                    body: Some(body.clone()),
                }),
                Some(Canned::NotJson(status)) => Ok(LookupResponse {
                    status: *status,
                    body: None,
                }),
                Some(Canned::Fail) => Err(StaffSyncError::Network(format!("{path}: timed out"))),
                None => Ok(LookupResponse {
                    status: 404,
                    body: None,
                }),
            }
        }
    }

    fn options() -> BackfillOptions {
        BackfillOptions {
            skip: false,
            api_root: "https://canvas.test/".into(),
            headers: vec![("Authorization".into(), "Bearer tok".into())],
            timeout: Duration::from_secs(3),
        }
    }

    fn entry(id: &str, email: &str, role: StaffRole) -> StaffEntry {
        StaffEntry {
            name: format!("Staff {id}"),
            email: email.into(),
            id: id.into(),
            sections: (role == StaffRole::Ta).then(String::new),
        }
    }

    fn item(id: &str, role: StaffRole) -> BackfillItem {
        BackfillItem {
            id: id.into(),
            name: format!("Staff {id}"),
            role,
        }
    }

    fn record() -> StaffRecord {
        let mut record = StaffRecord::new("CSE 140");
        record.instructors.push(entry("1", "", StaffRole::Instructor));
        record.tas.push(entry("2", "", StaffRole::Ta));
        record.tutors.push(entry("3", "", StaffRole::Tutor));
        record
    }

    fn full_worklist() -> Vec<BackfillItem> {
        vec![
            item("1", StaffRole::Instructor),
            item("2", StaffRole::Ta),
            item("3", StaffRole::Tutor),
        ]
    }

    #[test]
    fn extract_email_field_order() {
        assert_eq!(
            extract_email(&json!({"email": "", "login_id": "ada", "primary_email": "p@x"})),
            Some("ada".into())
        );
        assert_eq!(
            extract_email(&json!({"primary_email": "p@example.edu"})),
            Some("p@example.edu".into())
        );
        assert_eq!(extract_email(&json!({"email": null, "login_id": 42})), None);
        assert_eq!(extract_email(&json!([])), None);
    }

    #[tokio::test]
    async fn primary_lookup_result_is_written_back() {
        let transport = FakeTransport::default()
            .route("/api/v1/users/2", Canned::Reply(200, json!({"email": "ta@example.edu"})));
        let mut record = record();

        let report = backfill_emails(
            &mut record,
            &[item("2", StaffRole::Ta)],
            Some(&transport),
            &options(),
            &Interrupt::new(),
            &SilentProgress,
        )
        .await;

        assert_eq!(record.tas[0].email, "ta@example.edu");
        assert_eq!(report.found, 1);
        assert_eq!(transport.calls(), ["/api/v1/users/2"]);
    }

    #[tokio::test]
    async fn profile_is_tried_after_non_forbidden_failure() {
        let transport = FakeTransport::default()
            .route("/api/v1/users/1", Canned::Reply(401, json!({})))
            .route(
                "/api/v1/users/1/profile",
                Canned::Reply(200, json!({"primary_email": "prof@example.edu"})),
            );
        let mut record = record();

        backfill_emails(
            &mut record,
            &[item("1", StaffRole::Instructor)],
            Some(&transport),
            &options(),
            &Interrupt::new(),
            &SilentProgress,
        )
        .await;

        assert_eq!(record.instructors[0].email, "prof@example.edu");
        assert_eq!(
            transport.calls(),
            ["/api/v1/users/1", "/api/v1/users/1/profile"]
        );
    }

    #[tokio::test]
    async fn profile_is_tried_when_user_record_has_no_email() {
        let transport = FakeTransport::default()
            .route("/api/v1/users/3", Canned::Reply(200, json!({"name": "Tut"})))
            .route(
                "/api/v1/users/3/profile",
                Canned::Reply(200, json!({"login_id": "tut@example.edu"})),
            );
        let mut record = record();

        backfill_emails(
            &mut record,
            &[item("3", StaffRole::Tutor)],
            Some(&transport),
            &options(),
            &Interrupt::new(),
            &SilentProgress,
        )
        .await;

        assert_eq!(record.tutors[0].email, "tut@example.edu");
    }

    #[tokio::test]
    async fn forbidden_primary_skips_profile() {
        let transport = FakeTransport::default()
            .route("/api/v1/users/1", Canned::Reply(403, json!({})))
            .route(
                "/api/v1/users/1/profile",
                Canned::Reply(200, json!({"email": "never@example.edu"})),
            );
        let mut record = record();

        let report = backfill_emails(
            &mut record,
            &[item("1", StaffRole::Instructor)],
            Some(&transport),
            &options(),
            &Interrupt::new(),
            &SilentProgress,
        )
        .await;

        assert_eq!(record.instructors[0].email, "");
        assert_eq!(report.found, 0);
        assert_eq!(transport.calls(), ["/api/v1/users/1"]);
    }

    #[tokio::test]
    async fn non_json_user_record_fails_without_profile_lookup() {
        let transport = FakeTransport::default()
            .route("/api/v1/users/1", Canned::NotJson(200))
            .route(
                "/api/v1/users/1/profile",
                Canned::Reply(200, json!({"email": "profile@example.edu"})),
            );
        let mut record = record();

        let report = backfill_emails(
            &mut record,
            &[item("1", StaffRole::Instructor)],
            Some(&transport),
            &options(),
            &Interrupt::new(),
            &SilentProgress,
        )
        .await;

        assert_eq!(record.instructors[0].email, "");
        assert_eq!(report.failed, 1);
        assert_eq!(report.found, 0);
        assert_eq!(transport.calls(), ["/api/v1/users/1"]);
    }

    #[tokio::test]
    async fn non_json_profile_counts_as_failure() {
        let transport = FakeTransport::default()
            .route("/api/v1/users/2", Canned::Reply(404, json!({})))
            .route("/api/v1/users/2/profile", Canned::NotJson(200));
        let mut record = record();

        let report = backfill_emails(
            &mut record,
            &[item("2", StaffRole::Ta)],
            Some(&transport),
            &options(),
            &Interrupt::new(),
            &SilentProgress,
        )
        .await;

        assert_eq!(record.tas[0].email, "");
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn failures_are_isolated_per_member() {
        let transport = FakeTransport::default()
            .route("/api/v1/users/1", Canned::Fail)
            .route("/api/v1/users/2", Canned::Reply(200, json!({"email": "b@example.edu"})))
            .route("/api/v1/users/3", Canned::Reply(200, json!({"email": "c@example.edu"})));
        let mut record = record();

        let report = backfill_emails(
            &mut record,
            &full_worklist(),
            Some(&transport),
            &options(),
            &Interrupt::new(),
            &SilentProgress,
        )
        .await;

        assert_eq!(record.instructors[0].email, "");
        assert_eq!(record.tas[0].email, "b@example.edu");
        assert_eq!(record.tutors[0].email, "c@example.edu");
        assert_eq!(report.failed, 1);
        assert_eq!(report.found, 2);
        // A transport error on the user record does not fall through to the profile.
        assert!(!transport.calls().contains(&"/api/v1/users/1/profile".to_string()));
    }

    #[tokio::test]
    async fn skip_switch_leaves_emails_untouched() {
        let transport = FakeTransport::default()
            .route("/api/v1/users/1", Canned::Reply(200, json!({"email": "a@example.edu"})));
        let mut record = record();
        let before = record.clone();
        let options = BackfillOptions {
            skip: true,
            ..options()
        };

        let report = backfill_emails(
            &mut record,
            &full_worklist(),
            Some(&transport),
            &options,
            &Interrupt::new(),
            &SilentProgress,
        )
        .await;

        assert_eq!(record, before);
        assert_eq!(report.skipped, Some(SkipReason::Disabled));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_transport_degrades_to_skip() {
        let mut record = record();
        let before = record.clone();

        let report = backfill_emails::<FakeTransport>(
            &mut record,
            &full_worklist(),
            None,
            &options(),
            &Interrupt::new(),
            &SilentProgress,
        )
        .await;

        assert_eq!(record, before);
        assert_eq!(report.skipped, Some(SkipReason::NoTransport));
    }

    #[tokio::test]
    async fn existing_email_is_never_overwritten() {
        let transport = FakeTransport::default()
            .route("/api/v1/users/1", Canned::Reply(200, json!({"email": "new@example.edu"})));
        let mut record = StaffRecord::new("CSE 140");
        record
            .instructors
            .push(entry("1", "kept@example.edu", StaffRole::Instructor));

        for _ in 0..2 {
            backfill_emails(
                &mut record,
                &[item("1", StaffRole::Instructor)],
                Some(&transport),
                &options(),
                &Interrupt::new(),
                &SilentProgress,
            )
            .await;
        }

        assert_eq!(record.instructors[0].email, "kept@example.edu");
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn interrupt_stops_and_keeps_partial_results() {
        let interrupt = Interrupt::new();
        let transport = FakeTransport {
            interrupt_after: Some((1, interrupt.clone())),
            ..Default::default()
        }
        .route("/api/v1/users/1", Canned::Reply(200, json!({"email": "a@example.edu"})))
        .route("/api/v1/users/2", Canned::Reply(200, json!({"email": "b@example.edu"})));
        let mut record = record();

        let report = backfill_emails(
            &mut record,
            &full_worklist(),
            Some(&transport),
            &options(),
            &interrupt,
            &SilentProgress,
        )
        .await;

        assert!(report.interrupted);
        assert_eq!(report.attempted, 1);
        assert_eq!(record.instructors[0].email, "a@example.edu");
        assert_eq!(record.tas[0].email, "");
        assert_eq!(transport.calls(), ["/api/v1/users/1"]);
    }

    #[test]
    fn interrupt_outside_backfill_is_not_honored() {
        let interrupt = Interrupt::new();
        assert!(!interrupt.request());
        assert!(!interrupt.is_requested());

        {
            let _guard = interrupt.listen();
            assert!(interrupt.request());
            // A second request asks the caller to terminate.
            assert!(!interrupt.request());
        }
        assert!(interrupt.is_requested());
    }
}
