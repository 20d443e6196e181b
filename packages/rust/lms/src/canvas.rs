//! Canvas REST API client.
//!
//! Resolves a course and pages through its user list. Each user's first
//! enrollment supplies the free-text `raw_role` (custom role names such as
//! `Reader` show up here) and a privilege hint derived from the enrollment's
//! base type.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use reqwest::header::{HeaderMap, LINK};
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use staffsync_shared::{Course, CourseQuery, Member, Result, RoleHint, StaffSyncError};

use crate::{RosterSource, USER_AGENT};

/// Page size requested from list endpoints.
const PER_PAGE: u32 = 100;

/// Timeout for roster and course requests.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Safety cap on followed `rel="next"` links.
const MAX_PAGES: usize = 200;

static NUMERIC_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").expect("valid regex"));
static COURSE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/courses/(\d+)(?:[/?#]|$)").expect("valid regex"));
static SIS_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sis_course_id:(.+)$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Canvas ids are numbers, but some deployments return them as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Num(u64),
    Str(String),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            Self::Num(n) => n.to_string(),
            Self::Str(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CanvasCourse {
    id: RawId,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CanvasEnrollment {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CanvasUser {
    id: RawId,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    enrollments: Vec<CanvasEnrollment>,
}

impl CanvasUser {
    fn into_member(self) -> Member {
        let first = self.enrollments.first();
        let kind = first.and_then(|e| e.kind.clone());
        let raw_role = first
            .and_then(|e| e.role.clone())
            .filter(|r| !r.is_empty())
            .or_else(|| kind.clone())
            .unwrap_or_default();

        Member {
            id: self.id.into_string(),
            name: self.name.unwrap_or_default(),
            raw_role,
            hint: kind.as_deref().and_then(hint_for_enrollment_type),
            email: self.email.unwrap_or_default(),
        }
    }
}

/// Map a Canvas base enrollment type to a privilege hint.
pub fn hint_for_enrollment_type(kind: &str) -> Option<RoleHint> {
    match kind {
        "TeacherEnrollment" => Some(RoleHint::Owner),
        "TaEnrollment" => Some(RoleHint::Grader),
        "DesignerEnrollment" => Some(RoleHint::Admin),
        "StudentEnrollment" | "StudentViewEnrollment" => Some(RoleHint::Student),
        "ObserverEnrollment" => Some(RoleHint::Observer),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Course query parsing
// ---------------------------------------------------------------------------

/// Parse a course identifier: a numeric id, a course URL, or `sis_course_id:<id>`.
pub fn parse_course_query(raw: &str) -> Result<CourseQuery> {
    let raw = raw.trim();

    if NUMERIC_ID.is_match(raw) {
        return raw
            .parse()
            .map(CourseQuery::Id)
            .map_err(|e| StaffSyncError::validation(format!("invalid course id '{raw}': {e}")));
    }

    if let Some(caps) = SIS_ID.captures(raw) {
        return Ok(CourseQuery::Sis(caps[1].trim().to_string()));
    }

    if raw.starts_with("http") {
        if let Some(caps) = COURSE_URL.captures(raw) {
            return caps[1]
                .parse()
                .map(CourseQuery::Id)
                .map_err(|e| StaffSyncError::validation(format!("invalid course URL '{raw}': {e}")));
        }
    }

    Err(StaffSyncError::validation(format!(
        "invalid course query: {raw}"
    )))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Authenticated Canvas API client.
#[derive(Debug, Clone)]
pub struct CanvasClient {
    base_url: Url,
    token: String,
    client: Client,
}

impl CanvasClient {
    /// Create a client for the Canvas instance at `base_url`.
    pub fn new(base_url: Url, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| StaffSyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            token: token.into(),
            client,
        })
    }

    /// Headers every authenticated Canvas request carries.
    pub fn standard_headers(&self) -> Vec<(String, String)> {
        vec![
            ("Authorization".into(), format!("Bearer {}", self.token)),
            ("Accept".into(), "application/json".into()),
        ]
    }

    /// Absolute URL for an API path such as `/api/v1/users/5`.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<(T, HeaderMap)> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| StaffSyncError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StaffSyncError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let headers = response.headers().clone();
        let body = response
            .json::<T>()
            .await
            .map_err(|e| StaffSyncError::parse(format!("{url}: {e}")))?;
        Ok((body, headers))
    }
}

impl RosterSource for CanvasClient {
    fn parse_course_query(&self, raw: &str) -> Result<CourseQuery> {
        parse_course_query(raw)
    }

    #[instrument(skip_all, fields(course = %query))]
    async fn resolve_course(&self, query: &CourseQuery) -> Result<Course> {
        let url = self.api_url(&format!("/api/v1/courses/{}", query.path_segment()));
        let (course, _) = self.get_json::<CanvasCourse>(&url).await?;
        let course = Course {
            id: course.id.into_string(),
            name: course.name,
        };
        debug!(id = %course.id, name = ?course.name, "resolved course");
        Ok(course)
    }

    #[instrument(skip_all, fields(course = %query))]
    async fn list_members(&self, query: &CourseQuery) -> Result<Vec<Member>> {
        let mut next = Some(self.api_url(&format!(
            "/api/v1/courses/{}/users?include[]=enrollments&include[]=email&per_page={PER_PAGE}",
            query.path_segment()
        )));
        let mut members = Vec::new();
        let mut pages = 0;

        while let Some(url) = next.take() {
            if pages == MAX_PAGES {
                return Err(StaffSyncError::validation(format!(
                    "user list exceeded {MAX_PAGES} pages"
                )));
            }
            let (users, headers) = self.get_json::<Vec<CanvasUser>>(&url).await?;
            pages += 1;
            debug!(page = pages, count = users.len(), "fetched user page");

            members.extend(users.into_iter().map(CanvasUser::into_member));
            next = next_page_link(&headers);
        }

        info!(count = members.len(), pages, "listed course members");
        Ok(members)
    }
}

/// Extract the `rel="next"` target from a `Link` header.
fn next_page_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        params
            .split(';')
            .any(|p| p.trim() == r#"rel="next""#)
            .then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            })
    })
}
