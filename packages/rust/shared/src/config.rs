//! Application configuration for staffsync.
//!
//! Settings are layered, later layers winning: built-in defaults, the optional
//! `staffsync.toml` in the project root, environment variables (with
//! `.env.local` filling in anything the process environment lacks), and
//! finally CLI flags.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, StaffSyncError};
use crate::types::{DEFAULT_COURSE_NAME, FALLBACK_BIO};

/// Optional config file name, looked up in the project root.
const CONFIG_FILE_NAME: &str = "staffsync.toml";

/// Dotenv-style file with local secrets, looked up in the project root.
const ENV_FILE_NAME: &str = ".env.local";

/// Canvas host used when nothing else is configured.
const DEFAULT_SERVER: &str = "canvas.ucsc.edu";

// ---------------------------------------------------------------------------
// Config structs (matching staffsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Canvas connection settings.
    #[serde(default)]
    pub canvas: CanvasConfig,

    /// Output file settings.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[canvas]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasConfig {
    /// Canvas host, with or without scheme.
    #[serde(default = "default_server")]
    pub server: String,

    /// Course name used when Canvas reports none.
    #[serde(default = "default_course_name")]
    pub default_course_name: String,

    /// Per-request timeout for email lookups, in seconds.
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            default_course_name: default_course_name(),
            lookup_timeout_secs: default_lookup_timeout(),
        }
    }
}

fn default_server() -> String {
    DEFAULT_SERVER.into()
}
fn default_course_name() -> String {
    DEFAULT_COURSE_NAME.into()
}
fn default_lookup_timeout() -> u64 {
    3
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Staff document path, relative to the project root.
    #[serde(default = "default_staff_path")]
    pub staff_path: String,

    /// Bio store path, relative to the project root.
    #[serde(default = "default_bio_path")]
    pub bio_path: String,

    /// Bio text given to newly added instructors.
    #[serde(default = "default_fallback_bio")]
    pub fallback_bio: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            staff_path: default_staff_path(),
            bio_path: default_bio_path(),
            fallback_bio: default_fallback_bio(),
        }
    }
}

fn default_staff_path() -> String {
    "src/data/canvas-staff.json".into()
}
fn default_bio_path() -> String {
    "src/data/instructor-bio.json".into()
}
fn default_fallback_bio() -> String {
    FALLBACK_BIO.into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load `staffsync.toml` from `project_root`. Returns defaults if the file does not exist.
pub fn load_config(project_root: &Path) -> Result<AppConfig> {
    let path = project_root.join(CONFIG_FILE_NAME);

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| StaffSyncError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| StaffSyncError::config(format!("failed to parse {}: {e}", path.display())))
}

// ---------------------------------------------------------------------------
// Environment layer
// ---------------------------------------------------------------------------

/// Environment lookup: the process environment first, then `.env.local` values.
#[derive(Debug, Clone, Default)]
pub struct EnvLayer {
    file: HashMap<String, String>,
    use_process: bool,
}

impl EnvLayer {
    /// Read `.env.local` from `project_root` (if present) on top of the process environment.
    pub fn load(project_root: &Path) -> Result<Self> {
        let path = project_root.join(ENV_FILE_NAME);
        let file = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| StaffSyncError::io(&path, e))?;
            let vars = parse_env_file(&content);
            tracing::debug!(?path, count = vars.len(), "loaded env file");
            vars
        } else {
            HashMap::new()
        };

        Ok(Self {
            file,
            use_process: true,
        })
    }

    /// A layer backed only by the given pairs. The process environment is ignored.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            file: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            use_process: false,
        }
    }

    /// Raw value for `key`. A variable set in the process shadows the file,
    /// even when it is empty.
    pub fn get(&self, key: &str) -> Option<String> {
        if self.use_process {
            if let Ok(value) = std::env::var(key) {
                return Some(value);
            }
        }
        self.file.get(key).cloned()
    }

    /// First non-empty value among `keys`.
    fn first_non_empty(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|key| self.get(key))
            .find(|value| !value.is_empty())
    }
}

/// Parse `KEY=VALUE` lines, skipping blanks and `#` comments and
/// stripping surrounding quotes from values.
pub fn parse_env_file(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        vars.insert(key.trim().to_string(), value.to_string());
    }
    vars
}

// ---------------------------------------------------------------------------
// Runtime settings (merged from config + env + CLI flags)
// ---------------------------------------------------------------------------

/// Values supplied on the command line. `None` defers to env and config.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub server: Option<String>,
    pub token: Option<String>,
    pub course: Option<String>,
    pub skip_emails: bool,
    pub staff_path: Option<PathBuf>,
    pub bio_path: Option<PathBuf>,
}

/// Fully resolved settings for one run.
#[derive(Clone)]
pub struct RunSettings {
    /// Canvas host, as configured (scheme optional).
    pub server: String,
    pub token: String,
    /// Unparsed course identifier.
    pub course: String,
    pub skip_emails: bool,
    pub lookup_timeout: Duration,
    pub default_course_name: String,
    pub fallback_bio: String,
    pub staff_path: PathBuf,
    pub bio_path: PathBuf,
}

impl std::fmt::Debug for RunSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunSettings")
            .field("server", &self.server)
            .field("token", &"<redacted>")
            .field("course", &self.course)
            .field("skip_emails", &self.skip_emails)
            .field("lookup_timeout", &self.lookup_timeout)
            .field("default_course_name", &self.default_course_name)
            .field("fallback_bio", &self.fallback_bio)
            .field("staff_path", &self.staff_path)
            .field("bio_path", &self.bio_path)
            .finish()
    }
}

impl RunSettings {
    /// Merge all layers. Fails if the token or course id is missing.
    pub fn resolve(
        config: &AppConfig,
        env: &EnvLayer,
        overrides: &SettingsOverrides,
        project_root: &Path,
    ) -> Result<Self> {
        let server = non_empty(overrides.server.clone())
            .or_else(|| env.first_non_empty(&["CANVAS_SERVER"]))
            .or_else(|| {
                env.first_non_empty(&["VITE_CANVAS_API_BASE_URL"])
                    .map(|url| strip_scheme(&url))
                    .filter(|host| !host.is_empty())
            })
            .or_else(|| non_empty(Some(config.canvas.server.clone())))
            .unwrap_or_else(default_server);

        let token = non_empty(overrides.token.clone())
            .or_else(|| env.first_non_empty(&["CANVAS_TOKEN", "VITE_CANVAS_API_TOKEN"]))
            .ok_or_else(|| {
                StaffSyncError::config(
                    "Canvas token not found. Set CANVAS_TOKEN or VITE_CANVAS_API_TOKEN environment variable",
                )
            })?;

        let course = non_empty(overrides.course.clone())
            .or_else(|| env.first_non_empty(&["CANVAS_COURSE_ID", "VITE_CANVAS_COURSE_ID"]))
            .ok_or_else(|| {
                StaffSyncError::config(
                    "Canvas course ID not found. Set CANVAS_COURSE_ID or VITE_CANVAS_COURSE_ID environment variable",
                )
            })?;

        let skip_emails =
            overrides.skip_emails || env.get("SKIP_EMAIL_FETCH").as_deref() == Some("1");

        let staff_path = overrides
            .staff_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.output.staff_path));
        let bio_path = overrides
            .bio_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.output.bio_path));

        Ok(Self {
            server,
            token,
            course,
            skip_emails,
            lookup_timeout: Duration::from_secs(config.canvas.lookup_timeout_secs),
            default_course_name: config.canvas.default_course_name.clone(),
            fallback_bio: config.output.fallback_bio.clone(),
            staff_path: project_root.join(staff_path),
            bio_path: project_root.join(bio_path),
        })
    }

    /// Base URL of the Canvas instance; `https://` is assumed when no scheme is given.
    pub fn base_url(&self) -> Result<Url> {
        let raw = if self.server.starts_with("http") {
            self.server.clone()
        } else {
            format!("https://{}", self.server)
        };
        Url::parse(raw.trim_end_matches('/'))
            .map_err(|e| StaffSyncError::config(format!("invalid Canvas server '{}': {e}", self.server)))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn strip_scheme(url: &str) -> String {
    url.replace("https://", "").replace("http://", "")
}
