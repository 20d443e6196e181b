//! reqwest-backed [`EmailTransport`].

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use staffsync_shared::{Result, StaffSyncError};

use crate::{EmailTransport, USER_AGENT};

/// A single GET with its own headers and timeout.
#[derive(Debug, Clone)]
pub struct LookupRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

/// Status plus the decoded JSON body, when the body was JSON.
#[derive(Debug, Clone)]
pub struct LookupResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl LookupResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// HTTP transport over a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build the transport. Per-request timeouts come from each [`LookupRequest`].
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .map_err(|e| StaffSyncError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl EmailTransport for HttpTransport {
    async fn get(&self, request: &LookupRequest) -> Result<LookupResponse> {
        let mut builder = self.client.get(&request.url).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                StaffSyncError::Network(format!("{}: timed out", request.url))
            } else {
                StaffSyncError::Network(format!("{}: {e}", request.url))
            }
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            StaffSyncError::Network(format!("{}: body read failed: {e}", request.url))
        })?;
        let body = serde_json::from_str(&text).ok();

        debug!(url = %request.url, status, json = body.is_some(), "lookup response");
        Ok(LookupResponse { status, body })
    }
}
