//! Testbench API client utilities.
//!
//! This crate provides a lightweight client for the test-management
//! platform's workflow execution service. It focuses on:
//!
//! - Constructing an HTTP client with sensible defaults (timeout, headers,
//!   optional bearer token)
//! - Mapping the platform's error responses into [`ApiError`]
//! - The execution endpoints the run console consumes (`execute`, `get_run`)
//!   and the read-only run history endpoints
//! - The live run stream over WebSocket ([`stream`])
//!
//! The primary entry point is [`PlatformClient`].
//!
//! # Example
//!
//! ```ignore
//! use testbench_api::PlatformClient;
//! use testbench_util::PlatformConfig;
//!
//! async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PlatformClient::new(&PlatformConfig::load()?)?;
//!     let run = client.execute("wf-1", &serde_json::Map::new()).await?;
//!     println!("started {}", run.run_id);
//!     Ok(())
//! }
//! ```

use std::env;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, header};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use testbench_types::{PageRequest, Paginated, WorkflowRunRecord};
use testbench_util::{PlatformConfig, redact_sensitive};
use thiserror::Error;
use tracing::debug;

pub mod stream;

pub use stream::{RunStreamClient, RunSubscription, StreamError};

/// Characters left untouched when a value is used as a single path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Errors returned by [`PlatformClient`].
///
/// Status-code variants mirror the platform's documented error taxonomy.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("request failed with status {code}: {message}")]
    Status { code: u16, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("no runId returned from the execution API")]
    MissingRunId,
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl ApiError {
    /// HTTP status associated with the error, when there is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Validation(_) => Some(400),
            ApiError::NotFound(_) => Some(404),
            ApiError::Conflict(_) => Some(409),
            ApiError::Server(_) => Some(500),
            ApiError::Status { code, .. } => Some(*code),
            ApiError::Transport(error) => error.status().map(|status| status.as_u16()),
            ApiError::Decode(_) | ApiError::MissingRunId | ApiError::Config(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
/// Thin wrapper around a configured `reqwest::Client` for the platform API.
///
/// The client pre-configures default headers and builds requests against the
/// configured base URL.
pub struct PlatformClient {
    pub base_url: String,
    pub http: Client,
    pub user_agent: String,
}

impl PlatformClient {
    /// Construct a [`PlatformClient`] from resolved configuration.
    pub fn new(config: &PlatformConfig) -> Result<Self, ApiError> {
        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        if let Some(token) = config.api_token.as_deref() {
            let mut value = header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ApiError::Config("api token contains characters not allowed in a header".into()))?;
            value.set_sensitive(true);
            default_headers.insert(header::AUTHORIZATION, value);
        }

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            http,
            user_agent: format!("testbench/{}; {}", env!("CARGO_PKG_VERSION"), env::consts::OS),
        })
    }

    /// Build a `reqwest::RequestBuilder` for a method and API-relative path.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "building request");

        self.http.request(method, url).header(header::USER_AGENT, &self.user_agent)
    }

    /// Triggers a workflow execution and returns the run record carrying the new `runId`.
    ///
    /// The variables are sent as `{"variables": {...}}`; the body is omitted
    /// when there are none.
    pub async fn execute(&self, workflow_id: &str, variables: &JsonMap<String, JsonValue>) -> Result<WorkflowRunRecord, ApiError> {
        let mut builder = self.request(Method::POST, &format!("/workflows/{}/execute", segment(workflow_id)));
        if !variables.is_empty() {
            builder = builder.json(&json!({ "variables": variables }));
        }

        let record: WorkflowRunRecord = handle_response(builder.send().await?).await?;
        if record.run_id.trim().is_empty() {
            return Err(ApiError::MissingRunId);
        }
        debug!(workflow_id, run_id = %record.run_id, "workflow execution started");
        Ok(record)
    }

    /// Fetches a run record by id.
    pub async fn get_run(&self, run_id: &str) -> Result<WorkflowRunRecord, ApiError> {
        let response = self.request(Method::GET, &format!("/workflows/runs/{}", segment(run_id))).send().await?;
        handle_response(response).await
    }

    /// Lists past runs of a workflow, newest first as ordered by the server.
    pub async fn run_history(&self, workflow_id: &str, page: PageRequest) -> Result<Paginated<WorkflowRunRecord>, ApiError> {
        let (limit, offset) = page.limit_offset();
        let response = self
            .request(Method::GET, &format!("/workflows/{}/runs", segment(workflow_id)))
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .await?;
        handle_response(response).await
    }

    /// Returns the per-step execution details recorded for a run.
    pub async fn run_steps(&self, run_id: &str) -> Result<Vec<JsonValue>, ApiError> {
        let response = self
            .request(Method::GET, &format!("/workflows/runs/{}/steps", segment(run_id)))
            .send()
            .await?;
        handle_response(response).await
    }

    /// Returns the persisted logs of a run, optionally limited to one step.
    pub async fn run_logs(&self, run_id: &str, step_id: Option<&str>) -> Result<Vec<JsonValue>, ApiError> {
        let mut builder = self.request(Method::GET, &format!("/workflows/runs/{}/logs", segment(run_id)));
        if let Some(step_id) = step_id {
            builder = builder.query(&[("stepId", step_id)]);
        }
        handle_response(builder.send().await?).await
    }
}

/// Percent-encodes a value for use as one URL path segment.
pub fn segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await?;
    decode_body(status, &body)
}

/// Maps a status code and body to either the decoded value or an [`ApiError`].
fn decode_body<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, ApiError> {
    if !status.is_success() {
        return Err(error_for_status(status, body));
    }
    serde_json::from_str(body).map_err(|error| ApiError::Decode(error.to_string()))
}

fn error_for_status(status: StatusCode, body: &str) -> ApiError {
    debug!(status = status.as_u16(), body = %redact_sensitive(body), "request failed");
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.error)
        .filter(|message| !message.trim().is_empty())
        .map(|message| redact_sensitive(&message))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());

    match status {
        StatusCode::BAD_REQUEST => ApiError::Validation(message),
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        StatusCode::CONFLICT => ApiError::Conflict(message),
        StatusCode::INTERNAL_SERVER_ERROR => ApiError::Server(message),
        other => ApiError::Status {
            code: other.as_u16(),
            message,
        },
    }
}
