//! Backend-agnostic run dispatch.
//!
//! A backend accepts one run per utterance and streams `AgentEvent`s back.
//! Two implementations: an HTTP/SSE client for a remote agent service, and
//! an in-process channel backend for tests and embedding hosts.

use std::fmt;

use anyhow::Result;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::AgentEvent;

pub mod channel;
pub mod http;

pub use channel::{ChannelBackend, RunDispatch, RunDispatchRx, create_channel_backend};
pub use http::{HttpBackend, HttpBackendConfig};

/// One turn of conversational context sent with a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: String,
    pub role: String,
    pub content: String,
}

impl HistoryMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A run dispatch: one request/response cycle for a single utterance (or, in
/// stateful mode, the full history).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub run_id: String,
    pub session_id: String,
    pub thread_id: String,
    pub user_id: String,
    pub messages: Vec<HistoryMessage>,
}

/// Categories of backend errors for consistent handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    /// HTTP status error (4xx, 5xx)
    HttpStatus,
    /// Connection timeout or request timeout
    Timeout,
    /// Failed to parse a streamed event
    Parse,
    /// Transport-level or backend-reported failure
    Api,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendErrorKind::HttpStatus => write!(f, "http_status"),
            BackendErrorKind::Timeout => write!(f, "timeout"),
            BackendErrorKind::Parse => write!(f, "parse"),
            BackendErrorKind::Api => write!(f, "api"),
        }
    }
}

/// Structured error from the backend with kind and details.
#[derive(Debug, Clone)]
pub struct BackendError {
    /// Error category
    pub kind: BackendErrorKind,
    /// One-line summary suitable for logs
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Creates an HTTP status error, lifting the body into details.
    pub fn http_status(status: u16, body: &str) -> Self {
        Self {
            kind: BackendErrorKind::HttpStatus,
            message: format!("HTTP {status}"),
            details: (!body.is_empty()).then(|| body.to_string()),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Parse, message)
    }

    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(BackendErrorKind::Timeout, err.to_string())
        } else {
            Self::new(BackendErrorKind::Api, err.to_string())
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for BackendError {}

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Boxed stream of agent events for one run.
pub type AgentEventStream = BoxStream<'static, BackendResult<AgentEvent>>;

/// Backend selection. Cheap to clone.
#[derive(Clone)]
pub enum BackendClient {
    Http(HttpBackend),
    Channel(ChannelBackend),
}

impl BackendClient {
    /// Dispatches a run and returns its event stream.
    ///
    /// # Errors
    /// Returns an error if the run could not be dispatched; mid-stream
    /// failures surface as `Err` items on the returned stream instead.
    pub async fn start_run(&self, request: RunRequest) -> Result<AgentEventStream> {
        match self {
            BackendClient::Http(backend) => backend.start_run(&request).await,
            BackendClient::Channel(backend) => backend.start_run(request).await,
        }
    }

    /// Requests cancellation of an in-flight run. Best-effort: failures are
    /// reported but never fatal to the session.
    ///
    /// # Errors
    /// Returns an error if the backend rejected or could not receive the
    /// abort request.
    pub async fn abort_run(&self, run_id: &str) -> Result<()> {
        match self {
            BackendClient::Http(backend) => backend.abort_run(run_id).await,
            BackendClient::Channel(backend) => backend.abort_run(run_id),
        }
    }
}
