//! HTTP/SSE backend client.
//!
//! Dispatches a run as `POST {base_url}/v1/runs` and consumes the response
//! body as a server-sent-event stream, one JSON-encoded `AgentEvent` per SSE
//! event. Aborts go to `POST {base_url}/v1/runs/{run_id}/abort`.

use std::pin::Pin;

use anyhow::Result;
use eventsource_stream::{EventStream, Eventsource};
use futures_util::{Stream, StreamExt};

use crate::backend::{AgentEventStream, BackendError, BackendResult, RunRequest};
use crate::events::AgentEvent;

/// Configuration for the HTTP backend.
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Service root, e.g. `https://agent.example.com`.
    pub base_url: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
}

/// HTTP backend client.
#[derive(Clone)]
pub struct HttpBackend {
    config: HttpBackendConfig,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Dispatches a run and returns an async stream of its events.
    ///
    /// # Errors
    /// Returns an error if the request fails or the service responds with a
    /// non-success status.
    pub async fn start_run(&self, request: &RunRequest) -> Result<AgentEventStream> {
        let url = format!("{}/v1/runs", self.config.base_url);
        let mut builder = self.http.post(&url).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| BackendError::from_reqwest(&err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::http_status(status.as_u16(), &body).into());
        }

        Ok(SseEventStream::new(response.bytes_stream()).boxed())
    }

    /// Best-effort abort of an in-flight run.
    ///
    /// # Errors
    /// Returns an error if the abort request fails; callers treat this as
    /// non-fatal.
    pub async fn abort_run(&self, run_id: &str) -> Result<()> {
        let url = format!("{}/v1/runs/{run_id}/abort", self.config.base_url);
        let mut builder = self.http.post(&url);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| BackendError::from_reqwest(&err))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::http_status(status.as_u16(), &body).into());
        }
        Ok(())
    }
}

/// SSE decoder turning the response byte stream into `AgentEvent`s.
struct SseEventStream<S> {
    inner: EventStream<S>,
}

impl<S> SseEventStream<S> {
    fn new(stream: S) -> Self
    where
        S: Eventsource,
    {
        Self {
            inner: stream.eventsource(),
        }
    }
}

impl<S, E> Stream for SseEventStream<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = BackendResult<AgentEvent>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(event))) => Poll::Ready(Some(parse_event_data(&event.data))),
            Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(BackendError::parse(format!(
                "SSE stream error: {err}"
            ))))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Parses one SSE data payload into an `AgentEvent`.
///
/// Unrecognized event kinds deserialize to `AgentEvent::Unknown`; only
/// malformed JSON is an error.
fn parse_event_data(data: &str) -> BackendResult<AgentEvent> {
    serde_json::from_str(data)
        .map_err(|err| BackendError::parse(format!("Failed to parse agent event: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_data_known_kind() {
        let event = parse_event_data(r#"{"type":"content_delta","text":"hi"}"#).unwrap();
        assert_eq!(
            event,
            AgentEvent::ContentDelta {
                text: "hi".to_string()
            }
        );
    }

    #[test]
    fn test_parse_event_data_unknown_kind() {
        let event = parse_event_data(r#"{"type":"future_thing","x":1}"#).unwrap();
        assert_eq!(event, AgentEvent::Unknown);
    }

    #[test]
    fn test_parse_event_data_malformed_json() {
        let err = parse_event_data("{not json").unwrap_err();
        assert_eq!(err.kind, crate::backend::BackendErrorKind::Parse);
    }
}
