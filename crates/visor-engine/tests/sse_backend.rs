//! HTTP/SSE backend against a mock agent service.

use futures_util::StreamExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use visor_engine::backend::{
    BackendError, BackendErrorKind, HistoryMessage, HttpBackend, HttpBackendConfig, RunRequest,
};
use visor_engine::events::AgentEvent;

fn backend_for(server: &MockServer) -> HttpBackend {
    HttpBackend::new(HttpBackendConfig {
        base_url: server.uri(),
        api_key: Some("test-api-key".to_string()),
    })
}

fn request(run_id: &str) -> RunRequest {
    RunRequest {
        run_id: run_id.to_string(),
        session_id: "s1".to_string(),
        thread_id: "s1".to_string(),
        user_id: "u1".to_string(),
        messages: vec![HistoryMessage::user("hello")],
    }
}

const SSE_BODY: &str = concat!(
    "data: {\"type\":\"message_start\",\"message_id\":\"m1\"}\n\n",
    "data: {\"type\":\"content_delta\",\"text\":\"Hi \"}\n\n",
    "data: {\"type\":\"content_delta\",\"text\":\"there.\"}\n\n",
    "data: {\"type\":\"shiny_new_kind\",\"payload\":true}\n\n",
    "data: {\"type\":\"message_end\"}\n\n",
);

#[tokio::test]
async fn test_start_run_streams_events() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/runs"))
        .and(header("authorization", "Bearer test-api-key"))
        .and(body_partial_json(serde_json::json!({
            "run_id": "r1",
            "session_id": "s1",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let stream = backend.start_run(&request("r1")).await.unwrap();
    let events: Vec<AgentEvent> = stream.map(|item| item.unwrap()).collect().await;

    assert_eq!(
        events,
        vec![
            AgentEvent::MessageStart {
                message_id: "m1".to_string()
            },
            AgentEvent::ContentDelta {
                text: "Hi ".to_string()
            },
            AgentEvent::ContentDelta {
                text: "there.".to_string()
            },
            AgentEvent::Unknown,
            AgentEvent::MessageEnd,
        ]
    );
}

#[tokio::test]
async fn test_start_run_http_error_is_typed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/runs"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let err = backend.start_run(&request("r1")).await.unwrap_err();
    let backend_err = err.downcast_ref::<BackendError>().unwrap();
    assert_eq!(backend_err.kind, BackendErrorKind::HttpStatus);
    assert!(backend_err.message.contains("503"));
    assert_eq!(backend_err.details.as_deref(), Some("overloaded"));
}

#[tokio::test]
async fn test_malformed_event_surfaces_as_stream_error() {
    let server = MockServer::start().await;
    let body = "data: {definitely not json}\n\n";
    Mock::given(method("POST"))
        .and(path("/v1/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let mut stream = backend.start_run(&request("r1")).await.unwrap();
    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.kind, BackendErrorKind::Parse);
}

#[tokio::test]
async fn test_abort_run_posts_to_abort_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/runs/r1/abort"))
        .and(header("authorization", "Bearer test-api-key"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    backend.abort_run("r1").await.unwrap();
}

#[tokio::test]
async fn test_abort_run_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/runs/r1/abort"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    assert!(backend.abort_run("r1").await.is_err());
}
