//! In-process channel backend.
//!
//! The host receives `RunDispatch`es from a channel and answers each one by
//! pushing events into its `events` sender. Used by tests and by hosts that
//! bridge their own agent transport.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{AgentEventStream, BackendResult, RunRequest};
use crate::events::AgentEvent;

/// Per-run event channel capacity.
pub const RUN_EVENT_CHANNEL_CAPACITY: usize = 128;

/// One dispatched run, handed to the host side of the channel.
pub struct RunDispatch {
    pub request: RunRequest,
    /// The host pushes the run's events here; dropping it ends the stream.
    pub events: mpsc::Sender<BackendResult<AgentEvent>>,
    /// Cancelled when the engine aborts the run; the host should stop
    /// producing events once it fires.
    pub abort: CancellationToken,
}

/// Receiver side handed to the host.
pub type RunDispatchRx = mpsc::UnboundedReceiver<RunDispatch>;

type AbortMap = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Channel-based backend. Cheap to clone.
#[derive(Clone)]
pub struct ChannelBackend {
    dispatch_tx: mpsc::UnboundedSender<RunDispatch>,
    aborts: AbortMap,
}

/// Creates a channel backend plus the dispatch receiver for the host side.
pub fn create_channel_backend() -> (ChannelBackend, RunDispatchRx) {
    let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
    (
        ChannelBackend {
            dispatch_tx,
            aborts: Arc::new(Mutex::new(HashMap::new())),
        },
        dispatch_rx,
    )
}

impl ChannelBackend {
    /// Hands the run to the host and returns the stream of its events.
    ///
    /// # Errors
    /// Returns an error if the host side has gone away.
    pub(crate) async fn start_run(&self, request: RunRequest) -> Result<AgentEventStream> {
        let (events_tx, events_rx) = mpsc::channel(RUN_EVENT_CHANNEL_CAPACITY);
        let abort = CancellationToken::new();
        let run_id = request.run_id.clone();

        if let Ok(mut aborts) = self.aborts.lock() {
            aborts.insert(run_id.clone(), abort.clone());
        }

        let dispatch = RunDispatch {
            request,
            events: events_tx,
            abort,
        };
        if self.dispatch_tx.send(dispatch).is_err() {
            if let Ok(mut aborts) = self.aborts.lock() {
                aborts.remove(&run_id);
            }
            return Err(anyhow!("channel backend host is gone"));
        }

        let registration = AbortRegistration {
            run_id,
            aborts: Arc::clone(&self.aborts),
        };
        Ok(ReceiverEventStream {
            rx: events_rx,
            _registration: registration,
        }
        .boxed())
    }

    /// Cancels the run's abort token; a no-op for unknown or finished runs.
    #[allow(clippy::unnecessary_wraps)]
    pub(crate) fn abort_run(&self, run_id: &str) -> Result<()> {
        if let Ok(mut aborts) = self.aborts.lock()
            && let Some(token) = aborts.remove(run_id)
        {
            token.cancel();
        }
        Ok(())
    }
}

/// Removes the run's abort entry when its event stream is dropped.
struct AbortRegistration {
    run_id: String,
    aborts: AbortMap,
}

impl Drop for AbortRegistration {
    fn drop(&mut self) {
        if let Ok(mut aborts) = self.aborts.lock() {
            aborts.remove(&self.run_id);
        }
    }
}

struct ReceiverEventStream {
    rx: mpsc::Receiver<BackendResult<AgentEvent>>,
    _registration: AbortRegistration,
}

impl Stream for ReceiverEventStream {
    type Item = BackendResult<AgentEvent>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;
    use crate::backend::HistoryMessage;

    fn request(run_id: &str) -> RunRequest {
        RunRequest {
            run_id: run_id.to_string(),
            session_id: "s1".to_string(),
            thread_id: "s1".to_string(),
            user_id: "u1".to_string(),
            messages: vec![HistoryMessage::user("hi")],
        }
    }

    #[tokio::test]
    async fn test_dispatch_and_stream_delivery() {
        let (backend, mut dispatch_rx) = create_channel_backend();
        let mut stream = backend.start_run(request("r1")).await.unwrap();

        let dispatch = dispatch_rx.recv().await.unwrap();
        assert_eq!(dispatch.request.run_id, "r1");
        dispatch
            .events
            .send(Ok(AgentEvent::ContentDelta {
                text: "hello".to_string(),
            }))
            .await
            .unwrap();
        drop(dispatch);

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(
            event,
            AgentEvent::ContentDelta {
                text: "hello".to_string()
            }
        );
        // Host dropped its sender: the stream ends.
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_abort_fires_dispatch_token() {
        let (backend, mut dispatch_rx) = create_channel_backend();
        let _stream = backend.start_run(request("r1")).await.unwrap();
        let dispatch = dispatch_rx.recv().await.unwrap();

        assert!(!dispatch.abort.is_cancelled());
        backend.abort_run("r1").unwrap();
        assert!(dispatch.abort.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_stream_releases_abort_entry() {
        let (backend, mut dispatch_rx) = create_channel_backend();
        let stream = backend.start_run(request("r1")).await.unwrap();
        let dispatch = dispatch_rx.recv().await.unwrap();
        drop(stream);

        // The registration is gone; abort no longer reaches the token.
        backend.abort_run("r1").unwrap();
        assert!(!dispatch.abort.is_cancelled());
    }

    #[tokio::test]
    async fn test_start_run_fails_when_host_gone() {
        let (backend, dispatch_rx) = create_channel_backend();
        drop(dispatch_rx);
        assert!(backend.start_run(request("r1")).await.is_err());
    }
}
