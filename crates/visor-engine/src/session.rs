//! Per-session agent runs.
//!
//! `SessionRunner` owns the agent side of each session: conversation
//! history, run dispatch, and the event pump that routes streamed content
//! into the display engine. Interruption is race-safe: each run carries a
//! cancellation gate that is checked per delivered event, so an event from a
//! superseded run can never mutate display state after the interrupt, even
//! if it was already in flight.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use visor_display::{DisplayManager, DisplaySettings, SurfaceTx};

use crate::backend::{
    AgentEventStream, BackendClient, HistoryMessage, HttpBackend, HttpBackendConfig, RunRequest,
};
use crate::config::Config;
use crate::events::AgentEvent;

/// Shown when a run fails mid-stream or cannot be dispatched.
const RUN_FAILURE_MESSAGE: &str = "Sorry, something went wrong. Please try again.";

/// Shown when no backend endpoint is configured.
const BACKEND_MISSING_MESSAGE: &str = "Assistant is not available right now.";

/// Agent-side state for one session.
struct AgentSession {
    user_id: String,
    /// Conversation thread identifier; defaults to the session id so
    /// continuity survives across turns.
    thread_id: String,
    /// Completed turns, stateful mode only. Append-only, never reordered.
    history: Vec<HistoryMessage>,
    /// Set by `interrupt_session`; cleared when the next utterance arrives.
    interrupted: bool,
    active_run: Option<ActiveRun>,
}

impl AgentSession {
    fn new(session_id: &str, user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            thread_id: session_id.to_string(),
            history: Vec::new(),
            interrupted: false,
            active_run: None,
        }
    }
}

/// The one outstanding run allowed per session.
struct ActiveRun {
    run_id: String,
    /// Cancellation gate checked before every event delivery.
    gate: CancellationToken,
}

type SessionHandle = Arc<Mutex<AgentSession>>;

/// Agent session front door. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct SessionRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    backend: Option<BackendClient>,
    display: DisplayManager,
    display_settings: DisplaySettings,
    sessions: Mutex<HashMap<String, SessionHandle>>,
    stateful: bool,
}

impl SessionRunner {
    /// Builds a runner from configuration, wiring an HTTP backend when an
    /// endpoint is configured.
    ///
    /// # Errors
    /// Returns an error if the configured backend URL is invalid.
    pub fn new(config: &Config, surface: SurfaceTx) -> Result<Self> {
        let backend = config.backend.effective_base_url()?.map(|base_url| {
            BackendClient::Http(HttpBackend::new(HttpBackendConfig {
                base_url,
                api_key: config.backend.effective_api_key(),
            }))
        });
        Ok(Self::build(config, surface, backend))
    }

    /// Builds a runner around an explicit backend (e.g. a channel backend).
    pub fn with_backend(config: &Config, surface: SurfaceTx, backend: BackendClient) -> Self {
        Self::build(config, surface, Some(backend))
    }

    fn build(config: &Config, surface: SurfaceTx, backend: Option<BackendClient>) -> Self {
        let display_settings = config.display_settings();
        let display = DisplayManager::with_default_settings(surface, display_settings.clone());
        Self {
            inner: Arc::new(RunnerInner {
                backend,
                display,
                display_settings,
                sessions: Mutex::new(HashMap::new()),
                stateful: config.sessions.stateful,
            }),
        }
    }

    /// The display side of the engine, for pause/resume/interrupt control.
    pub fn display(&self) -> &DisplayManager {
        &self.inner.display
    }

    /// Creates a session. Idempotent: an existing session is kept as-is.
    pub async fn create_session(&self, session_id: &str, user_id: &str) {
        {
            let mut sessions = self.inner.sessions.lock().await;
            if !sessions.contains_key(session_id) {
                sessions.insert(
                    session_id.to_string(),
                    Arc::new(Mutex::new(AgentSession::new(session_id, user_id))),
                );
                tracing::info!(session = %session_id, user = %user_id, "session created");
            }
        }
        self.inner
            .display
            .create_session(session_id, self.inner.display_settings.clone())
            .await;
    }

    /// Processes a final user utterance: retires any in-flight run, then
    /// dispatches a new one and pumps its events into the display pipeline.
    ///
    /// Dispatch failures and a missing backend surface as a visible failure
    /// message; the session stays usable for the next utterance.
    ///
    /// # Errors
    /// Returns an error if the session was never created.
    pub async fn process_transcription(&self, session_id: &str, utterance: &str) -> Result<()> {
        let handle = self
            .session(session_id)
            .await
            .ok_or_else(|| anyhow!("unknown session: {session_id}"))?;
        let mut session = handle.lock().await;
        session.interrupted = false;

        // Retire the previous run before arming a new one.
        if let Some(run) = session.active_run.take() {
            run.gate.cancel();
            self.spawn_abort(run.run_id);
        }

        let Some(backend) = self.inner.backend.clone() else {
            drop(session);
            tracing::warn!(session = %session_id, "no backend configured, dropping utterance");
            self.deliver_failure(session_id, BACKEND_MISSING_MESSAGE)
                .await;
            return Ok(());
        };

        let messages = if self.inner.stateful {
            session.history.push(HistoryMessage::user(utterance));
            session.history.clone()
        } else {
            vec![HistoryMessage::user(utterance)]
        };

        let run_id = Uuid::new_v4().to_string();
        let request = RunRequest {
            run_id: run_id.clone(),
            session_id: session_id.to_string(),
            thread_id: session.thread_id.clone(),
            user_id: session.user_id.clone(),
            messages,
        };

        tracing::debug!(session = %session_id, run = %run_id, "dispatching run");
        let stream = match backend.start_run(request).await {
            Ok(stream) => stream,
            Err(err) => {
                drop(session);
                tracing::warn!(session = %session_id, error = %err, "failed to start run");
                self.deliver_failure(session_id, RUN_FAILURE_MESSAGE).await;
                return Ok(());
            }
        };

        let gate = CancellationToken::new();
        spawn_event_pump(
            stream,
            gate.clone(),
            PumpContext {
                session_id: session_id.to_string(),
                run_id: run_id.clone(),
                display: self.inner.display.clone(),
                session: Arc::clone(&handle),
                stateful: self.inner.stateful,
            },
        );
        session.active_run = Some(ActiveRun { run_id, gate });
        Ok(())
    }

    /// Interrupts the in-flight run: no event from it may reach the display
    /// pipeline after this returns, even one already in flight.
    pub async fn interrupt_session(&self, session_id: &str) {
        let Some(handle) = self.session(session_id).await else {
            tracing::warn!(session = %session_id, "interrupt for unknown session");
            return;
        };
        let mut session = handle.lock().await;
        session.interrupted = true;
        if let Some(run) = session.active_run.take() {
            run.gate.cancel();
            self.spawn_abort(run.run_id);
            tracing::debug!(session = %session_id, "run interrupted");
        }
    }

    /// Appends a completed assistant turn to history. No-op in stateless
    /// mode.
    pub async fn add_assistant_message(&self, session_id: &str, content: &str) {
        if !self.inner.stateful {
            return;
        }
        let Some(handle) = self.session(session_id).await else {
            tracing::warn!(session = %session_id, "assistant message for unknown session");
            return;
        };
        let mut session = handle.lock().await;
        session.history.push(HistoryMessage::assistant(content));
    }

    /// Retires any active run and discards the session's agent and display
    /// state.
    pub async fn remove_session(&self, session_id: &str) {
        let removed = self.inner.sessions.lock().await.remove(session_id);
        if let Some(handle) = removed {
            let mut session = handle.lock().await;
            if let Some(run) = session.active_run.take() {
                run.gate.cancel();
                self.spawn_abort(run.run_id);
            }
            tracing::info!(session = %session_id, "session removed");
        }
        self.inner.display.cleanup_session(session_id).await;
    }

    /// Copy of the session's history, `None` if unknown.
    pub async fn history(&self, session_id: &str) -> Option<Vec<HistoryMessage>> {
        let handle = self.session(session_id).await?;
        let session = handle.lock().await;
        Some(session.history.clone())
    }

    /// Whether the session is currently interrupted; false if unknown.
    pub async fn is_interrupted(&self, session_id: &str) -> bool {
        match self.session(session_id).await {
            Some(handle) => handle.lock().await.interrupted,
            None => false,
        }
    }

    async fn session(&self, session_id: &str) -> Option<SessionHandle> {
        self.inner.sessions.lock().await.get(session_id).cloned()
    }

    /// Best-effort backend abort off the caller's critical path.
    fn spawn_abort(&self, run_id: String) {
        let Some(backend) = self.inner.backend.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(err) = backend.abort_run(&run_id).await {
                tracing::debug!(run = %run_id, error = %err, "backend abort failed");
            }
        });
    }

    /// Routes a visible failure message through the normal display pipeline
    /// so the user sees a message rather than silence.
    async fn deliver_failure(&self, session_id: &str, message: &str) {
        self.inner.display.add_text_chunk(session_id, message).await;
        self.inner.display.complete_message(session_id).await;
    }
}

struct PumpContext {
    session_id: String,
    run_id: String,
    display: DisplayManager,
    session: SessionHandle,
    stateful: bool,
}

/// Consumes one run's event stream and routes it into the display pipeline.
///
/// The gate is re-checked for every event at delivery time; unsubscription
/// alone is not trusted to be instantaneous.
fn spawn_event_pump(mut stream: AgentEventStream, gate: CancellationToken, ctx: PumpContext) {
    tokio::spawn(async move {
        let mut assistant_text = String::new();
        let mut delivered = false;
        let mut completed = false;

        loop {
            let item = tokio::select! {
                () = gate.cancelled() => return,
                item = stream.next() => item,
            };
            let Some(item) = item else { break };
            if gate.is_cancelled() {
                return;
            }

            match item {
                Ok(AgentEvent::MessageStart { message_id }) => {
                    tracing::debug!(session = %ctx.session_id, message = %message_id, "message started");
                }
                Ok(AgentEvent::ContentDelta { text }) => {
                    ctx.display.add_text_chunk(&ctx.session_id, &text).await;
                    assistant_text.push_str(&text);
                    delivered = true;
                }
                Ok(AgentEvent::MessageEnd) => {
                    ctx.display.complete_message(&ctx.session_id).await;
                    completed = true;
                    if ctx.stateful && !assistant_text.is_empty() {
                        let mut session = ctx.session.lock().await;
                        session
                            .history
                            .push(HistoryMessage::assistant(std::mem::take(
                                &mut assistant_text,
                            )));
                    }
                }
                Ok(AgentEvent::ToolCallStart { name }) => {
                    tracing::info!(session = %ctx.session_id, tool = %name, "tool call started");
                }
                Ok(AgentEvent::ToolCallEnd { name }) => {
                    tracing::info!(session = %ctx.session_id, tool = %name, "tool call finished");
                }
                Ok(AgentEvent::Error { message }) => {
                    tracing::warn!(session = %ctx.session_id, error = %message, "run reported an error");
                    ctx.display
                        .add_text_chunk(&ctx.session_id, RUN_FAILURE_MESSAGE)
                        .await;
                    ctx.display.complete_message(&ctx.session_id).await;
                    completed = true;
                }
                Ok(AgentEvent::StateSnapshot { .. } | AgentEvent::StateDelta { .. }) => {
                    // Owned by a different tier.
                    tracing::debug!(session = %ctx.session_id, "state event ignored");
                }
                Ok(AgentEvent::Unknown) => {
                    tracing::warn!(session = %ctx.session_id, "unknown event kind dropped");
                }
                Err(err) => {
                    tracing::warn!(session = %ctx.session_id, error = %err, "run stream failed");
                    ctx.display
                        .add_text_chunk(&ctx.session_id, RUN_FAILURE_MESSAGE)
                        .await;
                    ctx.display.complete_message(&ctx.session_id).await;
                    completed = true;
                    break;
                }
            }
        }

        if gate.is_cancelled() {
            return;
        }

        // Streams that close without a message-end still drain the buffer.
        if delivered && !completed {
            ctx.display.complete_message(&ctx.session_id).await;
        }

        let mut session = ctx.session.lock().await;
        if session
            .active_run
            .as_ref()
            .is_some_and(|run| run.run_id == ctx.run_id)
        {
            session.active_run = None;
        }
    });
}
