//! Session registry and the display-side API.
//!
//! One `DisplayManager` serves many concurrent sessions. The registry map is
//! the only state shared across sessions; each session's record sits behind
//! its own mutex, so the agent pump, the pacing clock, and user control
//! input serialize per session without coupling sessions to one another.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::buffer::extract_processable;
use crate::scheduler::start_if_idle;
use crate::settings::DisplaySettings;
use crate::state::{DisplaySession, SessionSnapshot};
use crate::surface::SurfaceTx;
use crate::wrap::wrap;

type SessionHandle = Arc<Mutex<DisplaySession>>;

/// Display engine front door. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct DisplayManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    surface: SurfaceTx,
    default_settings: DisplaySettings,
}

impl DisplayManager {
    pub fn new(surface: SurfaceTx) -> Self {
        Self::with_default_settings(surface, DisplaySettings::default())
    }

    /// Creates a manager whose lazily-created sessions use `settings`.
    pub fn with_default_settings(surface: SurfaceTx, settings: DisplaySettings) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                sessions: Mutex::new(HashMap::new()),
                surface,
                default_settings: settings,
            }),
        }
    }

    /// Creates a session with the user's resolved settings.
    ///
    /// Idempotent: an existing session keeps its state and settings.
    pub async fn create_session(&self, session_id: &str, settings: DisplaySettings) {
        let mut sessions = self.inner.sessions.lock().await;
        sessions.entry(session_id.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(DisplaySession::new(session_id, settings)))
        });
    }

    /// Appends a streamed text delta to the session's buffer and flushes any
    /// processable prefix into wrapped lines.
    ///
    /// Creates the session with default settings when it does not exist yet
    /// (a session begins when its first utterance is processed). Starts the
    /// scroll loop if new lines arrived while it was idle.
    pub async fn add_text_chunk(&self, session_id: &str, delta: &str) {
        let handle = self.ensure_session(session_id).await;
        let mut state = handle.lock().await;

        state.raw_buffer.push_str(delta);
        let (smart_wrap, line_width) = (state.settings.smart_wrap, state.settings.line_width);
        let Some(chunk) = extract_processable(&mut state.raw_buffer, smart_wrap, line_width)
        else {
            return;
        };

        let wrapped = wrap(&chunk, line_width);
        if wrapped.is_empty() {
            return;
        }
        state.lines.extend(wrapped);
        start_if_idle(&mut state, &handle, &self.inner.surface);
    }

    /// Marks the session's current message complete.
    ///
    /// Any remaining buffered text is wrapped regardless of breakpoints, one
    /// blank line is appended as inter-message spacing, and the scroll loop
    /// is started if idle so the tail drains.
    pub async fn complete_message(&self, session_id: &str) {
        let Some(handle) = self.session(session_id).await else {
            tracing::warn!(session = %session_id, "complete_message for unknown session");
            return;
        };
        let mut state = handle.lock().await;

        let rest = std::mem::take(&mut state.raw_buffer);
        if !rest.is_empty() {
            let wrapped = wrap(&rest, state.settings.line_width);
            state.lines.extend(wrapped);
        }
        state.lines.push(String::new());
        state.is_complete = true;
        start_if_idle(&mut state, &handle, &self.inner.surface);
    }

    /// Interrupts the session's display: invalidates pending ticks, cancels
    /// the render loop, and clears all buffered content.
    ///
    /// Safe at any time, including mid-tick and with no active scroll; a
    /// repeat call while idle is a no-op beyond the same reset.
    pub async fn interrupt_display(&self, session_id: &str) {
        let Some(handle) = self.session(session_id).await else {
            tracing::warn!(session = %session_id, "interrupt_display for unknown session");
            return;
        };
        let mut state = handle.lock().await;
        state.invalidate_ticks();
        state.reset_content();
        tracing::debug!(session = %session_id, "display interrupted");
    }

    /// Pauses scrolling. Only has effect while scrolling; idempotent.
    pub async fn pause_display(&self, session_id: &str) {
        let Some(handle) = self.session(session_id).await else {
            tracing::warn!(session = %session_id, "pause_display for unknown session");
            return;
        };
        let mut state = handle.lock().await;
        if !state.is_scrolling || state.is_paused {
            return;
        }
        state.invalidate_ticks();
        state.is_paused = true;
        state.is_scrolling = false;
    }

    /// Resumes a paused session from its current cursor; never rewinds.
    pub async fn resume_display(&self, session_id: &str) {
        let Some(handle) = self.session(session_id).await else {
            tracing::warn!(session = %session_id, "resume_display for unknown session");
            return;
        };
        let mut state = handle.lock().await;
        if !state.is_paused {
            return;
        }
        state.is_paused = false;
        if state.cursor < state.lines.len() || !state.is_complete {
            start_if_idle(&mut state, &handle, &self.inner.surface);
        }
    }

    /// Maps a manual control input (e.g. a button press) to pause or resume,
    /// keyed off the current pause state.
    pub async fn toggle_pause(&self, session_id: &str) {
        if self.is_display_paused(session_id).await {
            self.resume_display(session_id).await;
        } else {
            self.pause_display(session_id).await;
        }
    }

    /// Returns whether the session is paused; false for unknown sessions.
    pub async fn is_display_paused(&self, session_id: &str) -> bool {
        match self.session(session_id).await {
            Some(handle) => handle.lock().await.is_paused,
            None => false,
        }
    }

    /// Destroys the session record, invalidating any pending tick first.
    pub async fn cleanup_session(&self, session_id: &str) {
        let removed = self.inner.sessions.lock().await.remove(session_id);
        if let Some(handle) = removed {
            handle.lock().await.invalidate_ticks();
            tracing::debug!(session = %session_id, "display session removed");
        }
    }

    /// Point-in-time copy of the session's state, `None` if unknown.
    pub async fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let handle = self.session(session_id).await?;
        let state = handle.lock().await;
        Some(state.snapshot())
    }

    async fn session(&self, session_id: &str) -> Option<SessionHandle> {
        self.inner.sessions.lock().await.get(session_id).cloned()
    }

    async fn ensure_session(&self, session_id: &str) -> SessionHandle {
        let mut sessions = self.inner.sessions.lock().await;
        Arc::clone(sessions.entry(session_id.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(DisplaySession::new(
                session_id,
                self.inner.default_settings.clone(),
            )))
        }))
    }
}
