//! Per-session display state.

use crate::settings::DisplaySettings;

/// Mutable display state for one session.
///
/// All three execution contexts touching a session (agent deltas, the pacing
/// clock, user control input) serialize through the `Mutex` wrapping this
/// struct; nothing here is shared across sessions.
#[derive(Debug)]
pub(crate) struct DisplaySession {
    pub session_id: String,
    pub settings: DisplaySettings,
    /// Pending unwrapped text not yet flushed into `lines`.
    pub raw_buffer: String,
    /// Wrapped lines, append-only until reset.
    pub lines: Vec<String>,
    /// Top row of the visible window. Invariant: `cursor <= lines.len()`.
    pub cursor: usize,
    pub is_scrolling: bool,
    pub is_paused: bool,
    pub is_complete: bool,
    /// Invalidation token for scheduled ticks: a tick only executes if the
    /// generation it captured at schedule time is still live.
    pub generation: u64,
}

impl DisplaySession {
    pub fn new(session_id: impl Into<String>, settings: DisplaySettings) -> Self {
        Self {
            session_id: session_id.into(),
            settings,
            raw_buffer: String::new(),
            lines: Vec::new(),
            cursor: 0,
            is_scrolling: false,
            is_paused: false,
            is_complete: false,
            generation: 0,
        }
    }

    /// Invalidates every scheduled tick. Must run before any state reset.
    pub fn invalidate_ticks(&mut self) {
        self.generation += 1;
    }

    /// Clears buffered content back to a fresh-session shape.
    pub fn reset_content(&mut self) {
        self.raw_buffer.clear();
        self.lines.clear();
        self.cursor = 0;
        self.is_scrolling = false;
        self.is_paused = false;
        self.is_complete = false;
    }

    /// Composes the visible window as one newline-joined blob, clamped to
    /// available lines and padded with blank rows to the window height.
    pub fn compose_window(&self) -> String {
        let height = self.settings.window_height;
        let start = self.cursor.min(self.lines.len());
        let end = (start + height).min(self.lines.len());

        let mut rows: Vec<&str> = self.lines[start..end].iter().map(String::as_str).collect();
        rows.resize(height, "");
        rows.join("\n")
    }

    /// True when the window's upper bound has reached the end of `lines`.
    pub fn window_covers_end(&self) -> bool {
        self.cursor + self.settings.window_height >= self.lines.len()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            lines: self.lines.clone(),
            raw_buffer: self.raw_buffer.clone(),
            cursor: self.cursor,
            is_scrolling: self.is_scrolling,
            is_paused: self.is_paused,
            is_complete: self.is_complete,
        }
    }
}

/// Point-in-time copy of a session's display state, for hosts and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub lines: Vec<String>,
    pub raw_buffer: String,
    pub cursor: usize,
    pub is_scrolling: bool,
    pub is_paused: bool,
    pub is_complete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_lines(lines: &[&str], window_height: usize) -> DisplaySession {
        let settings = DisplaySettings::default().with_window_height(window_height);
        let mut session = DisplaySession::new("s1", settings);
        session.lines = lines.iter().map(ToString::to_string).collect();
        session
    }

    #[test]
    fn test_compose_window_pads_to_height() {
        let session = session_with_lines(&["a", "b"], 4);
        assert_eq!(session.compose_window(), "a\nb\n\n");
    }

    #[test]
    fn test_compose_window_clamps_to_available_lines() {
        let mut session = session_with_lines(&["a", "b", "c", "d", "e", "f"], 4);
        session.cursor = 4;
        assert_eq!(session.compose_window(), "e\nf\n\n");
    }

    #[test]
    fn test_compose_window_full() {
        let mut session = session_with_lines(&["a", "b", "c", "d", "e", "f"], 4);
        session.cursor = 1;
        assert_eq!(session.compose_window(), "b\nc\nd\ne");
    }

    #[test]
    fn test_reset_content_clears_everything() {
        let mut session = session_with_lines(&["a"], 4);
        session.raw_buffer = "pending".to_string();
        session.cursor = 1;
        session.is_scrolling = true;
        session.is_complete = true;
        session.reset_content();
        assert!(session.lines.is_empty());
        assert!(session.raw_buffer.is_empty());
        assert_eq!(session.cursor, 0);
        assert!(!session.is_scrolling && !session.is_paused && !session.is_complete);
    }
}
