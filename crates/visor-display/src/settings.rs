//! Per-user display settings.

use std::time::Duration;

/// Default line width for small wearable surfaces, in chars.
pub const DEFAULT_LINE_WIDTH: usize = 30;

/// Default pacing interval between scroll ticks.
pub const DEFAULT_SCROLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default number of rows in the rendered window.
pub const DEFAULT_WINDOW_HEIGHT: usize = 4;

/// Resolved display settings for one session's user.
///
/// The hardware tier owns per-user preference storage; it resolves values
/// before session creation and falls back to these defaults when a
/// preference is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySettings {
    /// Maximum chars per wrapped line.
    pub line_width: usize,
    /// Delay between scroll ticks (one line per tick).
    pub scroll_interval: Duration,
    /// When false, text is wrapped and shown as soon as it arrives instead
    /// of waiting for a natural breakpoint.
    pub smart_wrap: bool,
    /// Rows rendered per frame; frames are padded to exactly this height.
    pub window_height: usize,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            line_width: DEFAULT_LINE_WIDTH,
            scroll_interval: DEFAULT_SCROLL_INTERVAL,
            smart_wrap: true,
            window_height: DEFAULT_WINDOW_HEIGHT,
        }
    }
}

impl DisplaySettings {
    #[must_use]
    pub fn with_line_width(mut self, line_width: usize) -> Self {
        self.line_width = line_width;
        self
    }

    #[must_use]
    pub fn with_scroll_interval(mut self, interval: Duration) -> Self {
        self.scroll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_smart_wrap(mut self, smart_wrap: bool) -> Self {
        self.smart_wrap = smart_wrap;
        self
    }

    #[must_use]
    pub fn with_window_height(mut self, window_height: usize) -> Self {
        self.window_height = window_height;
        self
    }
}
