//! Render channel toward the physical surface.
//!
//! The hardware tier consumes composed frames from a bounded channel.
//! Sends are best-effort: a full channel drops the frame rather than stall
//! a session's pacing clock, and the next tick supersedes it anyway.

use tokio::sync::mpsc;

/// One composed window, ready to render as a single text blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceFrame {
    pub session_id: String,
    /// Newline-joined rows, padded to the session's window height.
    pub text: String,
}

/// Channel-based frame sender (bounded).
pub type SurfaceTx = mpsc::Sender<SurfaceFrame>;

/// Channel-based frame receiver (bounded).
pub type SurfaceRx = mpsc::Receiver<SurfaceFrame>;

/// Default frame channel capacity.
pub const DEFAULT_SURFACE_CHANNEL_CAPACITY: usize = 64;

/// Creates a bounded frame channel with the default capacity.
pub fn create_surface_channel() -> (SurfaceTx, SurfaceRx) {
    mpsc::channel(DEFAULT_SURFACE_CHANNEL_CAPACITY)
}
