//! Timer-driven scroll pacing.
//!
//! Scrolling is an explicit loop task keyed by the session's generation
//! token rather than a cancellable timer handle: any state-resetting
//! operation bumps the generation, and a tick whose captured generation no
//! longer matches is discarded unexecuted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::state::DisplaySession;
use crate::surface::{SurfaceFrame, SurfaceTx};

pub(crate) enum TickOutcome {
    /// Cursor advanced; another tick is due after the pacing interval.
    Continue,
    /// Message complete and fully shown; scrolling stopped.
    Finished,
    /// Out of lines before the message completed; scrolling stopped until
    /// the next append restarts it.
    Starved,
}

/// Renders the current window and advances the state machine by one tick.
pub(crate) fn render_tick(state: &mut DisplaySession, surface: &SurfaceTx) -> TickOutcome {
    let frame = SurfaceFrame {
        session_id: state.session_id.clone(),
        text: state.compose_window(),
    };
    if surface.try_send(frame).is_err() {
        // Best-effort rendering: the next tick supersedes a dropped frame.
        tracing::debug!(session = %state.session_id, "surface channel unavailable, frame dropped");
    }

    if state.is_complete && state.window_covers_end() {
        state.is_scrolling = false;
        TickOutcome::Finished
    } else if state.cursor >= state.lines.len() {
        state.is_scrolling = false;
        TickOutcome::Starved
    } else {
        state.cursor += 1;
        TickOutcome::Continue
    }
}

/// Starts the scroll loop if the session is idle.
///
/// No-op while already scrolling or paused. Otherwise performs an immediate
/// render tick and, if more lines remain, spawns the paced loop. Must be
/// called with the session lock held (`state` borrows from `handle`).
pub(crate) fn start_if_idle(
    state: &mut DisplaySession,
    handle: &Arc<Mutex<DisplaySession>>,
    surface: &SurfaceTx,
) {
    if state.is_scrolling || state.is_paused {
        return;
    }
    state.is_scrolling = true;

    if let TickOutcome::Continue = render_tick(state, surface) {
        spawn_tick_loop(
            Arc::clone(handle),
            surface.clone(),
            state.generation,
            state.settings.scroll_interval,
        );
    }
}

/// One loop task per scroll run. Each iteration is one scheduled tick,
/// tagged with the generation captured while the lock was last held.
fn spawn_tick_loop(
    handle: Arc<Mutex<DisplaySession>>,
    surface: SurfaceTx,
    mut generation: u64,
    mut interval: Duration,
) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            let mut state = handle.lock().await;
            if state.generation != generation {
                // Invalidated while sleeping (interrupt, pause, cleanup).
                return;
            }
            match render_tick(&mut state, &surface) {
                TickOutcome::Continue => {
                    generation = state.generation;
                    interval = state.settings.scroll_interval;
                }
                TickOutcome::Finished | TickOutcome::Starved => return,
            }
        }
    });
}
