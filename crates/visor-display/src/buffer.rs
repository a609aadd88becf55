//! Breakpoint scanning for buffered stream text.
//!
//! Agent deltas arrive at arbitrary granularity; the buffer holds text back
//! until a natural breakpoint so wrapped lines do not end mid-clause.

/// Breakpoint markers, scanned for their latest occurrence in the buffer.
///
/// Sentence terminators followed by a space, a newline, or a comma followed
/// by a space. When several marker classes appear, the last occurrence wins
/// regardless of class.
const BREAKPOINT_MARKERS: [&str; 5] = [". ", "! ", "? ", "\n", ", "];

/// Buffer growth factor (in line widths) past which breakpoint-free text is
/// flushed anyway.
const OVERFLOW_FACTOR: usize = 2;

/// Returns the byte offset ending the processable prefix of `buffer`, or
/// `None` when everything should stay buffered.
///
/// With smart wrapping off the whole buffer is processable immediately.
/// Otherwise the prefix runs through the latest breakpoint marker; absent
/// any marker, a buffer longer than twice `line_width` chars is drained
/// whole so breakpoint-free input cannot buffer without bound.
pub fn processable_end(buffer: &str, smart_wrap: bool, line_width: usize) -> Option<usize> {
    if buffer.is_empty() {
        return None;
    }
    if !smart_wrap {
        return Some(buffer.len());
    }

    let latest = BREAKPOINT_MARKERS
        .iter()
        .filter_map(|marker| buffer.rfind(marker).map(|pos| pos + marker.len()))
        .max();
    if latest.is_some() {
        return latest;
    }

    if buffer.chars().count() > OVERFLOW_FACTOR * line_width {
        return Some(buffer.len());
    }
    None
}

/// Drains the processable prefix out of `buffer`, leaving the remainder.
pub fn extract_processable(buffer: &mut String, smart_wrap: bool, line_width: usize) -> Option<String> {
    let end = processable_end(buffer, smart_wrap, line_width)?;
    let rest = buffer.split_off(end);
    Some(std::mem::replace(buffer, rest))
}
