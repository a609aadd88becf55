//! Greedy word wrapping for fixed-width displays.
//!
//! Width is measured in `char`s: the target surfaces render fixed-width
//! glyph rows, so column math stays out of this crate.

/// Wraps `text` into lines of at most `max_width` chars.
///
/// Explicit line breaks in the input are preserved. Within a logical line,
/// whitespace-delimited words are packed greedily with a single separating
/// space; a word longer than `max_width` is hard-split into `max_width`-sized
/// fragments, the final partial fragment staying open for further packing.
///
/// Text ending in a newline does not produce a trailing empty line: the
/// break terminates the last line, and in incremental use the next chunk
/// starts the new one. Interior blank lines are preserved.
///
/// Empty input yields no lines. The output is a fixed point: re-joining with
/// newlines and wrapping again at the same width returns it unchanged.
pub fn wrap(text: &str, max_width: usize) -> Vec<String> {
    if text.is_empty() || max_width == 0 {
        return Vec::new();
    }

    let mut logical_lines: Vec<&str> = text.split('\n').collect();
    if logical_lines.last() == Some(&"") {
        logical_lines.pop();
    }

    let mut lines = Vec::new();
    for logical in logical_lines {
        wrap_logical_line(logical, max_width, &mut lines);
    }
    lines
}

fn wrap_logical_line(logical: &str, max_width: usize, out: &mut Vec<String>) {
    if logical.chars().count() <= max_width {
        out.push(logical.to_string());
        return;
    }

    let mut current = String::new();
    let mut current_len = 0usize;

    for word in logical.split_whitespace() {
        let word_len = word.chars().count();

        if current_len > 0 && current_len + 1 + word_len > max_width {
            out.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if current_len == 0 && word_len > max_width {
            // Hard-split an oversized word; the trailing partial fragment
            // becomes the open line.
            let (full, rest) = split_oversized_word(word, max_width);
            out.extend(full);
            current = rest;
            current_len = current.chars().count();
            continue;
        }

        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        out.push(current);
    }
}

/// Splits a word longer than `max_width` into full-width fragments plus the
/// partial remainder (possibly empty).
fn split_oversized_word(word: &str, max_width: usize) -> (Vec<String>, String) {
    let mut full = Vec::new();
    let mut fragment = String::new();
    let mut len = 0usize;

    for ch in word.chars() {
        fragment.push(ch);
        len += 1;
        if len == max_width {
            full.push(std::mem::take(&mut fragment));
            len = 0;
        }
    }

    (full, fragment)
}
