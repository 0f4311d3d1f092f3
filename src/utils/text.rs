//! Text processing utilities.

/// Keep at most `max_chars` characters, appending `...` when something was cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Trailing `n` characters of `text` (the whole string when shorter).
pub fn char_suffix(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match text.char_indices().rev().nth(n - 1) {
        Some((byte_idx, _)) => &text[byte_idx..],
        None => text,
    }
}
