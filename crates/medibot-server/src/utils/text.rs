/// First `max_chars` characters of `text` (char boundary safe).
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Short log preview of user-supplied text.
pub fn preview(text: &str) -> &str {
    truncate_chars(text, 120)
}
