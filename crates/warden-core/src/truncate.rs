//! UTF-8-safe output truncation.

/// Truncate a string at the nearest char boundary at or before `max_bytes`.
///
/// ```
/// use warden_core::truncate::truncate_at_char_boundary;
///
/// assert_eq!(truncate_at_char_boundary("hello world", 5), "hello");
/// let s = format!("{}\u{1F980}", "x".repeat(198));
/// assert_eq!(truncate_at_char_boundary(&s, 200), "x".repeat(198));
/// ```
#[must_use]
pub fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    s[..end].to_string()
}

/// Cap captured output at `max_bytes`, appending a marker when clipped.
///
/// Returns the (possibly clipped) text and whether truncation happened.
#[must_use]
pub fn cap_output(s: &str, max_bytes: usize) -> (String, bool) {
    if s.len() <= max_bytes {
        return (s.to_string(), false);
    }
    let mut clipped = truncate_at_char_boundary(s, max_bytes);
    clipped.push_str(&truncation_marker(max_bytes));
    (clipped, true)
}

/// Marker appended to clipped output.
#[must_use]
pub fn truncation_marker(max_bytes: usize) -> String {
    format!("\n[output truncated at {max_bytes} bytes]")
}
