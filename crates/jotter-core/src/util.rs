//! Small helpers shared by the remote, auth and config modules.

const COMPACT_TEXT_LIMIT: usize = 180;

/// Trim optional text, mapping blank values to `None`.
pub fn normalize_text_option<S: AsRef<str>>(value: Option<S>) -> Option<String> {
    let value = value?;
    let value = value.as_ref().trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Collapse whitespace and cap the length of a response body quoted in an error.
pub fn compact_text(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(COMPACT_TEXT_LIMIT)
        .collect()
}

/// Current Unix timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Current Unix timestamp in seconds.
pub fn now_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}
