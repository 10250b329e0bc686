//! Collector failure classification.
//!
//! Collectors report free-form error text. Timeline records and events carry
//! a short code and a normalized fingerprint so failures of the same kind
//! read the same way regardless of which source produced them.

const FINGERPRINT_MAX_CHARS: usize = 160;

/// Map an error message to a short code.
pub fn classify_error_code(message: &str) -> &'static str {
    let lower = message.to_ascii_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        "timeout"
    } else if lower.contains("429") || lower.contains("rate limit") {
        "rate_limited"
    } else if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("access denied")
    {
        "access_denied"
    } else if lower.contains("404") || lower.contains("not found") {
        "not_found"
    } else if lower.contains("connection") || lower.contains("network") || lower.contains("dns") {
        "unavailable"
    } else if lower.contains("invalid") || lower.contains("parse") || lower.contains("malformed") {
        "invalid_response"
    } else {
        "collector_error"
    }
}

/// Collapse whitespace, lowercase, cap at 160 chars.
pub fn normalize_error_fingerprint(message: &str) -> String {
    let words: Vec<&str> = message.split_whitespace().collect();
    if words.is_empty() {
        return "unknown".to_string();
    }
    words
        .join(" ")
        .to_ascii_lowercase()
        .chars()
        .take(FINGERPRINT_MAX_CHARS)
        .collect()
}
