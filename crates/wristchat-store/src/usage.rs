//! Helpers for the usage query surface consumed by the statistics view and
//! the watch-face complication.

/// Ledger key for the current client-local date.
pub fn today_key() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Short display form for a token count: five digits and up render as
/// `"12.3k"`, anything smaller as the plain number.
pub fn format_token_count(tokens: u64) -> String {
    if tokens >= 10_000 {
        format!("{:.1}k", tokens as f64 / 1000.0)
    } else {
        tokens.to_string()
    }
}
