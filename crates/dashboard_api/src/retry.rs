use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

/// Maximum retry attempts after an initial request attempt.
///
/// History fetches run in the background and the periodic re-sync also
/// recovers, so the attempt count stays small.
pub const MAX_RETRIES: u32 = 2;
/// Base delay before the first retry.
pub const BASE_DELAY_MS: u64 = 500;

fn transient_failure_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)timed?.?out|temporarily.?unavailable|bad.?gateway|connection.?(reset|refused)|service.?unavailable")
            .expect("retry regex must compile")
    })
}

/// Retry policy for history fetches: gateway-class statuses plus transient
/// failure text from proxies sitting in front of the dashboard.
pub fn is_retryable_http_error(status: u16, error_text: &str) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504) || transient_failure_regex().is_match(error_text)
}

/// Compute exponential backoff delay for a retry attempt.
pub fn retry_delay_ms(attempt: u32) -> Duration {
    let exponent = attempt.min(30);
    Duration::from_millis(BASE_DELAY_MS * 2u64.saturating_pow(exponent))
}
