/// Default base URL for a locally running dashboard.
pub const DEFAULT_DASHBOARD_BASE_URL: &str = "http://127.0.0.1:8765";

/// Normalize a dashboard base URL.
///
/// Normalization rules:
/// 1) empty input falls back to the local default
/// 2) trailing slashes are stripped
/// 3) a trailing `/api` is stripped so endpoint joining cannot double it
pub fn normalize_dashboard_url(input: &str) -> String {
    let base = if input.trim().is_empty() {
        DEFAULT_DASHBOARD_BASE_URL
    } else {
        input.trim()
    };

    let trimmed = base.trim_end_matches('/');
    trimmed.strip_suffix("/api").unwrap_or(trimmed).to_string()
}

/// Full URL of the history window endpoint.
pub fn history_endpoint(base_url: &str) -> String {
    format!("{}/api/chat/history", normalize_dashboard_url(base_url))
}

/// Full URL of the prompt submission endpoint.
pub fn prompt_endpoint(base_url: &str) -> String {
    format!("{}/api/prompt", normalize_dashboard_url(base_url))
}

/// Full URL of the push event stream endpoint.
pub fn events_endpoint(base_url: &str) -> String {
    format!("{}/api/events", normalize_dashboard_url(base_url))
}

#[cfg(test)]
mod tests {
    use super::{
        events_endpoint, history_endpoint, normalize_dashboard_url, prompt_endpoint,
        DEFAULT_DASHBOARD_BASE_URL,
    };

    #[test]
    fn empty_input_uses_local_default() {
        assert_eq!(normalize_dashboard_url(""), DEFAULT_DASHBOARD_BASE_URL);
        assert_eq!(normalize_dashboard_url("   "), DEFAULT_DASHBOARD_BASE_URL);
    }

    #[test]
    fn trailing_slashes_and_api_suffix_are_stripped() {
        assert_eq!(
            normalize_dashboard_url("http://dash.internal/"),
            "http://dash.internal"
        );
        assert_eq!(
            normalize_dashboard_url("http://dash.internal/api/"),
            "http://dash.internal"
        );
        assert_eq!(
            normalize_dashboard_url("http://dash.internal/api"),
            "http://dash.internal"
        );
    }

    #[test]
    fn endpoints_join_the_normalized_base() {
        assert_eq!(
            history_endpoint("http://dash.internal/api/"),
            "http://dash.internal/api/chat/history"
        );
        assert_eq!(
            prompt_endpoint("http://dash.internal"),
            "http://dash.internal/api/prompt"
        );
        assert_eq!(
            events_endpoint(""),
            format!("{DEFAULT_DASHBOARD_BASE_URL}/api/events")
        );
    }
}
