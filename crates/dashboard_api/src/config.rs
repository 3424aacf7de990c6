use std::time::Duration;

use crate::url::DEFAULT_DASHBOARD_BASE_URL;

/// Transport configuration for dashboard API requests.
#[derive(Debug, Clone)]
pub struct DashboardApiConfig {
    /// Base URL of the dashboard server.
    pub base_url: String,
    /// History channel selector sent with every window request.
    pub channel: String,
    /// Ask the server to fold earlier sessions into history windows.
    pub include_previous_sessions: bool,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Timeout applied to bounded requests. The push event stream is
    /// long-lived and never carries this timeout.
    pub timeout: Option<Duration>,
}

impl Default for DashboardApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DASHBOARD_BASE_URL.to_string(),
            channel: "web".to_string(),
            include_previous_sessions: false,
            user_agent: None,
            timeout: None,
        }
    }
}

impl DashboardApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_include_previous_sessions(mut self, include: bool) -> Self {
        self.include_previous_sessions = include;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
