//! Environment-driven backend selection.

use std::env;
use std::sync::Arc;

use chat_backend::ChatBackend;
use chat_backend_dashboard::{DashboardBackend, DashboardBackendConfig, DASHBOARD_BACKEND_ID};
use chat_backend_mock::{MockBackend, MOCK_BACKEND_ID};

pub const BACKEND_ENV_VAR: &str = "CHAT_WIDGET_BACKEND";
pub const DASHBOARD_URL_ENV_VAR: &str = "CHAT_WIDGET_DASHBOARD_URL";
pub const DEFAULT_BACKEND_ID: &str = MOCK_BACKEND_ID;

pub fn backend_from_env() -> Result<Arc<dyn ChatBackend>, String> {
    let backend_id = env_string_opt(BACKEND_ENV_VAR);
    let dashboard_url = env_string_opt(DASHBOARD_URL_ENV_VAR);

    backend_for_id(
        backend_id.as_deref().unwrap_or(DEFAULT_BACKEND_ID),
        dashboard_url.as_deref(),
    )
}

pub fn backend_for_id(
    backend_id: &str,
    dashboard_url: Option<&str>,
) -> Result<Arc<dyn ChatBackend>, String> {
    match backend_id {
        MOCK_BACKEND_ID => Ok(Arc::new(MockBackend::default())),
        DASHBOARD_BACKEND_ID => {
            // An absent URL normalizes to the dashboard's default address.
            let config = DashboardBackendConfig::new(dashboard_url.unwrap_or(""));
            let backend = DashboardBackend::new(config)
                .map_err(|error| format!("Failed to initialize dashboard backend: {error}"))?;
            Ok(Arc::new(backend))
        }
        unknown => Err(format!(
            "Unsupported backend '{unknown}'. Available backends: {MOCK_BACKEND_ID}, {DASHBOARD_BACKEND_ID}"
        )),
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let value = value.trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
