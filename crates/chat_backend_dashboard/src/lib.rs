//! Dashboard-backed implementation of the shared `chat_backend` contract.
//!
//! This adapter bridges the async `dashboard_api` client onto the blocking
//! backend interface the widget runtime drives from worker threads, and owns
//! the push-stream reconnection policy.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chat_backend::{
    BackendError, BackendProfile, CancelSignal, ChatBackend, HistoryRequest, HistoryWindow,
    PushEvent, SendReceipt, SendRequest,
};
use dashboard_api::{normalize_dashboard_url, DashboardApiClient, DashboardApiConfig, DashboardApiError};
use tracing::debug;

/// Stable backend identifier used for explicit startup selection.
pub const DASHBOARD_BACKEND_ID: &str = "dashboard";

const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);
/// A stream that lived at least this long resets the backoff ladder.
const STREAM_STABLE_AFTER: Duration = Duration::from_secs(30);
const CANCEL_SLEEP_SLICE: Duration = Duration::from_millis(25);

/// Runtime configuration for the dashboard backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardBackendConfig {
    pub base_url: String,
    pub channel: Option<String>,
    pub include_previous_sessions: bool,
    pub timeout: Option<Duration>,
}

impl DashboardBackendConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            channel: None,
            include_previous_sessions: false,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    #[must_use]
    pub fn with_include_previous_sessions(mut self, include: bool) -> Self {
        self.include_previous_sessions = include;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn into_api_config(self) -> DashboardApiConfig {
        let mut config = DashboardApiConfig::new(self.base_url)
            .with_include_previous_sessions(self.include_previous_sessions);

        if let Some(channel) = self.channel {
            config = config.with_channel(channel);
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        config
    }
}

trait Transport: Send + Sync {
    fn fetch_history(
        &self,
        request: &HistoryRequest,
        cancel: &CancelSignal,
    ) -> Result<HistoryWindow, BackendError>;

    fn send_prompt(
        &self,
        request: &SendRequest,
        cancel: &CancelSignal,
    ) -> Result<SendReceipt, BackendError>;

    fn subscribe(
        &self,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(PushEvent),
    ) -> Result<(), BackendError>;
}

struct HttpTransport {
    client: DashboardApiClient,
}

impl HttpTransport {
    /// Each call gets its own single-thread runtime: a shared current-thread
    /// runtime would serialize the long-lived subscription against every
    /// fetch and send.
    fn block_on<F: std::future::Future>(&self, future: F) -> Result<F::Output, BackendError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                BackendError::Transport(format!("failed to initialize tokio runtime: {error}"))
            })?;

        Ok(runtime.block_on(future))
    }
}

impl Transport for HttpTransport {
    fn fetch_history(
        &self,
        request: &HistoryRequest,
        cancel: &CancelSignal,
    ) -> Result<HistoryWindow, BackendError> {
        self.block_on(self.client.fetch_history(request, Some(cancel)))?
            .map_err(map_transport_error)
    }

    fn send_prompt(
        &self,
        request: &SendRequest,
        cancel: &CancelSignal,
    ) -> Result<SendReceipt, BackendError> {
        self.block_on(self.client.send_prompt(request, Some(cancel)))?
            .map_err(map_transport_error)
    }

    fn subscribe(
        &self,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(PushEvent),
    ) -> Result<(), BackendError> {
        self.block_on(self.client.subscribe_events(Some(cancel), |event| on_event(event)))?
            .map_err(map_transport_error)
    }
}

/// `ChatBackend` adapter backed by `dashboard_api` transport primitives.
pub struct DashboardBackend {
    endpoint: String,
    transport: Arc<dyn Transport>,
    reconnect_base_delay: Duration,
}

impl DashboardBackend {
    /// Creates a backend using real dashboard HTTP transport.
    pub fn new(config: DashboardBackendConfig) -> Result<Self, BackendError> {
        let endpoint = normalize_dashboard_url(&config.base_url);
        let client =
            DashboardApiClient::new(config.into_api_config()).map_err(map_transport_error)?;

        Ok(Self {
            endpoint,
            transport: Arc::new(HttpTransport { client }),
            reconnect_base_delay: RECONNECT_BASE_DELAY,
        })
    }

    #[cfg(test)]
    fn with_transport_for_tests(
        transport: Arc<dyn Transport>,
        reconnect_base_delay: Duration,
    ) -> Self {
        Self {
            endpoint: "http://test.invalid".to_string(),
            transport,
            reconnect_base_delay,
        }
    }

    fn reconnect_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let delay = self.reconnect_base_delay.saturating_mul(1u32 << exponent);
        delay.min(RECONNECT_MAX_DELAY)
    }
}

impl ChatBackend for DashboardBackend {
    fn profile(&self) -> BackendProfile {
        BackendProfile {
            backend_id: DASHBOARD_BACKEND_ID.to_string(),
            endpoint: Some(self.endpoint.clone()),
        }
    }

    fn fetch_history(
        &self,
        req: HistoryRequest,
        cancel: CancelSignal,
    ) -> Result<HistoryWindow, BackendError> {
        self.transport.fetch_history(&req, &cancel)
    }

    fn send_prompt(
        &self,
        req: SendRequest,
        cancel: CancelSignal,
    ) -> Result<SendReceipt, BackendError> {
        self.transport.send_prompt(&req, &cancel)
    }

    /// Consumes the push stream, reconnecting with exponential backoff until
    /// cancelled. Server-side closes and transient failures both re-enter the
    /// backoff ladder; a stream that stayed up resets it.
    fn subscribe(
        &self,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(PushEvent),
    ) -> Result<(), BackendError> {
        let mut attempt: u32 = 0;

        loop {
            if cancel.load(Ordering::Acquire) {
                return Ok(());
            }

            let connected_at = Instant::now();
            match self.transport.subscribe(&cancel, emit) {
                Ok(()) => {
                    debug!(endpoint = %self.endpoint, "push stream closed by server");
                }
                Err(error) if error.is_cancelled() => return Ok(()),
                Err(error) => {
                    debug!(endpoint = %self.endpoint, error = %error, "push stream failed");
                }
            }

            if connected_at.elapsed() >= STREAM_STABLE_AFTER {
                attempt = 0;
            }

            let delay = self.reconnect_delay(attempt);
            attempt = attempt.saturating_add(1);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting push stream");
            if sleep_with_cancel(delay, &cancel) {
                return Ok(());
            }
        }
    }
}

fn map_transport_error(error: DashboardApiError) -> BackendError {
    match error {
        DashboardApiError::Cancelled => BackendError::Cancelled,
        DashboardApiError::MalformedPayload(message) => BackendError::Protocol(message),
        other => BackendError::Transport(other.to_string()),
    }
}

/// Sleeps in short slices so cancellation interrupts a pending backoff.
/// Returns true when the flag was observed.
fn sleep_with_cancel(duration: Duration, cancel: &CancelSignal) -> bool {
    let mut remaining = duration;
    loop {
        if cancel.load(Ordering::Acquire) {
            return true;
        }
        if remaining.is_zero() {
            return false;
        }
        let slice = remaining.min(CANCEL_SLEEP_SLICE);
        std::thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
}
