//! Provider-neutral contract between the chat widget runtime and a backend.
//!
//! This crate intentionally defines only the shared history/send/push
//! lifecycle types and the synchronous backend interface. It excludes
//! transport details, endpoint layout, retry policy, and reconnection
//! behavior, which belong to individual backend implementations.

use std::sync::{atomic::AtomicBool, Arc};

use thiserror::Error;

mod types;

pub use types::{
    ChatMessage, CompletionEvent, CompletionStatus, DeliveryStatus, HistoryRequest, HistoryWindow,
    MessagePhase, PushEvent, Role, SendReceipt, SendRequest,
};

/// Shared cancellation flag for one asynchronous operation.
pub type CancelSignal = Arc<AtomicBool>;

/// Failure taxonomy shared by all backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The operation observed its cancellation flag and stopped early.
    #[error("operation cancelled")]
    Cancelled,
    /// Network-level failure: connect, timeout, or non-success status.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The backend answered with a payload the client could not read.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

impl BackendError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Immutable metadata describing a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendProfile {
    pub backend_id: String,
    pub endpoint: Option<String>,
}

/// Synchronous backend interface for the chat widget runtime.
///
/// All three operations block the calling worker thread; the runtime owns
/// thread placement. Implementations must poll `cancel` at their wait points
/// and return [`BackendError::Cancelled`] instead of applying partial results.
pub trait ChatBackend: Send + Sync + 'static {
    /// Returns backend identity metadata.
    fn profile(&self) -> BackendProfile;

    /// Fetches one history window (initial load, reload, or older page).
    fn fetch_history(
        &self,
        req: HistoryRequest,
        cancel: CancelSignal,
    ) -> Result<HistoryWindow, BackendError>;

    /// Submits one prompt and returns the synchronous receipt.
    fn send_prompt(
        &self,
        req: SendRequest,
        cancel: CancelSignal,
    ) -> Result<SendReceipt, BackendError>;

    /// Streams push events into `emit` until the subscription ends.
    ///
    /// Implementations reconnect internally on transient stream failures.
    /// Returning `Ok(())` means the subscription ended through cancellation
    /// or an orderly close; `emit` is never called after a cancelled flag
    /// was observed.
    fn subscribe(
        &self,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(PushEvent),
    ) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use super::{
        BackendError, BackendProfile, CancelSignal, ChatBackend, HistoryRequest, HistoryWindow,
        PushEvent, SendReceipt, SendRequest,
    };

    struct MinimalBackend;

    impl ChatBackend for MinimalBackend {
        fn profile(&self) -> BackendProfile {
            BackendProfile {
                backend_id: "minimal".to_string(),
                endpoint: None,
            }
        }

        fn fetch_history(
            &self,
            _req: HistoryRequest,
            _cancel: CancelSignal,
        ) -> Result<HistoryWindow, BackendError> {
            Ok(HistoryWindow::default())
        }

        fn send_prompt(
            &self,
            req: SendRequest,
            _cancel: CancelSignal,
        ) -> Result<SendReceipt, BackendError> {
            Ok(SendReceipt {
                session_id: req.session_id,
                request_id: None,
                queued: false,
                text: Some("ok".to_string()),
                failed: false,
            })
        }

        fn subscribe(
            &self,
            _cancel: CancelSignal,
            emit: &mut dyn FnMut(PushEvent),
        ) -> Result<(), BackendError> {
            emit(PushEvent::Heartbeat { timestamp: None });
            Ok(())
        }
    }

    #[test]
    fn backend_error_display_and_cancellation_probe() {
        assert_eq!(BackendError::Cancelled.to_string(), "operation cancelled");
        assert_eq!(
            BackendError::Transport("connect refused".to_string()).to_string(),
            "transport failure: connect refused"
        );
        assert_eq!(
            BackendError::Protocol("not json".to_string()).to_string(),
            "protocol violation: not json"
        );

        assert!(BackendError::Cancelled.is_cancelled());
        assert!(!BackendError::Transport("x".to_string()).is_cancelled());
    }

    #[test]
    fn minimal_backend_round_trips_contract_types() {
        let backend = MinimalBackend;
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));

        let window = backend
            .fetch_history(HistoryRequest::initial(None), Arc::clone(&cancel))
            .expect("fetch should succeed");
        assert!(window.messages.is_empty());
        assert!(!window.has_more);

        let receipt = backend
            .send_prompt(
                SendRequest {
                    message: "status?".to_string(),
                    session_id: Some("s1".to_string()),
                },
                Arc::clone(&cancel),
            )
            .expect("send should succeed");
        assert_eq!(receipt.session_id.as_deref(), Some("s1"));
        assert!(!receipt.queued);

        let mut events = Vec::new();
        backend
            .subscribe(cancel, &mut |event| events.push(event))
            .expect("subscribe should succeed");
        assert_eq!(events, vec![PushEvent::Heartbeat { timestamp: None }]);
    }
}
