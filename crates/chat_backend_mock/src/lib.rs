//! Deterministic mock implementation of the shared `chat_backend` contract.
//!
//! This crate contains no transport logic and is intended for local
//! development and contract-level integration testing. History pages, send
//! behavior, and push traffic are all scripted at construction.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chat_backend::{
    BackendError, BackendProfile, CancelSignal, ChatBackend, CompletionEvent, CompletionStatus,
    HistoryRequest, HistoryWindow, PushEvent, SendReceipt, SendRequest,
};
use serde_json::{json, Value};

/// Stable backend identifier used for explicit startup selection.
pub const MOCK_BACKEND_ID: &str = "mock";

/// Scripted synchronous behavior of [`MockBackend::send_prompt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    /// Park the prompt and deliver its completion over the push stream.
    Queued,
    /// Answer inline with this text.
    Direct(String),
    /// Answer inline with a failed outcome carrying this message.
    Fail(String),
}

#[derive(Debug, Default)]
struct MockState {
    sends: u32,
    ready_pushes: VecDeque<PushEvent>,
}

/// Deterministic mock backend used by `chat_widget` tests and local runs.
#[derive(Debug)]
pub struct MockBackend {
    session_id: String,
    /// History pages, newest first. Page `i + 1` is reachable through the
    /// cursor returned with page `i`.
    pages: Vec<Vec<Value>>,
    initial_pending: Vec<Value>,
    reply: MockReply,
    state: Mutex<MockState>,
}

impl MockBackend {
    const FETCH_DELAY_MS: u64 = 30;
    const SEND_DELAY_MS: u64 = 30;
    const PUSH_POLL_MS: u64 = 10;
    const HEARTBEAT_EVERY_POLLS: u32 = 50;

    /// Creates a mock backend with caller-provided history pages.
    #[must_use]
    pub fn new(session_id: impl Into<String>, pages: Vec<Vec<Value>>) -> Self {
        Self {
            session_id: session_id.into(),
            pages,
            initial_pending: Vec::new(),
            reply: MockReply::Queued,
            state: Mutex::new(MockState::default()),
        }
    }

    #[must_use]
    pub fn with_reply(mut self, reply: MockReply) -> Self {
        self.reply = reply;
        self
    }

    /// Pending-request items served with the newest history window, for
    /// exercising ledger rehydration.
    #[must_use]
    pub fn with_initial_pending(mut self, pending: Vec<Value>) -> Self {
        self.initial_pending = pending;
        self
    }

    /// Preloads push events delivered by the next subscription.
    #[must_use]
    pub fn with_scripted_pushes(self, pushes: Vec<PushEvent>) -> Self {
        {
            let mut state = lock_unpoisoned(&self.state);
            state.ready_pushes.extend(pushes);
        }
        self
    }

    fn cursor_for(&self, page_index: usize) -> Option<String> {
        if page_index + 1 < self.pages.len() {
            Some(format!("page-{}", page_index + 1))
        } else {
            None
        }
    }

    fn page_index(&self, before: Option<&str>) -> Option<usize> {
        match before {
            None => (!self.pages.is_empty()).then_some(0),
            Some(cursor) => cursor
                .strip_prefix("page-")
                .and_then(|index| index.parse::<usize>().ok())
                .filter(|index| *index < self.pages.len()),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(
            "mock-session",
            vec![
                vec![
                    json!({ "id": "seed-b1", "role": "user", "text": "any alerts overnight?", "createdAt": 2_000 }),
                    json!({ "id": "seed-b2", "role": "system", "text": "Two pages, both auto-resolved.", "createdAt": 2_001 }),
                    json!({ "id": "seed-b3", "role": "user", "text": "deploy status", "createdAt": 2_100 }),
                    json!({ "id": "seed-b4", "role": "system", "text": "Pipeline green, build 4821 live.", "createdAt": 2_101 }),
                ],
                vec![
                    json!({ "id": "seed-a1", "role": "user", "text": "restart the report worker", "createdAt": 1_000 }),
                    json!({ "id": "seed-a2", "role": "system", "text": "Worker restarted.", "createdAt": 1_001 }),
                ],
            ],
        )
    }
}

impl ChatBackend for MockBackend {
    fn profile(&self) -> BackendProfile {
        BackendProfile {
            backend_id: MOCK_BACKEND_ID.to_string(),
            endpoint: None,
        }
    }

    fn fetch_history(
        &self,
        req: HistoryRequest,
        cancel: CancelSignal,
    ) -> Result<HistoryWindow, BackendError> {
        thread::sleep(Duration::from_millis(Self::FETCH_DELAY_MS));
        if cancel.load(Ordering::SeqCst) {
            return Err(BackendError::Cancelled);
        }

        let Some(index) = self.page_index(req.before.as_deref()) else {
            return Ok(HistoryWindow {
                session_id: Some(self.session_id.clone()),
                ..HistoryWindow::default()
            });
        };

        let pending_requests = if req.before.is_none() {
            self.initial_pending.clone()
        } else {
            Vec::new()
        };

        Ok(HistoryWindow {
            session_id: Some(self.session_id.clone()),
            messages: self.pages[index].clone(),
            pending_requests,
            has_more: self.cursor_for(index).is_some(),
            next_cursor: self.cursor_for(index),
        })
    }

    fn send_prompt(
        &self,
        req: SendRequest,
        cancel: CancelSignal,
    ) -> Result<SendReceipt, BackendError> {
        thread::sleep(Duration::from_millis(Self::SEND_DELAY_MS));
        if cancel.load(Ordering::SeqCst) {
            return Err(BackendError::Cancelled);
        }

        let mut state = lock_unpoisoned(&self.state);
        state.sends += 1;
        let request_id = format!("mock-request-{}", state.sends);

        match &self.reply {
            MockReply::Queued => {
                state
                    .ready_pushes
                    .push_back(PushEvent::Completion(CompletionEvent {
                        delivery_id: format!("{request_id}:delivery-1"),
                        request_id: request_id.clone(),
                        text: format!("Completed: {}", req.message),
                        status: CompletionStatus::Completed,
                    }));
                Ok(SendReceipt {
                    session_id: Some(self.session_id.clone()),
                    request_id: Some(request_id),
                    queued: true,
                    text: None,
                    failed: false,
                })
            }
            MockReply::Direct(text) => Ok(SendReceipt {
                session_id: Some(self.session_id.clone()),
                request_id: Some(request_id),
                queued: false,
                text: Some(text.clone()),
                failed: false,
            }),
            MockReply::Fail(message) => Ok(SendReceipt {
                session_id: Some(self.session_id.clone()),
                request_id: Some(request_id),
                queued: false,
                text: Some(format!("Error: {message}")),
                failed: true,
            }),
        }
    }

    fn subscribe(
        &self,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(PushEvent),
    ) -> Result<(), BackendError> {
        let mut polls: u32 = 0;
        loop {
            if cancel.load(Ordering::SeqCst) {
                return Ok(());
            }

            let ready: Vec<PushEvent> = {
                let mut state = lock_unpoisoned(&self.state);
                state.ready_pushes.drain(..).collect()
            };
            for event in ready {
                emit(event);
            }

            polls += 1;
            if polls % Self::HEARTBEAT_EVERY_POLLS == 0 {
                emit(PushEvent::Heartbeat { timestamp: None });
            }

            thread::sleep(Duration::from_millis(Self::PUSH_POLL_MS));
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
