//! Event-handler controller tying the engine components together.

use std::collections::HashMap;

use chat_backend::{
    ChatMessage, DeliveryStatus, HistoryRequest, HistoryWindow, PushEvent, SendReceipt, SendRequest,
};
use tracing::debug;

use crate::ledger::PendingRequestLedger;
use crate::pagination::PaginationController;
use crate::reconcile::{CompletionReconciler, ReconcileOutcome};
use crate::scroll::{ScrollAnchorController, ScrollCommand, ScrollMetrics};
use crate::session::SessionTransitionGuard;
use crate::store::HistoryStore;

/// Identifier for one scheduled history load.
pub type LoadId = u64;

/// Identifier for one scheduled prompt send.
pub type SendId = u64;

/// Maximum chars shown in the pending-request prompt preview.
pub const PENDING_PREVIEW_CHARS: usize = 80;

/// Kind of history load; completion handling differs per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    /// Full window replacing the transcript (initial load, session switch,
    /// forced re-sync).
    Replace,
    /// Older page merged in front of the transcript.
    OlderPage,
}

/// Where a newly adopted session id came from.
///
/// Sources whose payload already reflects the new session suppress the
/// follow-up reload once; an externally commanded switch never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSource {
    SendReceipt,
    ReplaceWindow,
    OlderWindow,
    External,
}

/// Side effects the widget requests from its runtime.
///
/// `start_*` schedule work on worker threads and assign the identifier that
/// tags the matching completion callback. `cancel_*` flip the operation's
/// cancellation flag; a cancelled operation must never call back.
pub trait WidgetHost {
    fn start_history_fetch(
        &mut self,
        kind: LoadKind,
        request: HistoryRequest,
    ) -> Result<LoadId, String>;
    fn cancel_history_fetch(&mut self, load_id: LoadId);
    fn start_send(&mut self, request: SendRequest) -> Result<SendId, String>;
    fn cancel_send(&mut self, send_id: SendId);
    fn request_render(&mut self);
    /// Wall-clock epoch milliseconds for message authorship.
    fn now_epoch_ms(&mut self) -> i64;
    /// Monotonic milliseconds for cooldown comparisons.
    fn now_mono_ms(&mut self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActiveLoad {
    id: LoadId,
    kind: LoadKind,
}

/// Synchronization state machine for the chat widget.
///
/// Pure state: all side effects go through the [`WidgetHost`] passed into
/// each handler, and all mutation happens inside these handlers, invoked
/// serially by the runtime's event drain.
#[derive(Debug, Default)]
pub struct ChatWidget {
    store: HistoryStore,
    ledger: PendingRequestLedger,
    reconciler: CompletionReconciler,
    pagination: PaginationController,
    scroll: ScrollAnchorController,
    guard: SessionTransitionGuard,
    session_id: Option<String>,
    active: bool,
    current_load: Option<ActiveLoad>,
    active_sends: HashMap<SendId, String>,
    scroll_commands: Vec<ScrollCommand>,
}

impl ChatWidget {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        self.store.messages()
    }

    #[must_use]
    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    #[must_use]
    pub fn ledger(&self) -> &PendingRequestLedger {
        &self.ledger
    }

    #[must_use]
    pub fn pagination(&self) -> &PaginationController {
        &self.pagination
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.ledger.len()
    }

    /// Truncated prompt of the newest pending request, for the live banner.
    #[must_use]
    pub fn pending_preview(&self) -> Option<String> {
        self.ledger.preview(PENDING_PREVIEW_CHARS)
    }

    /// Whether the manual "load older" affordance should currently show.
    #[must_use]
    pub fn load_older_visible(&self) -> bool {
        match self.scroll.last_metrics() {
            Some(metrics) => self.pagination.load_older_visible(&metrics),
            None => false,
        }
    }

    /// Drains scroll instructions queued since the last render.
    pub fn take_scroll_commands(&mut self) -> Vec<ScrollCommand> {
        std::mem::take(&mut self.scroll_commands)
    }

    /// Widget became visible. Snaps to the bottom once layout settles and
    /// evaluates the reload trigger for the current session.
    pub fn on_activate(&mut self, host: &mut dyn WidgetHost) {
        self.active = true;
        self.queue_scroll(self.scroll.on_activation());
        self.evaluate_reload_trigger(host);
        host.request_render();
    }

    /// Widget hidden or torn down. Cancels in-flight work so stale
    /// continuations can never mutate state, and drops queued scroll
    /// commands aimed at the dismantled viewport.
    pub fn on_deactivate(&mut self, host: &mut dyn WidgetHost) {
        self.active = false;
        self.cancel_current_load(host);
        for (send_id, _prompt) in self.active_sends.drain() {
            host.cancel_send(send_id);
        }
        self.scroll_commands.clear();
        host.request_render();
    }

    /// User submitted a prompt: append it optimistically and schedule the
    /// send. The transcript keeps the optimistic message even when the send
    /// fails to schedule; a failure notice follows it.
    pub fn on_submit(&mut self, text: &str, host: &mut dyn WidgetHost) {
        let prompt = text.trim();
        if prompt.is_empty() {
            host.request_render();
            return;
        }

        let now = host.now_epoch_ms();
        self.store
            .append_trailing(ChatMessage::local_user(prompt, now));
        self.queue_scroll(self.scroll.on_trailing_append());

        let request = SendRequest {
            message: prompt.to_string(),
            session_id: self.session_id.clone(),
        };
        match host.start_send(request) {
            Ok(send_id) => {
                self.active_sends.insert(send_id, prompt.to_string());
            }
            Err(error) => {
                debug!(error = %error, "send failed to schedule");
                self.push_send_failure(&error, host);
            }
        }

        host.request_render();
    }

    /// Synchronous receipt for a scheduled send.
    pub fn on_send_response(
        &mut self,
        send_id: SendId,
        receipt: SendReceipt,
        host: &mut dyn WidgetHost,
    ) {
        let Some(prompt) = self.active_sends.remove(&send_id) else {
            debug!(send_id, "receipt for unknown or cancelled send");
            return;
        };

        let now = host.now_epoch_ms();
        if receipt.queued {
            match receipt.request_id.as_deref() {
                Some(request_id) => {
                    self.ledger.register(request_id, prompt, now);
                }
                None => debug!(send_id, "queued receipt without request id"),
            }
        } else if let Some(text) = receipt.text.clone() {
            let mut reply = ChatMessage::local_system(text, now);
            reply.request_id = receipt.request_id.clone();
            if receipt.failed {
                reply.status = Some(DeliveryStatus::Failed);
            }
            self.store.append_trailing(reply);
            self.queue_scroll(self.scroll.on_trailing_append());
        }

        if let Some(session) = receipt.session_id.clone() {
            self.adopt_session(session, SessionSource::SendReceipt, host);
        }

        host.request_render();
    }

    /// Transport failure for a scheduled send. The optimistic message stays;
    /// a failure notice tells the user their prompt did not go through.
    pub fn on_send_failed(&mut self, send_id: SendId, error: &str, host: &mut dyn WidgetHost) {
        if self.active_sends.remove(&send_id).is_none() {
            debug!(send_id, "failure for unknown or cancelled send");
            return;
        }

        debug!(send_id, error = %error, "send failed");
        self.push_send_failure(error, host);
        host.request_render();
    }

    /// A scheduled history fetch landed.
    pub fn on_history_loaded(
        &mut self,
        load_id: LoadId,
        window: HistoryWindow,
        host: &mut dyn WidgetHost,
    ) {
        let Some(load) = self.take_load_if_current(load_id) else {
            debug!(load_id, "stale history window dropped");
            return;
        };

        match load.kind {
            LoadKind::Replace => {
                self.store.replace(&window.messages);
                self.ledger.restore(&window.pending_requests);
                self.pagination.seed(window.has_more, window.next_cursor.clone());
                if let Some(session) = window.session_id.clone() {
                    self.adopt_session(session, SessionSource::ReplaceWindow, host);
                }
                if self.active {
                    self.queue_scroll(self.scroll.on_activation());
                }
            }
            LoadKind::OlderPage => {
                let prior = self.scroll.capture_anchor();
                let inserted = self.store.prepend_unique(&window.messages);
                self.pagination
                    .complete_load(window.has_more, window.next_cursor.clone());
                if inserted > 0 {
                    if let Some(prior) = prior {
                        self.queue_scroll(self.scroll.on_older_merge(prior));
                    }
                }
                if let Some(session) = window.session_id.clone() {
                    self.adopt_session(session, SessionSource::OlderWindow, host);
                }
            }
        }

        host.request_render();
    }

    /// A scheduled history fetch failed. No user-visible error: state stays
    /// as it was, pagination unlocks for retry, and the periodic re-sync
    /// collaborator recovers eventually.
    pub fn on_history_failed(&mut self, load_id: LoadId, error: &str, host: &mut dyn WidgetHost) {
        let Some(load) = self.take_load_if_current(load_id) else {
            debug!(load_id, "stale history failure dropped");
            return;
        };

        debug!(load_id, error = %error, "history fetch failed");
        if load.kind == LoadKind::OlderPage {
            self.pagination.abort_load();
        }
        host.request_render();
    }

    /// Push-channel delivery batch, applied in arrival order.
    pub fn on_push_events(&mut self, events: &[PushEvent], host: &mut dyn WidgetHost) {
        let mut mutated = false;
        for event in events {
            let PushEvent::Completion(completion) = event else {
                // Heartbeats keep the channel alive; staleness is the
                // runtime's business.
                continue;
            };

            match self.reconciler.apply(completion, &mut self.ledger) {
                ReconcileOutcome::Finalized {
                    display_text,
                    status,
                    ..
                } => {
                    let now = host.now_epoch_ms();
                    self.store.append_trailing(ChatMessage::finalized(
                        &completion.request_id,
                        display_text,
                        status.delivery_status(),
                        now,
                    ));
                    self.queue_scroll(self.scroll.on_trailing_append());
                    mutated = true;
                }
                ReconcileOutcome::DuplicateDelivery | ReconcileOutcome::UnknownRequest => {}
            }
        }

        if mutated {
            host.request_render();
        }
    }

    /// Renderer reported fresh viewport metrics.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics, host: &mut dyn WidgetHost) {
        if self.scroll.observe(metrics).is_some() {
            host.request_render();
        }

        if self.current_load.is_some() {
            return;
        }
        let now = host.now_mono_ms();
        if let Some(cursor) = self.pagination.maybe_auto_load(metrics.scroll_top, now) {
            self.start_older_load(cursor, host);
        }
    }

    /// Manual "load older" affordance.
    pub fn load_older(&mut self, host: &mut dyn WidgetHost) {
        if self.current_load.is_some() {
            return;
        }
        if let Some(cursor) = self.pagination.begin_load() {
            self.start_older_load(cursor, host);
        }
    }

    /// Externally commanded session switch; always reloads.
    pub fn set_session(&mut self, session_id: Option<String>, host: &mut dyn WidgetHost) {
        if self.session_id == session_id {
            return;
        }
        self.session_id = session_id;
        self.evaluate_reload_trigger(host);
        host.request_render();
    }

    /// Unconditional re-sync entry point for the health monitor.
    pub fn force_reload(&mut self, host: &mut dyn WidgetHost) {
        self.start_replace_load(host);
    }

    fn adopt_session(&mut self, session_id: String, source: SessionSource, host: &mut dyn WidgetHost) {
        if self.session_id.as_deref() == Some(session_id.as_str()) {
            return;
        }

        debug!(session_id = %session_id, ?source, "adopting session");
        self.session_id = Some(session_id);
        if source != SessionSource::External {
            // The payload that carried this id already reflects the new
            // session; reloading would refetch what the store just received.
            self.guard.arm();
        }
        self.evaluate_reload_trigger(host);
    }

    /// The reload-on-session-change trigger. Runs immediately after every
    /// adoption and on activation, so an armed suppression is always consumed
    /// by the evaluation that directly follows it.
    fn evaluate_reload_trigger(&mut self, host: &mut dyn WidgetHost) {
        if self.guard.consume_suppression() {
            debug!("session reload suppressed once");
            return;
        }
        self.start_replace_load(host);
    }

    fn start_replace_load(&mut self, host: &mut dyn WidgetHost) {
        self.cancel_current_load(host);
        let request = HistoryRequest::initial(self.session_id.clone());
        match host.start_history_fetch(LoadKind::Replace, request) {
            Ok(load_id) => {
                self.current_load = Some(ActiveLoad {
                    id: load_id,
                    kind: LoadKind::Replace,
                });
            }
            Err(error) => {
                debug!(error = %error, "replace load failed to schedule");
            }
        }
    }

    fn start_older_load(&mut self, cursor: String, host: &mut dyn WidgetHost) {
        let request = HistoryRequest::older(self.session_id.clone(), cursor);
        match host.start_history_fetch(LoadKind::OlderPage, request) {
            Ok(load_id) => {
                self.current_load = Some(ActiveLoad {
                    id: load_id,
                    kind: LoadKind::OlderPage,
                });
            }
            Err(error) => {
                debug!(error = %error, "older-page load failed to schedule");
                self.pagination.abort_load();
            }
        }
    }

    fn cancel_current_load(&mut self, host: &mut dyn WidgetHost) {
        if let Some(load) = self.current_load.take() {
            host.cancel_history_fetch(load.id);
            if load.kind == LoadKind::OlderPage {
                self.pagination.abort_load();
            }
        }
    }

    fn take_load_if_current(&mut self, load_id: LoadId) -> Option<ActiveLoad> {
        match &self.current_load {
            Some(load) if load.id == load_id => self.current_load.take(),
            _ => None,
        }
    }

    fn push_send_failure(&mut self, error: &str, host: &mut dyn WidgetHost) {
        let now = host.now_epoch_ms();
        self.store
            .append_trailing(ChatMessage::local_system(format!("Send failed: {error}"), now));
        self.queue_scroll(self.scroll.on_trailing_append());
    }

    fn queue_scroll(&mut self, command: ScrollCommand) {
        self.scroll_commands.push(command);
    }
}
