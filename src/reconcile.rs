//! Idempotent application of asynchronous completion deliveries.

use std::collections::HashSet;

use chat_backend::{CompletionEvent, CompletionStatus};
use tracing::debug;

use crate::ledger::{PendingRequestEntry, PendingRequestLedger};

/// Result of applying one completion delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Delivery id seen before; dropped with no effect.
    DuplicateDelivery,
    /// No ledger entry for the request; dropped. Expected under races, after
    /// finalization, and for foreign-session noise.
    UnknownRequest,
    /// Ledger entry removed; the caller appends the finalized message and
    /// snaps scroll to the bottom.
    Finalized {
        entry: PendingRequestEntry,
        display_text: String,
        status: CompletionStatus,
    },
}

impl ReconcileOutcome {
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        matches!(self, Self::Finalized { .. })
    }
}

/// Applies completion deliveries exactly once each.
///
/// Consumed delivery ids are remembered for the lifetime of the widget, so a
/// redelivery of the same id can never re-apply. The set is unbounded on
/// purpose: eviction would reopen the duplicate-delivery window it closes.
#[derive(Debug, Default)]
pub struct CompletionReconciler {
    consumed: HashSet<String>,
}

impl CompletionReconciler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one delivery against the ledger.
    ///
    /// The delivery id is marked consumed before the ledger lookup, so an
    /// event for an unknown request still never applies on redelivery.
    pub fn apply(
        &mut self,
        event: &CompletionEvent,
        ledger: &mut PendingRequestLedger,
    ) -> ReconcileOutcome {
        if !self.consumed.insert(event.delivery_id.clone()) {
            debug!(delivery_id = %event.delivery_id, "duplicate completion delivery");
            return ReconcileOutcome::DuplicateDelivery;
        }

        let Some(entry) = ledger.remove(&event.request_id) else {
            debug!(request_id = %event.request_id, "completion for unknown request");
            return ReconcileOutcome::UnknownRequest;
        };

        let display_text = match event.status {
            CompletionStatus::Completed => event.text.clone(),
            CompletionStatus::Failed => failure_framed(&event.text),
        };

        ReconcileOutcome::Finalized {
            entry,
            display_text,
            status: event.status,
        }
    }

    /// Applies a batch in arrival order, each event independently.
    pub fn apply_batch(
        &mut self,
        events: &[CompletionEvent],
        ledger: &mut PendingRequestLedger,
    ) -> Vec<ReconcileOutcome> {
        events
            .iter()
            .map(|event| self.apply(event, ledger))
            .collect()
    }
}

/// Failure framing for the finalized transcript entry.
fn failure_framed(text: &str) -> String {
    format!("Request failed: {text}")
}
