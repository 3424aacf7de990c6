//! Chat history synchronization engine for the ops dashboard widget.
//!
//! Invariant: single mutation gate. All state lives in [`ChatWidget`] and
//! changes only inside its `on_*` handlers, invoked serially by the runtime's
//! event drain. The engine performs no I/O; side effects go through the
//! [`WidgetHost`] passed into each handler.
//!
//! # Public API Overview
//! - Drive the engine by feeding events into [`ChatWidget`] and implementing
//!   [`WidgetHost`] for scheduling, cancellation, renders, and clocks.
//! - Reconcile backend payloads with [`HistoryStore`] (ordered, deduplicated
//!   transcript), [`PendingRequestLedger`], and [`CompletionReconciler`]
//!   (idempotent per delivery id).
//! - Manage viewport behavior with [`PaginationController`] and
//!   [`ScrollAnchorController`]; apply the [`ScrollCommand`]s the widget
//!   queues for the renderer.

pub mod ledger;
pub mod pagination;
pub mod reconcile;
pub mod scroll;
pub mod session;
pub mod store;
pub mod widget;

/// Transcript storage and the canonical ordering comparator.
pub use crate::store::{canonical_cmp, HistoryStore};

/// In-flight request tracking.
pub use crate::ledger::{PendingRequestEntry, PendingRequestLedger};

/// Idempotent completion handling.
pub use crate::reconcile::{CompletionReconciler, ReconcileOutcome};

/// Older-history pagination gating.
pub use crate::pagination::{PaginationController, AUTO_TRIGGER_COOLDOWN_MS, AUTO_TRIGGER_PX};

/// Viewport anchoring and scroll instructions for the renderer.
pub use crate::scroll::{
    AnchorSnapshot, ScrollAnchorController, ScrollCommand, ScrollMetrics, ViewportFlags,
    NEAR_TOP_PX,
};

/// One-shot reload suppression across session adoption.
pub use crate::session::SessionTransitionGuard;

/// Event-handler controller and its runtime-facing host interface.
pub use crate::widget::{
    ChatWidget, LoadId, LoadKind, SendId, SessionSource, WidgetHost, PENDING_PREVIEW_CHARS,
};
