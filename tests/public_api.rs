#![allow(unused_imports)]

use chat_sync::{
    canonical_cmp, AnchorSnapshot, ChatWidget, CompletionReconciler, HistoryStore, LoadId,
    LoadKind, PaginationController, PendingRequestEntry, PendingRequestLedger, ReconcileOutcome,
    ScrollAnchorController, ScrollCommand, ScrollMetrics, SendId, SessionSource,
    SessionTransitionGuard, ViewportFlags, WidgetHost, AUTO_TRIGGER_COOLDOWN_MS, AUTO_TRIGGER_PX,
    NEAR_TOP_PX, PENDING_PREVIEW_CHARS,
};

#[test]
fn public_api_exports_compile() {}
