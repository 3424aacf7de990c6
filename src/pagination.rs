//! Cursor-based backward pagination.

use tracing::debug;

use crate::scroll::{ScrollMetrics, NEAR_TOP_PX};

/// Scroll offset at or below which the near-top auto trigger fires.
pub const AUTO_TRIGGER_PX: f64 = 36.0;

/// Minimum interval between auto triggers. Keeps fast scrolling from issuing
/// one fetch per scroll tick.
pub const AUTO_TRIGGER_COOLDOWN_MS: u64 = 420;

/// Backward pagination state for one transcript.
///
/// `loading` is a reentrancy lock, not a queue: calls rejected while a load
/// is in flight are dropped. Cooldowns compare injected monotonic
/// milliseconds, never external timers.
#[derive(Debug, Default)]
pub struct PaginationController {
    has_more: bool,
    next_cursor: Option<String>,
    loading: bool,
    last_auto_trigger: Option<u64>,
}

impl PaginationController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    #[must_use]
    pub fn next_cursor(&self) -> Option<&str> {
        self.next_cursor.as_deref()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Adopts pagination state from a replace-mode window and releases any
    /// stale lock from a superseded load.
    pub fn seed(&mut self, has_more: bool, next_cursor: Option<String>) {
        self.has_more = has_more;
        self.next_cursor = next_cursor;
        self.loading = false;
    }

    /// Starts one older-page load, yielding the cursor to fetch with.
    ///
    /// `None` when a load is already running, no more pages exist, or no
    /// cursor is known.
    pub fn begin_load(&mut self) -> Option<String> {
        if self.loading || !self.has_more {
            return None;
        }
        let cursor = self.next_cursor.clone()?;
        self.loading = true;
        debug!(cursor = %cursor, "older-page load started");
        Some(cursor)
    }

    /// Lands a completed older-page fetch.
    pub fn complete_load(&mut self, has_more: bool, next_cursor: Option<String>) {
        self.loading = false;
        self.has_more = has_more;
        self.next_cursor = next_cursor;
    }

    /// Releases the lock after a failed fetch. Cursor state is unchanged so
    /// a later trigger retries the same page.
    pub fn abort_load(&mut self) {
        self.loading = false;
    }

    /// Evaluates the near-top auto trigger against injected monotonic time.
    ///
    /// A trigger counts against the cooldown even when `begin_load` then
    /// rejects it, matching the per-invocation debounce.
    pub fn maybe_auto_load(&mut self, scroll_top: f64, now_mono_ms: u64) -> Option<String> {
        if scroll_top > AUTO_TRIGGER_PX {
            return None;
        }
        if let Some(last) = self.last_auto_trigger {
            if now_mono_ms.saturating_sub(last) <= AUTO_TRIGGER_COOLDOWN_MS {
                return None;
            }
        }
        self.last_auto_trigger = Some(now_mono_ms);
        self.begin_load()
    }

    /// Whether the manual "load older" affordance should be visible: the
    /// container scrolls and the viewport sits near the top, or a load is
    /// already in flight.
    #[must_use]
    pub fn load_older_visible(&self, metrics: &ScrollMetrics) -> bool {
        metrics.is_scrollable() && (metrics.scroll_top <= NEAR_TOP_PX || self.loading)
    }
}
