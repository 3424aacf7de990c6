//! Scroll behavior selection and anchor preservation.

/// Offset from the top, in pixels, within which the viewport counts as near
/// the top. Shared by the derived `near_top` flag and the manual load-older
/// affordance.
pub const NEAR_TOP_PX: f64 = 120.0;

/// Layout passes to wait after activation before touching scroll metrics.
pub const ACTIVATION_SETTLE_PASSES: u8 = 2;

/// Slack applied to the scrollability check so rounding noise never flips it.
const SCROLLABLE_SLACK_PX: f64 = 1.0;

/// Viewport measurements reported by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    #[must_use]
    pub fn is_scrollable(&self) -> bool {
        self.scroll_height > self.client_height + SCROLLABLE_SLACK_PX
    }

    #[must_use]
    pub fn is_near_top(&self) -> bool {
        self.scroll_top <= NEAR_TOP_PX
    }
}

/// Pre-merge viewport snapshot used to keep content visually anchored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorSnapshot {
    pub scroll_top: f64,
    pub content_height: f64,
}

impl AnchorSnapshot {
    /// Offset that keeps previously visible content in place after content
    /// grew to `new_content_height`: the old offset plus the height gained
    /// above it.
    #[must_use]
    pub fn restored_offset(&self, new_content_height: f64) -> f64 {
        self.scroll_top + (new_content_height - self.content_height)
    }
}

/// Scroll instruction emitted for the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollCommand {
    /// Jump to the bottom after `settle_passes` layout passes complete.
    SnapToBottom { settle_passes: u8 },
    /// Restore the pre-merge anchor once the taller content has laid out.
    PreserveAnchor { prior: AnchorSnapshot },
}

/// Derived viewport flags, recomputed on every scroll-relevant event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewportFlags {
    pub near_top: bool,
    pub scrollable: bool,
}

/// Chooses the scroll behavior for the three triggers (trailing append,
/// activation, older-page merge) and memoizes the derived viewport flags so
/// unchanged values never cause redundant renderer writes.
#[derive(Debug, Default)]
pub struct ScrollAnchorController {
    last_metrics: Option<ScrollMetrics>,
    flags: ViewportFlags,
}

impl ScrollAnchorController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn flags(&self) -> ViewportFlags {
        self.flags
    }

    #[must_use]
    pub fn last_metrics(&self) -> Option<ScrollMetrics> {
        self.last_metrics
    }

    /// Records fresh metrics and rederives the viewport flags.
    ///
    /// Returns `Some` only when either flag changed.
    pub fn observe(&mut self, metrics: ScrollMetrics) -> Option<ViewportFlags> {
        self.last_metrics = Some(metrics);
        let flags = ViewportFlags {
            near_top: metrics.is_near_top(),
            scrollable: metrics.is_scrollable(),
        };
        if flags == self.flags {
            return None;
        }
        self.flags = flags;
        Some(flags)
    }

    /// Snapshot taken just before an older-page merge. `None` until metrics
    /// have been observed at least once.
    #[must_use]
    pub fn capture_anchor(&self) -> Option<AnchorSnapshot> {
        let metrics = self.last_metrics?;
        Some(AnchorSnapshot {
            scroll_top: metrics.scroll_top,
            content_height: metrics.scroll_height,
        })
    }

    /// Command for a causally-recent trailing append.
    #[must_use]
    pub fn on_trailing_append(&self) -> ScrollCommand {
        ScrollCommand::SnapToBottom { settle_passes: 0 }
    }

    /// Command for widget activation; the snap waits out layout settling.
    #[must_use]
    pub fn on_activation(&self) -> ScrollCommand {
        ScrollCommand::SnapToBottom {
            settle_passes: ACTIVATION_SETTLE_PASSES,
        }
    }

    /// Command restoring the captured anchor after an older-page merge.
    #[must_use]
    pub fn on_older_merge(&self, prior: AnchorSnapshot) -> ScrollCommand {
        ScrollCommand::PreserveAnchor { prior }
    }
}

#[cfg(test)]
mod tests {
    use super::{AnchorSnapshot, ScrollAnchorController, ScrollCommand, ScrollMetrics};

    fn metrics(scroll_top: f64, scroll_height: f64, client_height: f64) -> ScrollMetrics {
        ScrollMetrics {
            scroll_top,
            scroll_height,
            client_height,
        }
    }

    #[test]
    fn restored_offset_adds_exactly_the_gained_height() {
        let prior = AnchorSnapshot {
            scroll_top: 40.0,
            content_height: 1200.0,
        };

        // 350px of older content prepended above the viewport.
        assert_eq!(prior.restored_offset(1550.0), 390.0);
        // Nothing inserted: offset unchanged.
        assert_eq!(prior.restored_offset(1200.0), 40.0);
    }

    #[test]
    fn observe_reports_only_changes() {
        let mut controller = ScrollAnchorController::new();

        let first = controller.observe(metrics(30.0, 900.0, 400.0));
        assert_eq!(
            first.map(|flags| (flags.near_top, flags.scrollable)),
            Some((true, true))
        );

        // Identical derivation: memoized away.
        assert!(controller.observe(metrics(90.0, 900.0, 400.0)).is_none());

        let moved_away = controller.observe(metrics(400.0, 900.0, 400.0));
        assert_eq!(
            moved_away.map(|flags| (flags.near_top, flags.scrollable)),
            Some((false, true))
        );
    }

    #[test]
    fn first_observation_matching_defaults_is_silent() {
        let mut controller = ScrollAnchorController::new();
        assert!(controller.observe(metrics(500.0, 300.0, 400.0)).is_none());
    }

    #[test]
    fn scrollability_uses_slack_against_rounding_noise() {
        assert!(!metrics(0.0, 400.5, 400.0).is_scrollable());
        assert!(metrics(0.0, 402.0, 400.0).is_scrollable());
    }

    #[test]
    fn capture_anchor_reflects_latest_observation() {
        let mut controller = ScrollAnchorController::new();
        assert!(controller.capture_anchor().is_none());

        controller.observe(metrics(75.0, 1400.0, 420.0));
        let anchor = controller.capture_anchor().expect("metrics were observed");
        assert_eq!(anchor.scroll_top, 75.0);
        assert_eq!(anchor.content_height, 1400.0);
    }

    #[test]
    fn trigger_commands_carry_their_settle_behavior() {
        let controller = ScrollAnchorController::new();

        assert_eq!(
            controller.on_trailing_append(),
            ScrollCommand::SnapToBottom { settle_passes: 0 }
        );
        assert_eq!(
            controller.on_activation(),
            ScrollCommand::SnapToBottom { settle_passes: 2 }
        );

        let prior = AnchorSnapshot {
            scroll_top: 10.0,
            content_height: 500.0,
        };
        assert_eq!(
            controller.on_older_merge(prior),
            ScrollCommand::PreserveAnchor { prior }
        );
    }
}
