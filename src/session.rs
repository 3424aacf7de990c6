//! One-shot suppression of the reload that follows a session adoption.

/// Guard that skips exactly one session-change reload.
///
/// Armed when a session id is adopted from a source whose payload already
/// reflects the new session, so the immediate follow-up reload would refetch
/// state the store just received. The next reload-trigger evaluation disarms
/// it and skips; every later evaluation proceeds normally.
#[derive(Debug, Default)]
pub struct SessionTransitionGuard {
    suppress_next_reload: bool,
}

impl SessionTransitionGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.suppress_next_reload
    }

    /// Arms the one-shot suppression. Arming twice before a consumption
    /// still suppresses only once.
    pub fn arm(&mut self) {
        self.suppress_next_reload = true;
    }

    /// Consumes the suppression; `true` means skip this one reload.
    pub fn consume_suppression(&mut self) -> bool {
        let armed = self.suppress_next_reload;
        self.suppress_next_reload = false;
        armed
    }
}

#[cfg(test)]
mod tests {
    use super::SessionTransitionGuard;

    #[test]
    fn suppression_fires_exactly_once() {
        let mut guard = SessionTransitionGuard::new();
        assert!(!guard.consume_suppression());

        guard.arm();
        assert!(guard.is_armed());
        assert!(guard.consume_suppression());
        assert!(!guard.consume_suppression());
    }

    #[test]
    fn double_arm_still_suppresses_once() {
        let mut guard = SessionTransitionGuard::new();
        guard.arm();
        guard.arm();

        assert!(guard.consume_suppression());
        assert!(!guard.consume_suppression());
    }
}
