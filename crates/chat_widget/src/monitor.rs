use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::runtime::WidgetRuntime;

/// Cadence of staleness checks.
pub const MONITOR_TICK: Duration = Duration::from_secs(15);
/// Backend silence threshold after which a full re-sync is forced.
pub const STALE_AFTER: Duration = Duration::from_secs(60);

const STOP_POLL_SLICE: Duration = Duration::from_millis(25);

/// Watchdog for a backend that has gone quiet.
///
/// A live backend produces a signal at least every heartbeat interval; when
/// neither a push event nor a history window has arrived for [`STALE_AFTER`],
/// the stream is assumed half-dead and the runtime is told to reconnect the
/// push channel and reload history. [`WidgetRuntime::start`] owns one of
/// these; embedders running their own lifecycle can spawn another.
pub struct HealthMonitor {
    stop: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    pub fn spawn(runtime: Arc<WidgetRuntime>) -> Result<Self, String> {
        Self::spawn_with_intervals(runtime, MONITOR_TICK, STALE_AFTER)
    }

    fn spawn_with_intervals(
        runtime: Arc<WidgetRuntime>,
        tick: Duration,
        stale_after: Duration,
    ) -> Result<Self, String> {
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);
        let join_handle = thread::Builder::new()
            .name("chat-widget-monitor".to_string())
            .spawn(move || monitor_worker(runtime, worker_stop, tick, stale_after))
            .map_err(|error| format!("Failed to spawn health monitor: {error}"))?;

        Ok(Self {
            stop,
            join_handle: Some(join_handle),
        })
    }

    /// Stops the watchdog and joins its thread. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join_handle) = self.join_handle.take() {
            let _ = join_handle.join();
        }
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn monitor_worker(
    runtime: Arc<WidgetRuntime>,
    stop: Arc<AtomicBool>,
    tick: Duration,
    stale_after: Duration,
) {
    loop {
        if sleep_with_stop(tick, &stop) {
            return;
        }

        if runtime.signal_age() >= stale_after {
            runtime.recover_from_staleness();
        }
    }
}

/// Sleeps in short slices so `stop` interrupts a pending tick. Returns true
/// when the flag was observed.
fn sleep_with_stop(duration: Duration, stop: &AtomicBool) -> bool {
    let mut remaining = duration;
    loop {
        if stop.load(Ordering::SeqCst) {
            return true;
        }
        if remaining.is_zero() {
            return false;
        }
        let slice = remaining.min(STOP_POLL_SLICE);
        thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
}
