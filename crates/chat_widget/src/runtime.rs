use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chat_backend::{
    CancelSignal, ChatBackend, HistoryRequest, HistoryWindow, PushEvent, SendReceipt, SendRequest,
};
use chat_sync::{ChatWidget, LoadId, LoadKind, SendId, WidgetHost};
use tracing::debug;

use crate::monitor::HealthMonitor;

const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(1);
const STOP_POLL_SLICE: Duration = Duration::from_millis(25);

/// One backend outcome waiting to be applied to the widget.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetEvent {
    HistoryLoaded { load_id: LoadId, window: HistoryWindow },
    HistoryFailed { load_id: LoadId, error: String },
    SendCompleted { send_id: SendId, receipt: SendReceipt },
    SendFailed { send_id: SendId, error: String },
    Push { events: Vec<PushEvent> },
}

enum SettledTask {
    Fetch(LoadId),
    Send(SendId),
}

struct TaskHandle {
    cancel: CancelSignal,
    join_handle: Option<JoinHandle<()>>,
}

/// Drives the [`ChatWidget`] state machine from backend worker threads.
///
/// Workers never touch the widget directly: every backend outcome is queued
/// as a [`WidgetEvent`] and applied in arrival order while holding the single
/// widget mutex. The runtime also owns the push-channel listener and, once
/// [`WidgetRuntime::start`] has run, the health monitor.
pub struct WidgetRuntime {
    widget: Arc<Mutex<ChatWidget>>,
    backend: Arc<dyn ChatBackend>,
    pending_events: Mutex<VecDeque<WidgetEvent>>,
    next_task_id: AtomicU64,
    fetches: Mutex<HashMap<LoadId, TaskHandle>>,
    sends: Mutex<HashMap<SendId, TaskHandle>>,
    listener: Mutex<Option<TaskHandle>>,
    monitor: Mutex<Option<HealthMonitor>>,
    started: AtomicBool,
    shutting_down: AtomicBool,
    render_requests: AtomicU64,
    started_at: Instant,
    last_signal_ms: AtomicU64,
}

impl WidgetRuntime {
    /// Creates a runtime around a shared widget and a backend.
    ///
    /// The widget stays caller-owned: lock it and call its handlers with this
    /// runtime (an `Arc<WidgetRuntime>`) as the host to drive user actions.
    pub fn new(widget: Arc<Mutex<ChatWidget>>, backend: Arc<dyn ChatBackend>) -> Arc<Self> {
        Arc::new(Self {
            widget,
            backend,
            pending_events: Mutex::new(VecDeque::new()),
            next_task_id: AtomicU64::new(1),
            fetches: Mutex::new(HashMap::new()),
            sends: Mutex::new(HashMap::new()),
            listener: Mutex::new(None),
            monitor: Mutex::new(None),
            started: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            render_requests: AtomicU64::new(0),
            started_at: Instant::now(),
            last_signal_ms: AtomicU64::new(0),
        })
    }

    /// Spawns the push listener and the health monitor. Errors when either
    /// worker cannot be spawned or the runtime was already started.
    pub fn start(self: &Arc<Self>) -> Result<(), String> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err("runtime already started".to_string());
        }

        self.spawn_listener()?;
        let monitor = HealthMonitor::spawn(Arc::clone(self))?;
        *lock_unpoisoned(&self.monitor) = Some(monitor);
        Ok(())
    }

    /// Stops the monitor and the listener, cancels in-flight fetches and
    /// sends, and joins every worker thread. Idempotent.
    ///
    /// Must not be called while holding the widget lock: workers may be
    /// blocked on it mid-drain.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(mut monitor) = lock_unpoisoned(&self.monitor).take() {
            monitor.stop();
        }

        let listener = lock_unpoisoned(&self.listener).take();
        let fetches: Vec<TaskHandle> = lock_unpoisoned(&self.fetches)
            .drain()
            .map(|(_, task)| task)
            .collect();
        let sends: Vec<TaskHandle> = lock_unpoisoned(&self.sends)
            .drain()
            .map(|(_, task)| task)
            .collect();

        for task in listener.iter().chain(fetches.iter()).chain(sends.iter()) {
            task.cancel.store(true, Ordering::SeqCst);
        }

        for mut task in listener.into_iter().chain(fetches).chain(sends) {
            if let Some(join_handle) = task.join_handle.take() {
                let _ = join_handle.join();
            }
        }
    }

    /// Number of render requests issued since the last call. The embedding
    /// UI polls this after user actions to decide whether to repaint.
    pub fn take_render_requests(&self) -> u64 {
        self.render_requests.swap(0, Ordering::SeqCst)
    }

    /// Time since the last push event or successfully applied history window.
    pub(crate) fn signal_age(&self) -> Duration {
        let last = self.last_signal_ms.load(Ordering::SeqCst);
        Duration::from_millis(self.mono_now_ms().saturating_sub(last))
    }

    /// Forces a full re-sync: fresh push subscription plus a replace-mode
    /// history reload. Invoked by the health monitor when the backend has
    /// gone silent past the staleness window.
    pub(crate) fn recover_from_staleness(self: &Arc<Self>) {
        debug!("no backend activity within the staleness window, resyncing");
        self.mark_signal();
        self.restart_push_listener();

        let mut host = RuntimeHost(Arc::clone(self));
        let mut widget = lock_unpoisoned(&self.widget);
        widget.force_reload(&mut host);
    }

    fn mark_signal(&self) {
        self.last_signal_ms.store(self.mono_now_ms(), Ordering::SeqCst);
    }

    fn mono_now_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    fn restart_push_listener(self: &Arc<Self>) {
        if let Some(mut task) = lock_unpoisoned(&self.listener).take() {
            task.cancel.store(true, Ordering::SeqCst);
            if let Some(join_handle) = task.join_handle.take() {
                let _ = join_handle.join();
            }
        }

        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }

        if let Err(error) = self.spawn_listener() {
            debug!(error = %error, "failed to restart push listener");
        }
    }

    fn spawn_listener(self: &Arc<Self>) -> Result<(), String> {
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        let runtime = Arc::clone(self);
        let worker_cancel = Arc::clone(&cancel);
        let join_handle = thread::Builder::new()
            .name("chat-widget-push".to_string())
            .spawn(move || runtime.listener_worker(worker_cancel))
            .map_err(|error| format!("Failed to spawn push listener: {error}"))?;

        *lock_unpoisoned(&self.listener) = Some(TaskHandle {
            cancel,
            join_handle: Some(join_handle),
        });
        Ok(())
    }

    fn listener_worker(self: Arc<Self>, cancel: CancelSignal) {
        while !cancel.load(Ordering::SeqCst) && !self.shutting_down.load(Ordering::SeqCst) {
            let subscription = catch_unwind(AssertUnwindSafe(|| {
                let mut emit = |event: PushEvent| {
                    self.enqueue_event(WidgetEvent::Push {
                        events: vec![event],
                    });
                };
                self.backend.subscribe(Arc::clone(&cancel), &mut emit)
            }));

            match subscription {
                Ok(Ok(())) => {}
                Ok(Err(error)) => debug!(error = %error, "push subscription failed"),
                Err(_) => debug!("push subscription panicked"),
            }

            if self.wait_before_resubscribe(&cancel) {
                break;
            }
        }
    }

    /// Sleeps in short slices between subscription attempts. Returns true
    /// when cancellation or shutdown was observed.
    fn wait_before_resubscribe(&self, cancel: &CancelSignal) -> bool {
        let mut remaining = LISTENER_RETRY_DELAY;
        loop {
            if cancel.load(Ordering::SeqCst) || self.shutting_down.load(Ordering::SeqCst) {
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

    fn start_fetch_internal(
        self: &Arc<Self>,
        kind: LoadKind,
        request: HistoryRequest,
    ) -> Result<LoadId, String> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err("runtime is shutting down".to_string());
        }

        let load_id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        lock_unpoisoned(&self.fetches).insert(
            load_id,
            TaskHandle {
                cancel: Arc::clone(&cancel),
                join_handle: None,
            },
        );

        let runtime = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("chat-widget-fetch-{load_id}"))
            .spawn(move || runtime.fetch_worker(load_id, request, cancel));

        match spawned {
            Ok(join_handle) => {
                // The worker may have already finished and cleared its slot.
                if let Some(task) = lock_unpoisoned(&self.fetches).get_mut(&load_id) {
                    task.join_handle = Some(join_handle);
                }
                debug!(load_id, ?kind, "scheduled history fetch");
                Ok(load_id)
            }
            Err(error) => {
                lock_unpoisoned(&self.fetches).remove(&load_id);
                Err(format!("Failed to spawn fetch worker: {error}"))
            }
        }
    }

    fn fetch_worker(self: Arc<Self>, load_id: LoadId, request: HistoryRequest, cancel: CancelSignal) {
        let backend = Arc::clone(&self.backend);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            backend.fetch_history(request, Arc::clone(&cancel))
        }));

        let event = match outcome {
            Ok(Ok(window)) => WidgetEvent::HistoryLoaded { load_id, window },
            Ok(Err(error)) => WidgetEvent::HistoryFailed {
                load_id,
                error: error.to_string(),
            },
            Err(_) => WidgetEvent::HistoryFailed {
                load_id,
                error: "history backend panicked".to_string(),
            },
        };
        self.enqueue_event(event);
    }

    fn start_send_internal(self: &Arc<Self>, request: SendRequest) -> Result<SendId, String> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err("runtime is shutting down".to_string());
        }

        let send_id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        lock_unpoisoned(&self.sends).insert(
            send_id,
            TaskHandle {
                cancel: Arc::clone(&cancel),
                join_handle: None,
            },
        );

        let runtime = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("chat-widget-send-{send_id}"))
            .spawn(move || runtime.send_worker(send_id, request, cancel));

        match spawned {
            Ok(join_handle) => {
                if let Some(task) = lock_unpoisoned(&self.sends).get_mut(&send_id) {
                    task.join_handle = Some(join_handle);
                }
                debug!(send_id, "scheduled prompt send");
                Ok(send_id)
            }
            Err(error) => {
                lock_unpoisoned(&self.sends).remove(&send_id);
                Err(format!("Failed to spawn send worker: {error}"))
            }
        }
    }

    fn send_worker(self: Arc<Self>, send_id: SendId, request: SendRequest, cancel: CancelSignal) {
        let backend = Arc::clone(&self.backend);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            backend.send_prompt(request, Arc::clone(&cancel))
        }));

        let event = match outcome {
            Ok(Ok(receipt)) => WidgetEvent::SendCompleted { send_id, receipt },
            Ok(Err(error)) => WidgetEvent::SendFailed {
                send_id,
                error: error.to_string(),
            },
            Err(_) => WidgetEvent::SendFailed {
                send_id,
                error: "send backend panicked".to_string(),
            },
        };
        self.enqueue_event(event);
    }

    fn enqueue_event(self: &Arc<Self>, event: WidgetEvent) {
        if self.shutting_down.load(Ordering::SeqCst) {
            debug!("dropping widget event during shutdown");
            return;
        }

        let should_drain = {
            let mut queue = lock_unpoisoned(&self.pending_events);
            let should_drain = queue.is_empty();
            queue.push_back(event);
            should_drain
        };

        // Only the thread that made the queue non-empty drains; an active
        // drain loop picks up whatever lands behind it.
        if should_drain {
            self.drain_pending_events();
        }
    }

    fn drain_pending_events(self: &Arc<Self>) {
        loop {
            let event = lock_unpoisoned(&self.pending_events).pop_front();
            match event {
                Some(event) => self.apply_event(event),
                None => break,
            }
        }
    }

    fn apply_event(self: &Arc<Self>, event: WidgetEvent) {
        let settled = match &event {
            WidgetEvent::HistoryLoaded { load_id, .. }
            | WidgetEvent::HistoryFailed { load_id, .. } => Some(SettledTask::Fetch(*load_id)),
            WidgetEvent::SendCompleted { send_id, .. }
            | WidgetEvent::SendFailed { send_id, .. } => Some(SettledTask::Send(*send_id)),
            WidgetEvent::Push { .. } => None,
        };

        if matches!(
            event,
            WidgetEvent::HistoryLoaded { .. } | WidgetEvent::Push { .. }
        ) {
            self.mark_signal();
        }

        {
            let mut host = RuntimeHost(Arc::clone(self));
            let mut widget = lock_unpoisoned(&self.widget);
            match event {
                WidgetEvent::HistoryLoaded { load_id, window } => {
                    widget.on_history_loaded(load_id, window, &mut host);
                }
                WidgetEvent::HistoryFailed { load_id, error } => {
                    widget.on_history_failed(load_id, &error, &mut host);
                }
                WidgetEvent::SendCompleted { send_id, receipt } => {
                    widget.on_send_response(send_id, receipt, &mut host);
                }
                WidgetEvent::SendFailed { send_id, error } => {
                    widget.on_send_failed(send_id, &error, &mut host);
                }
                WidgetEvent::Push { events } => {
                    widget.on_push_events(&events, &mut host);
                }
            }
        }

        match settled {
            Some(SettledTask::Fetch(load_id)) => self.clear_fetch(load_id),
            Some(SettledTask::Send(send_id)) => self.clear_send(send_id),
            None => {}
        }
    }

    fn clear_fetch(&self, load_id: LoadId) {
        let task = lock_unpoisoned(&self.fetches).remove(&load_id);
        join_settled_task(task);
    }

    fn clear_send(&self, send_id: SendId) {
        let task = lock_unpoisoned(&self.sends).remove(&send_id);
        join_settled_task(task);
    }

    fn cancel_fetch_internal(&self, load_id: LoadId) {
        if let Some(task) = lock_unpoisoned(&self.fetches).get(&load_id) {
            task.cancel.store(true, Ordering::SeqCst);
        }
    }

    fn cancel_send_internal(&self, send_id: SendId) {
        if let Some(task) = lock_unpoisoned(&self.sends).get(&send_id) {
            task.cancel.store(true, Ordering::SeqCst);
        }
    }
}

/// [`WidgetHost`] handle over a shared runtime.
///
/// A wrapper type rather than an impl on `Arc<WidgetRuntime>` directly:
/// `WidgetHost` is foreign to this crate and `Arc` is not a fundamental
/// type, so the orphan rule rejects that impl.
pub struct RuntimeHost(pub Arc<WidgetRuntime>);

impl WidgetHost for RuntimeHost {
    fn start_history_fetch(
        &mut self,
        kind: LoadKind,
        request: HistoryRequest,
    ) -> Result<LoadId, String> {
        self.0.start_fetch_internal(kind, request)
    }

    fn cancel_history_fetch(&mut self, load_id: LoadId) {
        self.0.cancel_fetch_internal(load_id);
    }

    fn start_send(&mut self, request: SendRequest) -> Result<SendId, String> {
        self.0.start_send_internal(request)
    }

    fn cancel_send(&mut self, send_id: SendId) {
        self.0.cancel_send_internal(send_id);
    }

    fn request_render(&mut self) {
        self.0.render_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn now_epoch_ms(&mut self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as i64)
    }

    fn now_mono_ms(&mut self) -> u64 {
        self.0.mono_now_ms()
    }
}

fn join_settled_task(task: Option<TaskHandle>) {
    let Some(mut task) = task else {
        return;
    };
    let Some(join_handle) = task.join_handle.take() else {
        return;
    };

    let is_current_thread = join_handle.thread().id() == thread::current().id();
    if !is_current_thread && join_handle.is_finished() {
        let _ = join_handle.join();
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
