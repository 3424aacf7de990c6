use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use chat_backend::ChatBackend;
use chat_sync::ChatWidget;
use chat_widget::runtime::{RuntimeHost, WidgetRuntime};
use serde_json::{json, Value};

pub fn runtime_with(
    backend: Arc<dyn ChatBackend>,
) -> (Arc<Mutex<ChatWidget>>, Arc<WidgetRuntime>) {
    let widget = Arc::new(Mutex::new(ChatWidget::new()));
    let runtime = WidgetRuntime::new(Arc::clone(&widget), backend);
    (widget, runtime)
}

pub fn activate(widget: &Arc<Mutex<ChatWidget>>, runtime: &Arc<WidgetRuntime>) {
    let mut host = RuntimeHost(Arc::clone(runtime));
    lock_unpoisoned(widget).on_activate(&mut host);
}

pub fn submit(widget: &Arc<Mutex<ChatWidget>>, runtime: &Arc<WidgetRuntime>, text: &str) {
    let mut host = RuntimeHost(Arc::clone(runtime));
    lock_unpoisoned(widget).on_submit(text, &mut host);
}

pub fn pending_entry(request_id: &str, prompt: &str, created_at: i64) -> Value {
    json!({
        "requestId": request_id,
        "prompt": prompt,
        "createdAt": created_at,
    })
}

pub fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    predicate()
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
