use std::io::{self, BufRead};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use chat_backend::DeliveryStatus;
use chat_sync::ChatWidget;
use chat_widget::config;
use chat_widget::runtime::{RuntimeHost, WidgetRuntime};
use tracing_subscriber::EnvFilter;

/// How long one command waits for its backend round trip before printing.
const SETTLE_WINDOW: Duration = Duration::from_millis(1_500);
/// Extra wait after a render, so a completion landing right behind a send
/// receipt makes it into the same printout.
const SETTLE_GRACE: Duration = Duration::from_millis(100);

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let backend = config::backend_from_env().map_err(io::Error::other)?;
    let profile = backend.profile();
    match &profile.endpoint {
        Some(endpoint) => println!("chat widget console ({} at {endpoint})", profile.backend_id),
        None => println!("chat widget console ({})", profile.backend_id),
    }
    println!("type a prompt and press enter; /older pages back, /show reprints, /quit exits");

    let widget = Arc::new(Mutex::new(ChatWidget::new()));
    let runtime = WidgetRuntime::new(Arc::clone(&widget), backend);
    runtime.start().map_err(io::Error::other)?;

    {
        let mut host = RuntimeHost(Arc::clone(&runtime));
        lock_unpoisoned(&widget).on_activate(&mut host);
    }
    settle_and_print(&runtime, &widget);

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" => break,
            "/show" => print_transcript(&widget),
            "/older" => {
                let mut host = RuntimeHost(Arc::clone(&runtime));
                lock_unpoisoned(&widget).load_older(&mut host);
                settle_and_print(&runtime, &widget);
            }
            prompt => {
                let mut host = RuntimeHost(Arc::clone(&runtime));
                lock_unpoisoned(&widget).on_submit(prompt, &mut host);
                settle_and_print(&runtime, &widget);
            }
        }
    }

    runtime.shutdown();
    Ok(())
}

/// Waits for the command's backend activity to quiet down, then prints the
/// transcript once.
fn settle_and_print(runtime: &Arc<WidgetRuntime>, widget: &Arc<Mutex<ChatWidget>>) {
    let deadline = Instant::now() + SETTLE_WINDOW;
    let mut rendered = false;

    while Instant::now() < deadline {
        if runtime.take_render_requests() > 0 {
            rendered = true;
            thread::sleep(SETTLE_GRACE);
            continue;
        }
        if rendered {
            break;
        }
        thread::sleep(Duration::from_millis(25));
    }

    print_transcript(widget);
}

fn print_transcript(widget: &Arc<Mutex<ChatWidget>>) {
    let widget = lock_unpoisoned(widget);

    match widget.session_id() {
        Some(session_id) => println!(
            "--- {} message(s), session {session_id} ---",
            widget.messages().len()
        ),
        None => println!("--- {} message(s) ---", widget.messages().len()),
    }

    for message in widget.messages() {
        let marker = match message.status {
            Some(DeliveryStatus::Failed) => " [failed]",
            Some(DeliveryStatus::Pending) => " [pending]",
            _ => "",
        };
        println!("[{}] {}{marker}", message.role.as_str(), message.text);
    }

    if widget.pending_count() > 0 {
        match widget.pending_preview() {
            Some(preview) => println!(
                "({} request(s) awaiting completion, newest: {preview})",
                widget.pending_count()
            ),
            None => println!("({} request(s) awaiting completion)", widget.pending_count()),
        }
    }

    if widget.pagination().has_more() {
        println!("(older history available: /older)");
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
