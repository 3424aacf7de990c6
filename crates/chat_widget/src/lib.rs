//! Widget runtime for the dashboard chat panel.
//!
//! Owns the shared `ChatWidget` state machine, the backend worker threads
//! that feed it, the push-channel listener, and the periodic health monitor.
//! The runtime is the only place that applies backend outcomes: workers queue
//! [`runtime::WidgetEvent`]s and the drain applies them serially under the
//! one widget mutex.
//!
//! ## Backend bootstrap
//!
//! Backend selection is environment-driven:
//!
//! - `CHAT_WIDGET_BACKEND=mock` for the deterministic in-process backend
//! - `CHAT_WIDGET_BACKEND=dashboard` for the live dashboard HTTP transport
//!
//! When `CHAT_WIDGET_BACKEND=dashboard`, `CHAT_WIDGET_DASHBOARD_URL` points
//! at the dashboard server base URL (default `http://127.0.0.1:8765`).
//! Unset selection falls back to `mock`.

pub mod config;
pub mod monitor;
pub mod runtime;
