//! Transport-only dashboard API client primitives.
//!
//! This crate owns request building, lenient response decoding, retry
//! policy, and SSE push-frame parsing for the dashboard chat endpoints. It
//! intentionally contains no engine state and no runtime coupling; the
//! blocking [`chat_backend::ChatBackend`] adapter and its reconnection
//! policy live in `chat_backend_dashboard`.
//!
//! Decoding is lenient on purpose: server versions differ in which envelope
//! fields they carry, so missing optional fields degrade to neutral values
//! and malformed push frames are dropped rather than failing the stream.

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod retry;
pub mod sse;
pub mod url;

pub use client::DashboardApiClient;
pub use config::DashboardApiConfig;
pub use error::DashboardApiError;
pub use sse::SsePushParser;
pub use url::normalize_dashboard_url;
