use std::future::Future;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chat_backend::{CancelSignal, HistoryRequest, HistoryWindow, PushEvent, SendReceipt, SendRequest};
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::config::DashboardApiConfig;
use crate::error::{parse_error_message, DashboardApiError};
use crate::protocol::{history_query_pairs, read_history_window, read_send_receipt, PromptBody};
use crate::retry::{is_retryable_http_error, retry_delay_ms, MAX_RETRIES};
use crate::sse::SsePushParser;
use crate::url::{events_endpoint, history_endpoint, prompt_endpoint};

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Async HTTP client for the dashboard chat endpoints.
#[derive(Debug)]
pub struct DashboardApiClient {
    http: Client,
    config: DashboardApiConfig,
}

impl DashboardApiClient {
    /// The timeout is applied per bounded request, not on the client, so the
    /// long-lived event stream is never cut by it.
    pub fn new(config: DashboardApiConfig) -> Result<Self, DashboardApiError> {
        let mut builder = Client::builder();
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let http = builder.build().map_err(DashboardApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &DashboardApiConfig {
        &self.config
    }

    /// Fetch one history window, retrying transient failures.
    pub async fn fetch_history(
        &self,
        request: &HistoryRequest,
        cancel: Option<&CancelSignal>,
    ) -> Result<HistoryWindow, DashboardApiError> {
        let url = history_endpoint(&self.config.base_url);
        let mut request = request.clone();
        if self.config.include_previous_sessions {
            request.include_previous_sessions = true;
        }
        let pairs = history_query_pairs(&request, &self.config.channel);

        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if is_cancelled(cancel) {
                return Err(DashboardApiError::Cancelled);
            }

            let response = self.bounded(self.http.get(&url).query(&pairs)).send();
            let response = await_or_cancel(response, cancel)
                .await?
                .map_err(DashboardApiError::from);

            match response {
                Ok(response) => {
                    if response.status().is_success() {
                        let value = await_or_cancel(response.json::<Value>(), cancel)
                            .await?
                            .map_err(DashboardApiError::from)?;
                        return read_envelope(&value).map(read_history_window);
                    }

                    let status = response.status();
                    last_status = Some(status);
                    let body = await_or_cancel(response.text(), cancel)
                        .await?
                        .unwrap_or_else(|_| {
                            status
                                .canonical_reason()
                                .unwrap_or("request failed")
                                .to_string()
                        });
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if attempt < MAX_RETRIES && is_retryable_http_error(status.as_u16(), &body) {
                        await_or_cancel(tokio::time::sleep(retry_delay_ms(attempt)), cancel)
                            .await?;
                        continue;
                    }

                    return Err(DashboardApiError::Status(status, message));
                }
                Err(error) => {
                    last_error = Some(error.to_string());
                    if attempt < MAX_RETRIES {
                        await_or_cancel(tokio::time::sleep(retry_delay_ms(attempt)), cancel)
                            .await?;
                        continue;
                    }
                    return Err(DashboardApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
            }
        }

        Err(DashboardApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Submit one prompt. Single attempt: retrying a prompt could run the
    /// agent command twice.
    pub async fn send_prompt(
        &self,
        request: &SendRequest,
        cancel: Option<&CancelSignal>,
    ) -> Result<SendReceipt, DashboardApiError> {
        if is_cancelled(cancel) {
            return Err(DashboardApiError::Cancelled);
        }

        let url = prompt_endpoint(&self.config.base_url);
        let body = PromptBody::from_request(request);
        let response = self.bounded(self.http.post(&url).json(&body)).send();
        let response = await_or_cancel(response, cancel)
            .await?
            .map_err(DashboardApiError::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = await_or_cancel(response.text(), cancel)
                .await?
                .unwrap_or_default();
            return Err(DashboardApiError::Status(
                status,
                parse_error_message(status, &body),
            ));
        }

        let value = await_or_cancel(response.json::<Value>(), cancel)
            .await?
            .map_err(DashboardApiError::from)?;
        read_envelope(&value).map(read_send_receipt)
    }

    /// Consume the push event stream until the server closes it or the
    /// cancellation flag is set. Reconnection policy belongs to the caller.
    pub async fn subscribe_events<F>(
        &self,
        cancel: Option<&CancelSignal>,
        mut on_event: F,
    ) -> Result<(), DashboardApiError>
    where
        F: FnMut(PushEvent),
    {
        let url = events_endpoint(&self.config.base_url);
        let request = self.http.get(&url).header(ACCEPT, "text/event-stream");
        let response = await_or_cancel(request.send(), cancel)
            .await?
            .map_err(DashboardApiError::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = await_or_cancel(response.text(), cancel)
                .await?
                .unwrap_or_default();
            return Err(DashboardApiError::Status(
                status,
                parse_error_message(status, &body),
            ));
        }

        let mut bytes = response.bytes_stream();
        let mut parser = SsePushParser::default();

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancel).await? else {
                break;
            };
            if is_cancelled(cancel) {
                return Err(DashboardApiError::Cancelled);
            }
            let chunk = chunk.map_err(DashboardApiError::from)?;
            for event in parser.feed(&chunk) {
                on_event(event);
            }
        }

        if is_cancelled(cancel) {
            return Err(DashboardApiError::Cancelled);
        }

        Ok(())
    }

    fn bounded(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }
}

fn read_envelope(value: &Value) -> Result<&Value, DashboardApiError> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(DashboardApiError::MalformedPayload(format!(
            "expected a JSON object, got {}",
            value_type_name(value)
        )))
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_cancelled(cancel: Option<&CancelSignal>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::Acquire))
}

async fn await_or_cancel<F>(
    future: F,
    cancel: Option<&CancelSignal>,
) -> Result<F::Output, DashboardApiError>
where
    F: Future,
{
    if cancel.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancel) {
            return Err(DashboardApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancel) {
                return Err(DashboardApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
