//! Wire encoding and lenient decoding for dashboard endpoints.

use chat_backend::{HistoryRequest, HistoryWindow, SendReceipt, SendRequest};
use serde::Serialize;
use serde_json::Value;

/// Body of a prompt submission.
#[derive(Debug, Serialize)]
pub struct PromptBody<'a> {
    pub message: &'a str,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
}

impl<'a> PromptBody<'a> {
    pub fn from_request(request: &'a SendRequest) -> Self {
        Self {
            message: &request.message,
            session_id: request.session_id.as_deref(),
        }
    }
}

/// Query pairs for a history window request.
///
/// Optional parameters are omitted rather than sent empty;
/// `include_previous_sessions` is the server's integer flag and is sent as
/// `"1"` only when set.
pub fn history_query_pairs(request: &HistoryRequest, channel: &str) -> Vec<(String, String)> {
    let mut pairs = vec![
        ("channel".to_string(), channel.to_string()),
        ("limit".to_string(), request.limit.to_string()),
    ];
    if let Some(session_id) = &request.session_id {
        pairs.push(("session_id".to_string(), session_id.clone()));
    }
    if let Some(before) = &request.before {
        pairs.push(("before".to_string(), before.clone()));
    }
    if request.include_previous_sessions {
        pairs.push(("include_previous_sessions".to_string(), "1".to_string()));
    }
    pairs
}

/// Read a history window response leniently.
///
/// Server versions differ in which envelope fields they carry; anything
/// missing degrades to its neutral value instead of failing the fetch.
pub fn read_history_window(value: &Value) -> HistoryWindow {
    HistoryWindow {
        session_id: read_string(value, "sessionId"),
        messages: read_array(value, "messages"),
        pending_requests: read_array(value, "pendingRequests"),
        has_more: value
            .get("hasMore")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        next_cursor: read_string(value, "nextCursor"),
    }
}

/// Read a prompt response leniently.
///
/// `humanMessage` is preferred over `message` for display text, and
/// `outcome == "error"` marks the synchronous reply as failed.
pub fn read_send_receipt(value: &Value) -> SendReceipt {
    let text = read_string(value, "humanMessage").or_else(|| read_string(value, "message"));
    let failed = value
        .get("outcome")
        .and_then(Value::as_str)
        .is_some_and(|outcome| outcome == "error");
    SendReceipt {
        session_id: read_string(value, "sessionId"),
        request_id: read_string(value, "requestId"),
        queued: value
            .get("queued")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        text,
        failed,
    }
}

fn read_string(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(ToString::to_string)
}

fn read_array(value: &Value, key: &str) -> Vec<Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use chat_backend::HistoryRequest;
    use serde_json::json;

    use super::{history_query_pairs, read_history_window, read_send_receipt, PromptBody};

    fn pair(key: &str, value: &str) -> (String, String) {
        (key.to_string(), value.to_string())
    }

    #[test]
    fn initial_request_sends_only_channel_and_limit() {
        let pairs = history_query_pairs(&HistoryRequest::initial(None), "web");
        assert_eq!(pairs, vec![pair("channel", "web"), pair("limit", "30")]);
    }

    #[test]
    fn older_request_adds_session_and_cursor() {
        let mut request = HistoryRequest::older(Some("s1".to_string()), "C9");
        request.include_previous_sessions = true;

        let pairs = history_query_pairs(&request, "ops");
        assert_eq!(
            pairs,
            vec![
                pair("channel", "ops"),
                pair("limit", "30"),
                pair("session_id", "s1"),
                pair("before", "C9"),
                pair("include_previous_sessions", "1"),
            ]
        );
    }

    #[test]
    fn prompt_body_omits_absent_session() {
        let body = PromptBody {
            message: "deploy",
            session_id: None,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({ "message": "deploy" })
        );

        let body = PromptBody {
            message: "deploy",
            session_id: Some("s1"),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({ "message": "deploy", "sessionId": "s1" })
        );
    }

    #[test]
    fn history_window_reads_full_envelope() {
        let window = read_history_window(&json!({
            "sessionId": "web",
            "messages": [{ "id": "m1" }],
            "pendingRequests": [{ "requestId": "r1" }],
            "hasMore": true,
            "nextCursor": "C1",
        }));

        assert_eq!(window.session_id.as_deref(), Some("web"));
        assert_eq!(window.messages.len(), 1);
        assert_eq!(window.pending_requests.len(), 1);
        assert!(window.has_more);
        assert_eq!(window.next_cursor.as_deref(), Some("C1"));
    }

    #[test]
    fn history_window_tolerates_minimal_envelope() {
        let window = read_history_window(&json!({
            "messages": [],
            "sessionId": "web",
        }));

        assert!(window.messages.is_empty());
        assert!(window.pending_requests.is_empty());
        assert!(!window.has_more);
        assert_eq!(window.next_cursor, None);
    }

    #[test]
    fn receipt_prefers_human_message_and_maps_outcome() {
        let receipt = read_send_receipt(&json!({
            "humanMessage": "friendly",
            "message": "raw",
            "requestId": "r1",
            "sessionId": "s1",
            "outcome": "completed",
        }));
        assert_eq!(receipt.text.as_deref(), Some("friendly"));
        assert!(!receipt.failed);
        assert!(!receipt.queued);

        let receipt = read_send_receipt(&json!({
            "message": "Error: agent offline",
            "outcome": "error",
        }));
        assert_eq!(receipt.text.as_deref(), Some("Error: agent offline"));
        assert!(receipt.failed);
    }

    #[test]
    fn queued_receipt_reads_flag() {
        let receipt = read_send_receipt(&json!({
            "requestId": "r1",
            "sessionId": "s1",
            "queued": true,
        }));
        assert!(receipt.queued);
        assert_eq!(receipt.text, None);
    }
}
