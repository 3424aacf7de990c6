use std::time::{SystemTime, UNIX_EPOCH};

use chat_backend::{CompletionEvent, CompletionStatus, PushEvent};
use serde_json::Value;
use uuid::Uuid;

/// Incremental parser for the dashboard's SSE event stream.
///
/// Frames are `data: {json}` blocks separated by blank lines. Unknown event
/// types and malformed frames are dropped without failing the stream.
#[derive(Debug, Default)]
pub struct SsePushParser {
    buffer: String,
}

impl SsePushParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<PushEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut events = Vec::new();

        while let Some(split) = self.buffer.find("\n\n") {
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 2);

            if let Some(payload) = extract_data_payload(&frame) {
                if payload == "[DONE]" || payload.is_empty() {
                    continue;
                }

                if let Ok(value) = serde_json::from_str::<Value>(&payload) {
                    if let Some(event) = map_event(value) {
                        events.push(event);
                    }
                }
            }
        }

        events
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<PushEvent> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty()
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

fn map_event(value: Value) -> Option<PushEvent> {
    let event_type = value.get("type")?.as_str()?;

    match event_type {
        "request_finalized" | "request_failed" => {
            let payload = value.get("payload")?;
            let request_id = payload.get("requestId")?.as_str()?;
            let text = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("");
            let status = if event_type == "request_failed" {
                CompletionStatus::Failed
            } else {
                CompletionStatus::Completed
            };

            Some(PushEvent::Completion(CompletionEvent {
                delivery_id: delivery_id(payload, request_id),
                request_id: request_id.to_owned(),
                text: text.to_owned(),
                status,
            }))
        }
        "heartbeat" => {
            // Current servers put `timestamp` at the frame top level; accept
            // a payload-nested one as well.
            let timestamp = value
                .get("timestamp")
                .or_else(|| value.get("payload").and_then(|payload| payload.get("timestamp")))
                .and_then(Value::as_str)
                .map(ToString::to_string);
            Some(PushEvent::Heartbeat { timestamp })
        }
        _ => None,
    }
}

/// Wire `eventId` when present, otherwise an id minted at receipt from the
/// request id, the arrival time, and a random disambiguator. Minted ids make
/// every arrival distinct, so redelivery collapsing falls to the
/// request-level reconciliation instead.
fn delivery_id(payload: &Value, request_id: &str) -> String {
    if let Some(event_id) = payload.get("eventId").and_then(Value::as_str) {
        return event_id.to_owned();
    }
    format!("{request_id}:{}:{}", arrival_ms(), Uuid::new_v4())
}

fn arrival_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use chat_backend::{CompletionStatus, PushEvent};

    use super::SsePushParser;

    fn completion_frame(event_type: &str, request_id: &str, message: &str) -> String {
        format!(
            "data: {{\"type\":\"{event_type}\",\"payload\":{{\"requestId\":\"{request_id}\",\"message\":\"{message}\"}}}}\n\n"
        )
    }

    #[test]
    fn parses_frames_incrementally_across_chunk_boundaries() {
        let mut parser = SsePushParser::default();
        let frame = completion_frame("request_finalized", "r1", "Done");
        let (head, tail) = frame.split_at(25);

        assert!(parser.feed(head.as_bytes()).is_empty());
        let events = parser.feed(tail.as_bytes());

        assert_eq!(events.len(), 1);
        let PushEvent::Completion(completion) = &events[0] else {
            panic!("expected completion, got {:?}", events[0]);
        };
        assert_eq!(completion.request_id, "r1");
        assert_eq!(completion.text, "Done");
        assert_eq!(completion.status, CompletionStatus::Completed);
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn failed_event_maps_to_failed_status() {
        let events =
            SsePushParser::parse_frames(&completion_frame("request_failed", "r2", "boom"));

        let PushEvent::Completion(completion) = &events[0] else {
            panic!("expected completion, got {:?}", events[0]);
        };
        assert_eq!(completion.status, CompletionStatus::Failed);
        assert_eq!(completion.text, "boom");
    }

    #[test]
    fn minted_delivery_ids_are_distinct_per_arrival() {
        let frames = format!(
            "{}{}",
            completion_frame("request_finalized", "r1", "Done"),
            completion_frame("request_finalized", "r1", "Done"),
        );
        let events = SsePushParser::parse_frames(&frames);

        let ids: Vec<&str> = events
            .iter()
            .map(|event| match event {
                PushEvent::Completion(completion) => completion.delivery_id.as_str(),
                other => panic!("expected completion, got {other:?}"),
            })
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids[0].starts_with("r1:"));
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn wire_event_id_is_kept_verbatim() {
        let events = SsePushParser::parse_frames(
            "data: {\"type\":\"request_finalized\",\"payload\":{\"requestId\":\"r1\",\"eventId\":\"e-77\",\"message\":\"Done\"}}\n\n",
        );

        let PushEvent::Completion(completion) = &events[0] else {
            panic!("expected completion, got {:?}", events[0]);
        };
        assert_eq!(completion.delivery_id, "e-77");
    }

    #[test]
    fn heartbeat_reads_top_level_timestamp() {
        let events = SsePushParser::parse_frames(
            "data: {\"type\":\"heartbeat\",\"timestamp\":\"2026-08-23T10:00:00+00:00\"}\n\n",
        );

        assert_eq!(
            events,
            vec![PushEvent::Heartbeat {
                timestamp: Some("2026-08-23T10:00:00+00:00".to_string()),
            }]
        );
    }

    #[test]
    fn unknown_types_and_sentinels_are_dropped() {
        let mut parser = SsePushParser::default();
        let events = parser.feed(
            concat!(
                "data: {\"type\":\"project_changed\",\"payload\":{\"id\":7}}\n\n",
                "data: [DONE]\n\n",
                "data: {\"type\":\"request_finalized\",\"payload\":{\"message\":\"no id\"}}\n\n",
                "data: not json\n\n",
            )
            .as_bytes(),
        );

        assert!(events.is_empty());
        assert!(parser.is_empty_buffer());
    }
}
