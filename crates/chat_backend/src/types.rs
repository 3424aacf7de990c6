use serde_json::Value;
use uuid::Uuid;

/// Author of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    System,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "user" => Self::User,
            "system" => Self::System,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
        }
    }
}

/// Logical phase of a message within one request exchange.
///
/// Acts as an ordering rank when wall-clock timestamps tie: the user's ask,
/// its synchronous acknowledgment, and the asynchronous finalization often
/// share the same millisecond and the same request id, yet must render in
/// causal order. An unrecognized phase ranks after all known ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePhase {
    UserTurn,
    SyncReply,
    AsyncReply,
}

impl MessagePhase {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "user" => Self::UserTurn,
            "reply" => Self::SyncReply,
            "async_reply" => Self::AsyncReply,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserTurn => "user",
            Self::SyncReply => "reply",
            Self::AsyncReply => "async_reply",
        }
    }
}

/// Delivery state of a request-linked message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Pending,
    Completed,
    Failed,
}

impl DeliveryStatus {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "pending" => Self::Pending,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// One transcript message as the widget stores it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub text: String,
    /// Author-supplied epoch milliseconds; not monotonic across unrelated sources.
    pub created_at: i64,
    pub request_id: Option<String>,
    pub status: Option<DeliveryStatus>,
    pub phase: Option<MessagePhase>,
    /// Renderer-owned scratch state; never serialized or sent anywhere.
    pub transient_display_state: Option<Value>,
}

impl ChatMessage {
    /// Builds a locally-authored user message with a fresh id.
    #[must_use]
    pub fn local_user(text: impl Into<String>, created_at: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            text: text.into(),
            created_at,
            request_id: None,
            status: None,
            phase: Some(MessagePhase::UserTurn),
            transient_display_state: None,
        }
    }

    /// Builds a locally-appended system message with a fresh id.
    #[must_use]
    pub fn local_system(text: impl Into<String>, created_at: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::System,
            text: text.into(),
            created_at,
            request_id: None,
            status: None,
            phase: Some(MessagePhase::SyncReply),
            transient_display_state: None,
        }
    }

    /// Builds the finalized system message for one reconciled completion.
    #[must_use]
    pub fn finalized(
        request_id: impl Into<String>,
        text: impl Into<String>,
        status: DeliveryStatus,
        created_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::System,
            text: text.into(),
            created_at,
            request_id: Some(request_id.into()),
            status: Some(status),
            phase: Some(MessagePhase::AsyncReply),
            transient_display_state: None,
        }
    }

    /// Reads one externally-sourced item leniently.
    ///
    /// Returns `None` when a required field (`id`, recognized `role`, `text`,
    /// finite numeric `createdAt`) is missing or malformed. Optional fields
    /// degrade individually instead of rejecting the item; a missing phase
    /// falls back to a role-derived value, while an unrecognized one stays
    /// `None` and ranks last in ordering.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = value.get("id")?.as_str()?.to_string();
        let role = Role::parse(value.get("role")?.as_str()?)?;
        let text = value.get("text")?.as_str()?.to_string();
        let created_at = read_epoch_ms(value.get("createdAt")?)?;
        let request_id = value
            .get("requestId")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        let status = value
            .get("status")
            .and_then(Value::as_str)
            .and_then(DeliveryStatus::parse);
        let phase = match value.get("phase").and_then(Value::as_str) {
            Some(raw) => MessagePhase::parse(raw),
            None => Some(derive_phase(role, request_id.as_deref())),
        };

        Some(Self {
            id,
            role,
            text,
            created_at,
            request_id,
            status,
            phase,
            transient_display_state: None,
        })
    }
}

fn derive_phase(role: Role, request_id: Option<&str>) -> MessagePhase {
    match (role, request_id) {
        (Role::User, _) => MessagePhase::UserTurn,
        (Role::System, Some(_)) => MessagePhase::AsyncReply,
        (Role::System, None) => MessagePhase::SyncReply,
    }
}

fn read_epoch_ms(value: &Value) -> Option<i64> {
    if let Some(ms) = value.as_i64() {
        return Some(ms);
    }
    let ms = value.as_f64()?;
    if ms.is_finite() {
        Some(ms as i64)
    } else {
        None
    }
}

/// Parameters for one history fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub session_id: Option<String>,
    /// Opaque backward cursor; `None` requests the newest window.
    pub before: Option<String>,
    pub limit: u32,
    pub include_previous_sessions: bool,
}

impl HistoryRequest {
    pub const DEFAULT_LIMIT: u32 = 30;

    /// Requests the newest window for a session (or the server default session).
    #[must_use]
    pub fn initial(session_id: Option<String>) -> Self {
        Self {
            session_id,
            before: None,
            limit: Self::DEFAULT_LIMIT,
            include_previous_sessions: false,
        }
    }

    /// Requests the page preceding `before` for a session.
    #[must_use]
    pub fn older(session_id: Option<String>, before: impl Into<String>) -> Self {
        Self {
            session_id,
            before: Some(before.into()),
            limit: Self::DEFAULT_LIMIT,
            include_previous_sessions: false,
        }
    }
}

/// One server history window.
///
/// Messages and pending entries stay raw `Value`s here; the store normalizes
/// them item by item so one malformed entry never rejects the batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistoryWindow {
    pub session_id: Option<String>,
    pub messages: Vec<Value>,
    pub pending_requests: Vec<Value>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// One prompt submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub message: String,
    pub session_id: Option<String>,
}

/// Synchronous response to one prompt submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub session_id: Option<String>,
    pub request_id: Option<String>,
    /// True when the backend parked the prompt for asynchronous completion.
    pub queued: bool,
    /// Display text of the synchronous reply, when one was produced.
    pub text: Option<String>,
    /// True when the backend reported the synchronous outcome as an error.
    pub failed: bool,
}

/// Terminal state carried by an asynchronous completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Completed,
    Failed,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Maps the completion outcome onto the message delivery state.
    #[must_use]
    pub fn delivery_status(self) -> DeliveryStatus {
        match self {
            Self::Completed => DeliveryStatus::Completed,
            Self::Failed => DeliveryStatus::Failed,
        }
    }
}

/// One asynchronous completion delivery.
///
/// `delivery_id` identifies the delivery, not the logical request.
/// Redeliveries may repeat an id (exact replay) or carry a fresh one;
/// transports mint an id at receipt when the wire provides none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEvent {
    pub delivery_id: String,
    pub request_id: String,
    pub text: String,
    pub status: CompletionStatus,
}

/// Event emitted by a push-channel subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Completion(CompletionEvent),
    /// Keepalive frame; refreshes staleness tracking, nothing else.
    Heartbeat { timestamp: Option<String> },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ChatMessage, DeliveryStatus, HistoryRequest, MessagePhase, Role};

    #[test]
    fn from_value_reads_well_formed_item() {
        let message = ChatMessage::from_value(&json!({
            "id": "m1",
            "role": "user",
            "text": "deploy service",
            "createdAt": 1_700_000_000_000_i64,
            "requestId": "r1",
            "status": "pending",
        }))
        .expect("well-formed item should normalize");

        assert_eq!(message.id, "m1");
        assert_eq!(message.role, Role::User);
        assert_eq!(message.text, "deploy service");
        assert_eq!(message.created_at, 1_700_000_000_000);
        assert_eq!(message.request_id.as_deref(), Some("r1"));
        assert_eq!(message.status, Some(DeliveryStatus::Pending));
        assert_eq!(message.phase, Some(MessagePhase::UserTurn));
    }

    #[test]
    fn from_value_rejects_missing_required_fields() {
        assert!(ChatMessage::from_value(&json!({
            "role": "user", "text": "x", "createdAt": 1
        }))
        .is_none());
        assert!(ChatMessage::from_value(&json!({
            "id": "m1", "role": "operator", "text": "x", "createdAt": 1
        }))
        .is_none());
        assert!(ChatMessage::from_value(&json!({
            "id": "m1", "role": "user", "createdAt": 1
        }))
        .is_none());
        assert!(ChatMessage::from_value(&json!({
            "id": "m1", "role": "user", "text": "x"
        }))
        .is_none());
        assert!(ChatMessage::from_value(&json!({
            "id": "m1", "role": "user", "text": "x", "createdAt": "soon"
        }))
        .is_none());
    }

    #[test]
    fn from_value_accepts_float_timestamps_and_rejects_non_finite() {
        let message = ChatMessage::from_value(&json!({
            "id": "m1", "role": "user", "text": "x", "createdAt": 1_700_000_000_123.0
        }))
        .expect("finite float timestamps are valid");
        assert_eq!(message.created_at, 1_700_000_000_123);

        assert!(ChatMessage::from_value(&json!({
            "id": "m2", "role": "user", "text": "x", "createdAt": f64::NAN
        }))
        .is_none());
    }

    #[test]
    fn from_value_derives_phase_from_role_and_request_linkage() {
        let user = ChatMessage::from_value(&json!({
            "id": "m1", "role": "user", "text": "x", "createdAt": 1
        }))
        .expect("valid");
        assert_eq!(user.phase, Some(MessagePhase::UserTurn));

        let sync_reply = ChatMessage::from_value(&json!({
            "id": "m2", "role": "system", "text": "x", "createdAt": 1
        }))
        .expect("valid");
        assert_eq!(sync_reply.phase, Some(MessagePhase::SyncReply));

        let async_reply = ChatMessage::from_value(&json!({
            "id": "m3", "role": "system", "text": "x", "createdAt": 1, "requestId": "r1"
        }))
        .expect("valid");
        assert_eq!(async_reply.phase, Some(MessagePhase::AsyncReply));
    }

    #[test]
    fn from_value_keeps_unrecognized_phase_unranked() {
        let message = ChatMessage::from_value(&json!({
            "id": "m1", "role": "system", "text": "x", "createdAt": 1, "phase": "interlude"
        }))
        .expect("item stays valid with unknown phase");
        assert_eq!(message.phase, None);
    }

    #[test]
    fn from_value_drops_malformed_optional_fields_individually() {
        let message = ChatMessage::from_value(&json!({
            "id": "m1", "role": "user", "text": "x", "createdAt": 1,
            "requestId": 42, "status": "eventual"
        }))
        .expect("optional fields degrade without rejecting the item");
        assert_eq!(message.request_id, None);
        assert_eq!(message.status, None);
    }

    #[test]
    fn local_constructors_mint_distinct_ids() {
        let first = ChatMessage::local_user("a", 10);
        let second = ChatMessage::local_user("a", 10);
        assert_ne!(first.id, second.id);
        assert_eq!(first.phase, Some(MessagePhase::UserTurn));

        let system = ChatMessage::local_system("b", 10);
        assert_eq!(system.role, Role::System);
        assert_eq!(system.phase, Some(MessagePhase::SyncReply));
    }

    #[test]
    fn history_request_constructors_set_cursor_and_limit() {
        let initial = HistoryRequest::initial(Some("s1".to_string()));
        assert_eq!(initial.before, None);
        assert_eq!(initial.limit, HistoryRequest::DEFAULT_LIMIT);
        assert!(!initial.include_previous_sessions);

        let older = HistoryRequest::older(Some("s1".to_string()), "cursor-9");
        assert_eq!(older.before.as_deref(), Some("cursor-9"));
        assert_eq!(older.session_id.as_deref(), Some("s1"));
    }
}
