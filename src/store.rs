//! Ordered, dedup-merging transcript store.

use std::cmp::Ordering;
use std::collections::HashSet;

use chat_backend::{ChatMessage, MessagePhase};
use serde_json::Value;
use tracing::debug;

/// In-memory transcript with three merge modes.
///
/// `replace` handles full (re)loads, `prepend_unique` handles older
/// pagination pages, `append_trailing` handles causally-recent local
/// appends. Message ids stay unique across all of them, and any full sort
/// uses the canonical comparator so merge order never depends on arrival
/// order.
#[derive(Debug, Default)]
pub struct HistoryStore {
    messages: Vec<ChatMessage>,
    ids: HashSet<String>,
}

impl HistoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Replaces the whole transcript with a normalized, sorted window.
    ///
    /// Malformed items are dropped individually; a duplicated id keeps its
    /// first occurrence in input order. Returns how many items were accepted.
    pub fn replace(&mut self, window: &[Value]) -> usize {
        self.messages.clear();
        self.ids.clear();

        let mut accepted = Vec::with_capacity(window.len());
        for item in window {
            let Some(message) = ChatMessage::from_value(item) else {
                debug!("dropping malformed history item");
                continue;
            };
            if !self.ids.insert(message.id.clone()) {
                debug!(id = %message.id, "dropping duplicated history id");
                continue;
            }
            accepted.push(message);
        }

        accepted.sort_by(canonical_cmp);
        let count = accepted.len();
        self.messages = accepted;
        count
    }

    /// Splices an older page before the current transcript.
    ///
    /// Items whose id is already present, in the store or earlier in the
    /// batch, are skipped; the unique remainder is sorted canonically before
    /// splicing. Returns how many items were inserted.
    pub fn prepend_unique(&mut self, window: &[Value]) -> usize {
        let mut fresh = Vec::with_capacity(window.len());
        for item in window {
            let Some(message) = ChatMessage::from_value(item) else {
                debug!("dropping malformed history item");
                continue;
            };
            if !self.ids.insert(message.id.clone()) {
                debug!(id = %message.id, "skipping already-present id in older page");
                continue;
            }
            fresh.push(message);
        }

        fresh.sort_by(canonical_cmp);
        let count = fresh.len();
        self.messages.splice(0..0, fresh);
        count
    }

    /// Appends a causally-recent message without re-sorting.
    ///
    /// Returns `false` when the id is already present, leaving the transcript
    /// unchanged.
    pub fn append_trailing(&mut self, message: ChatMessage) -> bool {
        if !self.ids.insert(message.id.clone()) {
            debug!(id = %message.id, "ignoring trailing append with duplicate id");
            return false;
        }
        self.messages.push(message);
        true
    }
}

/// Canonical transcript ordering.
///
/// `created_at` ascending, then request id lexically (absent sorts first as
/// the empty string), then exchange phase (ask, synchronous ack,
/// asynchronous finalization, unrecognized), then id. Ties on the first two
/// keys are routine: one exchange's messages often share a millisecond and a
/// request id, yet must always render in causal order.
pub fn canonical_cmp(a: &ChatMessage, b: &ChatMessage) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| request_key(a).cmp(request_key(b)))
        .then_with(|| phase_rank(a.phase).cmp(&phase_rank(b.phase)))
        .then_with(|| a.id.cmp(&b.id))
}

fn request_key(message: &ChatMessage) -> &str {
    message.request_id.as_deref().unwrap_or("")
}

fn phase_rank(phase: Option<MessagePhase>) -> u8 {
    match phase {
        Some(MessagePhase::UserTurn) => 0,
        Some(MessagePhase::SyncReply) => 1,
        Some(MessagePhase::AsyncReply) => 2,
        None => 3,
    }
}

#[cfg(test)]
mod tests {
    use chat_backend::ChatMessage;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use super::HistoryStore;

    fn item(id: &str, created_at: i64) -> Value {
        json!({
            "id": id,
            "role": "system",
            "text": format!("text for {id}"),
            "createdAt": created_at,
        })
    }

    fn exchange_item(id: &str, created_at: i64, request_id: &str, phase: &str) -> Value {
        json!({
            "id": id,
            "role": if phase == "user" { "user" } else { "system" },
            "text": format!("text for {id}"),
            "createdAt": created_at,
            "requestId": request_id,
            "phase": phase,
        })
    }

    fn ids(store: &HistoryStore) -> Vec<String> {
        store
            .messages()
            .iter()
            .map(|message| message.id.clone())
            .collect()
    }

    #[test]
    fn replace_normalizes_sorts_and_dedups() {
        let mut store = HistoryStore::new();
        let accepted = store.replace(&[
            item("m3", 300),
            item("m1", 100),
            json!({ "id": "bad", "role": "user", "createdAt": 150 }),
            item("m2", 200),
            item("m1", 999),
        ]);

        assert_eq!(accepted, 3);
        assert_eq!(ids(&store), vec!["m1", "m2", "m3"]);
        // First occurrence of a duplicated id wins.
        assert_eq!(store.messages()[0].created_at, 100);
    }

    #[test]
    fn replace_discards_previous_contents() {
        let mut store = HistoryStore::new();
        store.replace(&[item("old", 1)]);
        store.replace(&[item("new", 2)]);

        assert_eq!(ids(&store), vec!["new"]);
        assert!(!store.contains("old"));
    }

    #[test]
    fn tie_order_is_deterministic_across_input_permutations() {
        let items = [
            exchange_item("m-user", 500, "r1", "user"),
            exchange_item("m-sync", 500, "r1", "reply"),
            exchange_item("m-async", 500, "r1", "async_reply"),
            exchange_item("m-unknown", 500, "r1", "interlude"),
        ];
        let permutations: Vec<Vec<usize>> = vec![
            vec![0, 1, 2, 3],
            vec![3, 2, 1, 0],
            vec![2, 0, 3, 1],
            vec![1, 3, 0, 2],
        ];

        for order in permutations {
            let window: Vec<Value> = order.iter().map(|&i| items[i].clone()).collect();
            let mut store = HistoryStore::new();
            store.replace(&window);
            assert_eq!(
                ids(&store),
                vec!["m-user", "m-sync", "m-async", "m-unknown"],
                "ordering must not depend on input order"
            );
        }
    }

    #[test]
    fn absent_request_id_sorts_before_any_present_one() {
        let mut store = HistoryStore::new();
        store.replace(&[
            exchange_item("m-linked", 500, "r1", "reply"),
            item("m-plain", 500),
        ]);

        assert_eq!(ids(&store), vec!["m-plain", "m-linked"]);
    }

    #[test]
    fn equal_keys_fall_back_to_id_order() {
        let mut store = HistoryStore::new();
        store.replace(&[item("m-b", 500), item("m-a", 500)]);

        assert_eq!(ids(&store), vec!["m-a", "m-b"]);
    }

    #[test]
    fn prepend_unique_skips_present_ids_and_sorts_page() {
        let mut store = HistoryStore::new();
        store.replace(&[item("m10", 1000), item("m11", 1100)]);

        let inserted = store.prepend_unique(&[
            item("m2", 200),
            item("m10", 1000),
            item("m1", 100),
            item("m1", 100),
        ]);

        assert_eq!(inserted, 2);
        assert_eq!(ids(&store), vec!["m1", "m2", "m10", "m11"]);
    }

    #[test]
    fn prepend_unique_of_fully_known_page_changes_nothing() {
        let mut store = HistoryStore::new();
        store.replace(&[item("m1", 100), item("m2", 200)]);

        let inserted = store.prepend_unique(&[item("m1", 100), item("m2", 200)]);

        assert_eq!(inserted, 0);
        assert_eq!(ids(&store), vec!["m1", "m2"]);
    }

    #[test]
    fn append_trailing_keeps_ids_unique() {
        let mut store = HistoryStore::new();
        let message = ChatMessage::local_user("hello", 100);
        let duplicate = message.clone();

        assert!(store.append_trailing(message));
        assert!(!store.append_trailing(duplicate));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn append_trailing_does_not_resort() {
        let mut store = HistoryStore::new();
        store.replace(&[item("m1", 1000)]);

        // Trailing appends trust causal recency even when the author clock
        // lags the stored window.
        let message = ChatMessage::local_user("late clock", 50);
        let appended_id = message.id.clone();
        assert!(store.append_trailing(message));

        assert_eq!(ids(&store), vec!["m1".to_string(), appended_id]);
        assert_eq!(store.messages()[1].created_at, 50);
    }
}
