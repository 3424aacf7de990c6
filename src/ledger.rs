//! In-flight asynchronous request tracking.

use serde_json::Value;
use tracing::debug;

/// One request sent but not yet finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequestEntry {
    pub request_id: String,
    pub prompt: String,
    pub created_at: i64,
}

/// Registry of requests awaiting asynchronous completion.
///
/// Entries keep registration order. Registration and removal are both
/// idempotent, so the ledger tolerates replayed send receipts and duplicate
/// completion handling without drifting.
#[derive(Debug, Default)]
pub struct PendingRequestLedger {
    entries: Vec<PendingRequestEntry>,
}

impl PendingRequestLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[PendingRequestEntry] {
        &self.entries
    }

    #[must_use]
    pub fn contains(&self, request_id: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.request_id == request_id)
    }

    /// Registers a request; a no-op when the id is already tracked.
    ///
    /// Returns `true` when a new entry was inserted.
    pub fn register(
        &mut self,
        request_id: impl Into<String>,
        prompt: impl Into<String>,
        now: i64,
    ) -> bool {
        let request_id = request_id.into();
        if self.contains(&request_id) {
            debug!(request_id = %request_id, "request already registered");
            return false;
        }
        self.entries.push(PendingRequestEntry {
            request_id,
            prompt: prompt.into(),
            created_at: now,
        });
        true
    }

    /// Removes a request; removing an absent id is a no-op.
    pub fn remove(&mut self, request_id: &str) -> Option<PendingRequestEntry> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.request_id == request_id)?;
        Some(self.entries.remove(index))
    }

    /// Rehydrates entries from a history window's `pendingRequests` array.
    ///
    /// Each item needs a string `requestId`, a string `prompt`, and a numeric
    /// `createdAt`; malformed items are dropped individually. Registration
    /// stays idempotent per id. Returns how many entries were inserted.
    pub fn restore(&mut self, items: &[Value]) -> usize {
        let mut inserted = 0;
        for item in items {
            let Some(entry) = read_entry(item) else {
                debug!("dropping malformed pending-request item");
                continue;
            };
            if self.register(entry.request_id, entry.prompt, entry.created_at) {
                inserted += 1;
            }
        }
        inserted
    }

    /// The most recently created entry, later registration winning ties.
    #[must_use]
    pub fn newest(&self) -> Option<&PendingRequestEntry> {
        self.entries.iter().max_by_key(|entry| entry.created_at)
    }

    /// Char-truncated prompt of the newest entry, for the pending banner.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> Option<String> {
        let prompt = &self.newest()?.prompt;
        let mut preview: String = prompt.chars().take(max_chars).collect();
        if preview.chars().count() < prompt.chars().count() {
            preview.push('…');
        }
        Some(preview)
    }
}

fn read_entry(item: &Value) -> Option<PendingRequestEntry> {
    let request_id = item.get("requestId")?.as_str()?.to_string();
    let prompt = item.get("prompt")?.as_str()?.to_string();
    let created_at = item.get("createdAt")?.as_i64()?;
    Some(PendingRequestEntry {
        request_id,
        prompt,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::PendingRequestLedger;

    #[test]
    fn register_is_idempotent_per_id() {
        let mut ledger = PendingRequestLedger::new();

        assert!(ledger.register("r1", "deploy service", 100));
        assert!(!ledger.register("r1", "deploy service again", 200));

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.entries()[0].prompt, "deploy service");
        assert_eq!(ledger.entries()[0].created_at, 100);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut ledger = PendingRequestLedger::new();
        ledger.register("r1", "deploy", 100);

        let removed = ledger.remove("r1").expect("entry should exist");
        assert_eq!(removed.request_id, "r1");
        assert!(ledger.remove("r1").is_none());
        assert!(ledger.is_empty());
    }

    #[test]
    fn restore_reads_leniently_and_stays_idempotent() {
        let mut ledger = PendingRequestLedger::new();
        ledger.register("r1", "already here", 50);

        let inserted = ledger.restore(&[
            json!({ "requestId": "r1", "prompt": "replayed", "createdAt": 60 }),
            json!({ "requestId": "r2", "prompt": "restart worker", "createdAt": 70 }),
            json!({ "prompt": "missing id", "createdAt": 80 }),
            json!({ "requestId": "r3", "prompt": 42, "createdAt": 90 }),
        ]);

        assert_eq!(inserted, 1);
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains("r2"));
        assert!(!ledger.contains("r3"));
        // The replayed r1 kept its original registration.
        assert_eq!(ledger.entries()[0].prompt, "already here");
    }

    #[test]
    fn newest_prefers_latest_created_at() {
        let mut ledger = PendingRequestLedger::new();
        ledger.register("r1", "first", 100);
        ledger.register("r2", "second", 300);
        ledger.register("r3", "third", 200);

        assert_eq!(
            ledger.newest().map(|entry| entry.request_id.as_str()),
            Some("r2")
        );
    }

    #[test]
    fn preview_truncates_on_char_boundaries() {
        let mut ledger = PendingRequestLedger::new();
        ledger.register("r1", "déploiement du service de paiement", 100);

        assert_eq!(ledger.preview(11).as_deref(), Some("déploiement…"));
        assert_eq!(
            ledger.preview(100).as_deref(),
            Some("déploiement du service de paiement")
        );
        assert!(PendingRequestLedger::new().preview(10).is_none());
    }
}
