//! Webhook idempotency ledger.
//!
//! Push delivery is at-least-once; the ledger's insert is the sole arbiter
//! of "first delivery wins". It must not be replaced by a read-then-write
//! check, which would reopen the duplicate-delivery race.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

/// Headers of one push notification, as delivered by the calendar service.
#[derive(Debug, Clone)]
pub struct PushNotification {
    pub channel_id: String,
    pub channel_token: String,
    pub resource_id: String,
    pub message_number: String,
}

impl PushNotification {
    /// The ledger key: `provider:resource_id:message_number`.
    pub fn idempotency_key(&self, provider: &str) -> String {
        format!("{}:{}:{}", provider, self.resource_id, self.message_number)
    }
}

/// Append-only record of processed notification identifiers. A key's mere
/// presence means "already processed".
#[derive(Default)]
pub struct WebhookLedger {
    inner: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl WebhookLedger {
    pub fn new() -> Self {
        WebhookLedger {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Insert the key, returning true only for the first writer. Concurrent
    /// duplicate deliveries race on the entry under one lock, so exactly one
    /// caller observes `true`.
    pub fn record(&self, external_id: &str) -> bool {
        let mut seen = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match seen.entry(external_id.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(Utc::now());
                true
            }
            Entry::Occupied(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_writer_wins() {
        let ledger = WebhookLedger::new();
        assert!(ledger.record("google:res-1:42"));
        assert!(!ledger.record("google:res-1:42"));
        assert!(ledger.record("google:res-1:43"));
    }

    #[test]
    fn test_concurrent_duplicates_record_once() {
        use std::sync::Arc;

        let ledger = Arc::new(WebhookLedger::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || ledger.record("google:res-9:7"))
            })
            .collect();
        let firsts = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|first| *first)
            .count();
        assert_eq!(firsts, 1);
    }

    #[test]
    fn test_idempotency_key_shape() {
        let n = PushNotification {
            channel_id: "chan".into(),
            channel_token: "secret".into(),
            resource_id: "res-1".into(),
            message_number: "42".into(),
        };
        assert_eq!(n.idempotency_key("google"), "google:res-1:42");
    }
}
