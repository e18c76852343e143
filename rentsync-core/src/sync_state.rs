//! Incremental sync state, one cursor per (account, calendar).
//!
//! A missing token means "no successful sync yet": the next pass does a
//! time-bounded full fetch instead of a delta request. The cursor only
//! advances after a pass completes, so a failed pass retries naturally on
//! the next trigger.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::CalendarProvider;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarSyncState {
    pub account_id: u64,
    pub calendar_id: String,
    pub provider: CalendarProvider,
    pub sync_token: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct SyncStateStore {
    inner: RwLock<HashMap<(u64, String), CalendarSyncState>>,
}

impl SyncStateStore {
    pub fn new() -> Self {
        SyncStateStore {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Idempotent fetch of the cursor row for this (account, calendar).
    pub fn get_or_create(&self, account_id: u64, calendar_id: &str) -> CalendarSyncState {
        let key = (account_id, calendar_id.to_string());
        let mut states = self.write();
        states
            .entry(key)
            .or_insert_with(|| CalendarSyncState {
                account_id,
                calendar_id: calendar_id.to_string(),
                provider: CalendarProvider::Google,
                sync_token: None,
                last_synced_at: None,
            })
            .clone()
    }

    /// Record a successful pass: persist the fresh continuation token and
    /// stamp `last_synced_at`.
    pub fn complete_pass(&self, account_id: u64, calendar_id: &str, sync_token: &str) {
        let key = (account_id, calendar_id.to_string());
        let mut states = self.write();
        if let Some(state) = states.get_mut(&key) {
            state.sync_token = Some(sync_token.to_string());
            state.last_synced_at = Some(Utc::now());
        }
    }

    /// Drop the stored cursor so the next fetch is a full, time-bounded one.
    /// Used when the service reports the token expired or invalid.
    pub fn clear_token(&self, account_id: u64, calendar_id: &str) {
        let key = (account_id, calendar_id.to_string());
        let mut states = self.write();
        if let Some(state) = states.get_mut(&key) {
            state.sync_token = None;
        }
    }

    fn write(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<(u64, String), CalendarSyncState>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = SyncStateStore::new();
        let a = store.get_or_create(1, "cal-1");
        assert!(a.sync_token.is_none());

        store.complete_pass(1, "cal-1", "token-1");
        let b = store.get_or_create(1, "cal-1");
        assert_eq!(b.sync_token.as_deref(), Some("token-1"));
        assert!(b.last_synced_at.is_some());
    }

    #[test]
    fn test_clear_token_resets_to_full_fetch() {
        let store = SyncStateStore::new();
        store.get_or_create(1, "cal-1");
        store.complete_pass(1, "cal-1", "token-1");
        store.clear_token(1, "cal-1");
        assert!(store.get_or_create(1, "cal-1").sync_token.is_none());
    }
}
