//! Push-notification channel subscriptions.
//!
//! One row per registered watch channel. `channel_id` is generated locally;
//! `resource_id` is assigned by the service and is what inbound notifications
//! carry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarSubscription {
    pub id: u64,
    pub account_id: u64,
    pub calendar_id: String,
    pub channel_id: String,
    pub resource_id: String,
    pub verification_token: String,
    pub expiration: Option<DateTime<Utc>>,
    pub active: bool,
}

#[derive(Default)]
pub struct SubscriptionStore {
    next_id: AtomicU64,
    inner: RwLock<HashMap<u64, CalendarSubscription>>,
}

impl SubscriptionStore {
    pub fn new() -> Self {
        SubscriptionStore {
            next_id: AtomicU64::new(1),
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(
        &self,
        account_id: u64,
        calendar_id: &str,
        channel_id: &str,
        resource_id: &str,
        verification_token: &str,
        expiration: Option<DateTime<Utc>>,
    ) -> CalendarSubscription {
        let subscription = CalendarSubscription {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            account_id,
            calendar_id: calendar_id.to_string(),
            channel_id: channel_id.to_string(),
            resource_id: resource_id.to_string(),
            verification_token: verification_token.to_string(),
            expiration,
            active: true,
        };
        self.write().insert(subscription.id, subscription.clone());
        subscription
    }

    /// The subscription an inbound notification belongs to.
    pub fn find_active_by_resource_id(&self, resource_id: &str) -> Option<CalendarSubscription> {
        self.read()
            .values()
            .find(|s| s.active && s.resource_id == resource_id)
            .cloned()
    }

    pub fn find_by_channel_id(&self, channel_id: &str) -> Option<CalendarSubscription> {
        self.read()
            .values()
            .find(|s| s.channel_id == channel_id)
            .cloned()
    }

    /// Mark a channel inactive. Called after "stop" regardless of whether the
    /// service call succeeded (best-effort teardown).
    pub fn deactivate(&self, channel_id: &str, resource_id: &str) {
        let mut subscriptions = self.write();
        for subscription in subscriptions.values_mut() {
            if subscription.channel_id == channel_id && subscription.resource_id == resource_id {
                subscription.active = false;
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<u64, CalendarSubscription>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<u64, CalendarSubscription>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
