//! Linked calendar account storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::account::{CalendarAccount, TokenSet};
use crate::error::{SyncError, SyncResult};
use crate::event::CalendarProvider;

#[derive(Default)]
pub struct AccountStore {
    next_id: AtomicU64,
    inner: RwLock<HashMap<u64, CalendarAccount>>,
}

impl AccountStore {
    pub fn new() -> Self {
        AccountStore {
            next_id: AtomicU64::new(1),
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Link (or re-link) an account. Upserts by (user, provider, email) so a
    /// repeated OAuth flow refreshes credentials instead of duplicating the
    /// account.
    pub fn link(
        &self,
        user: &str,
        provider: CalendarProvider,
        email: &str,
        access_token: &str,
        refresh_token: &str,
        token_expiry: Option<DateTime<Utc>>,
    ) -> CalendarAccount {
        let mut accounts = self.write();
        if let Some(existing) = accounts
            .values_mut()
            .find(|a| a.user == user && a.provider == provider && a.email == email)
        {
            existing.access_token = access_token.to_string();
            if !refresh_token.is_empty() {
                existing.refresh_token = refresh_token.to_string();
            }
            existing.token_expiry = token_expiry;
            return existing.clone();
        }
        let account = CalendarAccount {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            user: user.to_string(),
            provider,
            email: email.to_string(),
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            token_expiry,
        };
        accounts.insert(account.id, account.clone());
        account
    }

    pub fn get(&self, id: u64) -> Option<CalendarAccount> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Store freshly refreshed tokens for an account.
    pub fn update_tokens(&self, id: u64, tokens: &TokenSet) -> SyncResult<CalendarAccount> {
        let mut accounts = self.write();
        let account = accounts.get_mut(&id).ok_or(SyncError::AccountNotFound(id))?;
        account.access_token = tokens.access_token.clone();
        if let Some(refresh) = &tokens.refresh_token {
            account.refresh_token = refresh.clone();
        }
        account.token_expiry = tokens.expires_at;
        Ok(account.clone())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<u64, CalendarAccount>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
