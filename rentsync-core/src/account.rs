//! Linked calendar accounts and their OAuth-style credentials.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::event::CalendarProvider;

/// A linked external calendar account. One per (user, provider, email).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarAccount {
    pub id: u64,
    pub user: String,
    pub provider: CalendarProvider,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expiry: Option<DateTime<Utc>>,
}

impl CalendarAccount {
    /// Whether the access token is expired (or about to be, within a small
    /// skew window) and must be refreshed before the next API call.
    pub fn needs_refresh(&self) -> bool {
        match self.token_expiry {
            Some(expiry) => expiry <= Utc::now() + Duration::minutes(1),
            None => false,
        }
    }
}

/// Tokens returned by a provider's refresh endpoint.
///
/// Providers typically do not return a new refresh token on refresh; `None`
/// keeps the stored one.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}
