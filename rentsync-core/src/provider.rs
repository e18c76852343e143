//! Calendar service abstraction.
//!
//! Provider crates implement `CalendarApi`; the orchestrator only sees the
//! cursor/page protocol and a coarse error classification, so recovery
//! decisions (retry, token reset, surface-to-owner) live in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

use crate::account::{CalendarAccount, TokenSet};
use crate::event::ExternalEvent;

/// A calendar visible to a linked account, as offered to the owner when
/// mapping a property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarInfo {
    pub id: String,
    pub summary: String,
    pub primary: bool,
}

/// Where to start an event listing: a stored delta token, or a lower time
/// bound for a full forward-looking fetch.
#[derive(Debug, Clone)]
pub enum SyncCursor {
    Token(String),
    TimeMin(DateTime<Utc>),
}

/// One page of an event listing.
#[derive(Debug, Default)]
pub struct EventsPage {
    pub events: Vec<ExternalEvent>,
    /// Present while more pages remain for this pass.
    pub next_page_token: Option<String>,
    /// Present on the final page; replay it to get changes since this pass.
    pub next_sync_token: Option<String>,
}

/// Result of registering a push-notification channel.
#[derive(Debug, Clone)]
pub struct WatchRegistration {
    pub channel_id: String,
    pub resource_id: String,
    pub expiration: Option<DateTime<Utc>>,
}

/// Calendar service failures, classified the way the orchestrator reacts to
/// them: timeouts and 5xx retryable, 410 resets the token, other 4xx terminal.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("sync token expired or invalid")]
    ExpiredSyncToken,

    #[error("calendar service rejected credentials: {0}")]
    Auth(String),

    #[error("transient calendar service failure: {0}")]
    Transient(String),

    #[error("calendar service request failed: {0}")]
    Request(String),
}

impl ProviderError {
    /// Safe to retry on the next trigger without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// External calendar service operations used by the sync engine.
///
/// Desugared async methods so callers can rely on `Send` futures.
pub trait CalendarApi: Send + Sync {
    /// List the calendars the account can see.
    fn list_calendars(
        &self,
        account: &CalendarAccount,
    ) -> impl Future<Output = Result<Vec<CalendarInfo>, ProviderError>> + Send;

    /// List events for a calendar from the given cursor, optionally resuming
    /// mid-pass with a page token.
    fn list_events(
        &self,
        account: &CalendarAccount,
        calendar_id: &str,
        cursor: &SyncCursor,
        page_token: Option<&str>,
    ) -> impl Future<Output = Result<EventsPage, ProviderError>> + Send;

    /// Register a push-notification channel for a calendar.
    fn watch(
        &self,
        account: &CalendarAccount,
        calendar_id: &str,
        channel_id: &str,
        callback_url: &str,
        verification_token: &str,
    ) -> impl Future<Output = Result<WatchRegistration, ProviderError>> + Send;

    /// Stop a previously registered channel.
    fn stop(
        &self,
        account: &CalendarAccount,
        channel_id: &str,
        resource_id: &str,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Exchange the refresh token for fresh access credentials.
    fn refresh_tokens(
        &self,
        account: &CalendarAccount,
    ) -> impl Future<Output = Result<TokenSet, ProviderError>> + Send;
}
