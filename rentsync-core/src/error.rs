//! Error types for the rentsync engine.

use chrono::NaiveDate;
use thiserror::Error;

use crate::provider::ProviderError;

/// Errors that can occur in rentsync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("check_out must be after check_in ({check_in} >= {check_out})")]
    InvalidRange {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },

    #[error("booking dates overlap an existing booking for property {property_id}")]
    OverlapConflict { property_id: u64 },

    #[error("a stay of {nights} nights from {start} does not fit the calendar")]
    StayTooLong { start: NaiveDate, nights: u64 },

    #[error("invalid booking status transition: {from} -> {action}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },

    #[error("property not found: {0}")]
    PropertyNotFound(u64),

    #[error("booking not found: {0}")]
    BookingNotFound(u64),

    #[error("calendar account not found: {0}")]
    AccountNotFound(u64),

    #[error("no subscription for channel '{0}'")]
    SubscriptionNotFound(String),

    #[error("webhook channel token mismatch")]
    Forbidden,

    #[error("feed parse error: {0}")]
    Feed(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Result type alias for rentsync operations.
pub type SyncResult<T> = Result<T, SyncError>;
