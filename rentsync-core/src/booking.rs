//! Booking domain types and the status state machine.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// A reservation of a property for a half-open date range `[check_in, check_out)`.
///
/// The checkout day is exclusive, so a booking ending on a given day and
/// another starting that same day do not conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: u64,
    pub property_id: u64,
    pub customer_id: u64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub status: BookingStatus,
    pub source: BookingSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Cancelled bookings are kept for history but excluded from overlap checks.
    pub fn blocks_dates(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Draft,
    Confirmed,
    Cancelled,
    CheckedIn,
    CheckedOut,
}

/// An action that moves a booking through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingAction {
    Confirm,
    Cancel,
    CheckIn,
    CheckOut,
}

impl BookingStatus {
    /// Apply a lifecycle action using the explicit transition table.
    ///
    /// Cancelled and CheckedOut are terminal; any pair not in the table is
    /// rejected with `InvalidTransition`.
    pub fn apply(self, action: BookingAction) -> SyncResult<BookingStatus> {
        use BookingAction as A;
        use BookingStatus as S;

        match (self, action) {
            (S::Draft, A::Confirm) => Ok(S::Confirmed),
            (S::Draft, A::Cancel) => Ok(S::Cancelled),
            (S::Confirmed, A::Cancel) => Ok(S::Cancelled),
            (S::Confirmed, A::CheckIn) => Ok(S::CheckedIn),
            (S::CheckedIn, A::CheckOut) => Ok(S::CheckedOut),
            (from, action) => Err(SyncError::InvalidTransition {
                from: from.as_str(),
                action: action.as_str(),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Draft => "draft",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::CheckedIn => "checked_in",
            BookingStatus::CheckedOut => "checked_out",
        }
    }
}

impl BookingAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingAction::Confirm => "confirm",
            BookingAction::Cancel => "cancel",
            BookingAction::CheckIn => "check_in",
            BookingAction::CheckOut => "check_out",
        }
    }
}

/// Where a booking originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingSource {
    Crm,
    Google,
    Ical,
    Other,
}

impl BookingSource {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingSource::Crm => "crm",
            BookingSource::Google => "google",
            BookingSource::Ical => "ical",
            BookingSource::Other => "other",
        }
    }
}
