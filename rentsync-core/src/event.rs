//! Provider-neutral external event types.
//!
//! Both sync protocols (push/delta sync and one-way feed import) normalize
//! their payloads into `ExternalEvent` before the reconciler sees them, so
//! dedup logic never cares which protocol an event arrived over.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::booking::BookingSource;

/// The external calendar system an event or account belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarProvider {
    Google,
    Ical,
}

impl CalendarProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            CalendarProvider::Google => "google",
            CalendarProvider::Ical => "ical",
        }
    }

    pub fn booking_source(self) -> BookingSource {
        match self {
            CalendarProvider::Google => BookingSource::Google,
            CalendarProvider::Ical => BookingSource::Ical,
        }
    }
}

/// Provider-qualified external event identity (`"provider:uid"`).
///
/// UID shapes differ between protocols (iCalUID vs event id vs feed UID);
/// qualifying them at ingestion keeps the link store protocol-agnostic and
/// stable across repeated syncs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventUid(String);

impl EventUid {
    pub fn new(provider: CalendarProvider, raw: &str) -> Self {
        EventUid(format!("{}:{}", provider.as_str(), raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An event boundary: all-day date or timestamped instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EventDate {
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl EventDate {
    /// Normalize to a calendar date; timestamped values drop time-of-day.
    pub fn to_date(self) -> NaiveDate {
        match self {
            EventDate::Date(d) => d,
            EventDate::DateTime(dt) => dt.date_naive(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalEventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

/// A calendar event as received from an external source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub uid: EventUid,
    pub provider: CalendarProvider,
    pub status: ExternalEventStatus,
    pub start: Option<EventDate>,
    pub end: Option<EventDate>,
    pub attendee_emails: Vec<String>,
    pub creator_email: Option<String>,
    pub organizer_email: Option<String>,
}

impl ExternalEvent {
    /// Stay dates for the booking, if both boundaries resolve.
    pub fn stay_dates(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.start?.to_date(), self.end?.to_date()))
    }

    /// The email the booking's customer is resolved from: first attendee,
    /// then creator, then organizer.
    pub fn guest_email(&self) -> Option<&str> {
        self.attendee_emails
            .first()
            .map(String::as_str)
            .or(self.creator_email.as_deref())
            .or(self.organizer_email.as_deref())
    }
}
