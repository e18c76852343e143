//! Wire types for the Calendar v3 REST API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventsListResponse {
    pub items: Vec<GoogleEvent>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleEvent {
    pub id: String,
    /// Stable across copies of the event; preferred over `id` for identity.
    #[serde(rename = "iCalUID")]
    pub ical_uid: Option<String>,
    pub status: Option<String>,
    pub start: Option<GoogleEventTime>,
    pub end: Option<GoogleEventTime>,
    pub attendees: Vec<GoogleAttendee>,
    pub organizer: Option<GooglePerson>,
    pub creator: Option<GooglePerson>,
}

/// Either `date` (all-day) or `dateTime` (timed) is set, never both.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoogleEventTime {
    pub date: Option<NaiveDate>,
    pub date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GoogleAttendee {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GooglePerson {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CalendarListResponse {
    pub items: Vec<CalendarListEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CalendarListEntry {
    pub id: String,
    pub summary: String,
    pub primary: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchResponse {
    pub id: String,
    pub resource_id: String,
    /// Milliseconds since the epoch, as a decimal string.
    pub expiration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}
