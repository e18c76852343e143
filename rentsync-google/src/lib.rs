//! Google Calendar provider for rentsync.
//!
//! Implements `rentsync_core::CalendarApi` over the Calendar v3 REST API:
//! incremental event listing with sync tokens, push-notification channels
//! and OAuth token refresh.

mod api;
mod auth;
mod convert;
mod types;

pub use api::{GoogleCalendarApi, GoogleCredentials};
