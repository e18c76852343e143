//! Core engine for the rentsync ecosystem.
//!
//! This crate holds the booking-consistency and calendar-reconciliation
//! logic shared by the server and providers:
//! - booking storage with the per-property no-overlap invariant
//! - the availability engine (overlap checks, next-free-slot search)
//! - the event reconciler that maps external calendar events to bookings
//! - incremental sync state, the webhook idempotency ledger and watch
//!   channel subscriptions
//! - the sync orchestrator tying it all together behind a `CalendarApi`
//!   abstraction implemented by provider crates

pub mod account;
pub mod availability;
pub mod booking;
pub mod error;
pub mod event;
pub mod feed;
pub mod orchestrator;
pub mod property;
pub mod provider;
pub mod reconcile;
pub mod store;
pub mod subscription;
pub mod sync_state;
pub mod webhook;

pub use account::{CalendarAccount, TokenSet};
pub use booking::{Booking, BookingAction, BookingSource, BookingStatus};
pub use error::{SyncError, SyncResult};
pub use event::{CalendarProvider, EventDate, EventUid, ExternalEvent, ExternalEventStatus};
pub use orchestrator::{SyncOrchestrator, SyncPassSummary};
pub use property::{Customer, Property};
pub use provider::{
    CalendarApi, CalendarInfo, EventsPage, ProviderError, SyncCursor, WatchRegistration,
};
