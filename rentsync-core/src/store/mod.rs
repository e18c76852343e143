//! In-memory, lock-protected stores for the engine's aggregates.
//!
//! Each store hands out clones; mutation goes through store methods so the
//! invariant checks can run under the right lock.

mod accounts;
mod bookings;
mod customers;
mod properties;

pub use accounts::AccountStore;
pub use bookings::{BookingStore, BookingUpdate, NewBooking};
pub use customers::CustomerStore;
pub use properties::PropertyStore;
