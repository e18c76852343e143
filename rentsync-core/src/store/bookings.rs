//! Booking storage with per-property write serialization.
//!
//! Each property's bookings live behind their own mutex, held across
//! validate+write so two concurrent requests for the same property cannot
//! both pass the overlap check and both insert. Writes to different
//! properties proceed in parallel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{NaiveDate, Utc};

use crate::availability;
use crate::booking::{Booking, BookingAction, BookingSource, BookingStatus};
use crate::error::{SyncError, SyncResult};

type Slot = Arc<Mutex<Vec<Booking>>>;

/// Fields for a new booking; id and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub property_id: u64,
    pub customer_id: u64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    pub status: BookingStatus,
    pub source: BookingSource,
}

/// Full-field overwrite of a booking's reconciled attributes. The booking
/// keeps its id, status, guests and timestamps.
#[derive(Debug, Clone)]
pub struct BookingUpdate {
    pub property_id: u64,
    pub customer_id: u64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub source: BookingSource,
}

#[derive(Default)]
pub struct BookingStore {
    next_id: AtomicU64,
    slots: RwLock<HashMap<u64, Slot>>,
    property_of: RwLock<HashMap<u64, u64>>,
}

impl BookingStore {
    pub fn new() -> Self {
        BookingStore {
            next_id: AtomicU64::new(1),
            slots: RwLock::new(HashMap::new()),
            property_of: RwLock::new(HashMap::new()),
        }
    }

    fn slot(&self, property_id: u64) -> Slot {
        if let Some(slot) = read(&self.slots).get(&property_id) {
            return Arc::clone(slot);
        }
        Arc::clone(write(&self.slots).entry(property_id).or_default())
    }

    /// Create a booking, validating the date range and the no-overlap
    /// invariant under the property's lock.
    pub fn create(&self, new: NewBooking) -> SyncResult<Booking> {
        let slot = self.slot(new.property_id);
        let mut bookings = lock(&slot);
        availability::validate(
            &bookings,
            new.property_id,
            new.check_in,
            new.check_out,
            None,
        )?;

        let now = Utc::now();
        let booking = Booking {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            property_id: new.property_id,
            customer_id: new.customer_id,
            check_in: new.check_in,
            check_out: new.check_out,
            guests: new.guests,
            status: new.status,
            source: new.source,
            created_at: now,
            updated_at: now,
        };
        bookings.push(booking.clone());
        write(&self.property_of).insert(booking.id, booking.property_id);
        Ok(booking)
    }

    /// Overwrite a booking's reconciled fields in place, re-validating the
    /// dates. Handles the booking moving to a different property.
    pub fn update(&self, id: u64, update: BookingUpdate) -> SyncResult<Booking> {
        let old_property = self.property_of(id)?;

        if old_property == update.property_id {
            let slot = self.slot(old_property);
            let mut bookings = lock(&slot);
            availability::validate(
                &bookings,
                update.property_id,
                update.check_in,
                update.check_out,
                Some(id),
            )?;
            let booking = bookings
                .iter_mut()
                .find(|b| b.id == id)
                .ok_or(SyncError::BookingNotFound(id))?;
            apply_update(booking, &update);
            return Ok(booking.clone());
        }

        // Property changed: take both slots in property-id order so two
        // concurrent cross-property moves cannot deadlock.
        let old_slot = self.slot(old_property);
        let new_slot = self.slot(update.property_id);
        let (mut old_bookings, mut new_bookings) = if old_property < update.property_id {
            let old = lock(&old_slot);
            (old, lock(&new_slot))
        } else {
            let new = lock(&new_slot);
            (lock(&old_slot), new)
        };

        availability::validate(
            &new_bookings,
            update.property_id,
            update.check_in,
            update.check_out,
            None,
        )?;
        let pos = old_bookings
            .iter()
            .position(|b| b.id == id)
            .ok_or(SyncError::BookingNotFound(id))?;
        let mut booking = old_bookings.remove(pos);
        apply_update(&mut booking, &update);
        new_bookings.push(booking.clone());
        write(&self.property_of).insert(id, update.property_id);
        Ok(booking)
    }

    /// Move a booking through its lifecycle via the transition table.
    pub fn apply_action(&self, id: u64, action: BookingAction) -> SyncResult<Booking> {
        let property_id = self.property_of(id)?;
        let slot = self.slot(property_id);
        let mut bookings = lock(&slot);
        let booking = bookings
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(SyncError::BookingNotFound(id))?;
        booking.status = booking.status.apply(action)?;
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }

    pub fn get(&self, id: u64) -> Option<Booking> {
        let property_id = read(&self.property_of).get(&id).copied()?;
        let slot = self.slot(property_id);
        let bookings = lock(&slot);
        bookings.iter().find(|b| b.id == id).cloned()
    }

    pub fn list_for_property(&self, property_id: u64) -> Vec<Booking> {
        let slot = self.slot(property_id);
        let mut bookings = lock(&slot).clone();
        bookings.sort_by_key(|b| b.check_in);
        bookings
    }

    pub fn has_conflict(
        &self,
        property_id: u64,
        check_in: NaiveDate,
        check_out: NaiveDate,
        exclude: Option<u64>,
    ) -> bool {
        let slot = self.slot(property_id);
        let bookings = lock(&slot);
        availability::has_conflict(&bookings, check_in, check_out, exclude)
    }

    pub fn find_next_available(
        &self,
        property_id: u64,
        desired_start: NaiveDate,
        nights: u64,
    ) -> SyncResult<(NaiveDate, NaiveDate)> {
        let slot = self.slot(property_id);
        let bookings = lock(&slot);
        availability::find_next_available(&bookings, desired_start, nights)
    }

    fn property_of(&self, id: u64) -> SyncResult<u64> {
        read(&self.property_of)
            .get(&id)
            .copied()
            .ok_or(SyncError::BookingNotFound(id))
    }
}

fn apply_update(booking: &mut Booking, update: &BookingUpdate) {
    booking.property_id = update.property_id;
    booking.customer_id = update.customer_id;
    booking.check_in = update.check_in;
    booking.check_out = update.check_out;
    booking.source = update.source;
    booking.updated_at = Utc::now();
}

fn lock(slot: &Slot) -> MutexGuard<'_, Vec<Booking>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
