//! Event reconciliation: external calendar events to booking upserts.
//!
//! The durable join key is the provider-qualified event UID, held in the
//! link store. Replaying the same batch any number of times converges to the
//! same bookings because the update path is a full-field overwrite keyed by
//! UID, never an increment.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::booking::{BookingAction, BookingSource, BookingStatus};
use crate::error::SyncError;
use crate::event::{CalendarProvider, EventUid, ExternalEvent, ExternalEventStatus};
use crate::property::Property;
use crate::store::{BookingStore, BookingUpdate, CustomerStore, NewBooking, PropertyStore};

/// The link row tying one external event to one booking.
///
/// A weak back-reference: it provides lookup from external identity to the
/// booking, never authoritative booking fields.
#[derive(Debug, Clone)]
pub struct CalendarEventLink {
    pub external_uid: String,
    pub calendar_id: String,
    pub provider: CalendarProvider,
    pub booking_id: u64,
}

#[derive(Default)]
pub struct EventLinkStore {
    inner: RwLock<HashMap<String, CalendarEventLink>>,
}

impl EventLinkStore {
    pub fn new() -> Self {
        EventLinkStore {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, uid: &EventUid) -> Option<CalendarEventLink> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uid.as_str())
            .cloned()
    }

    pub fn insert(&self, link: CalendarEventLink) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(link.external_uid.clone(), link);
    }

    pub fn remove(&self, uid: &EventUid) -> Option<CalendarEventLink> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uid.as_str())
    }
}

/// Counters from one reconciliation batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub created: usize,
    pub updated: usize,
    pub cancelled: usize,
    pub skipped: usize,
}

impl ReconcileOutcome {
    pub fn add(&mut self, other: &ReconcileOutcome) {
        self.created += other.created;
        self.updated += other.updated;
        self.cancelled += other.cancelled;
        self.skipped += other.skipped;
    }
}

/// Turns batches of external events into booking mutations, guaranteeing
/// at most one booking per external UID.
pub struct Reconciler {
    bookings: Arc<BookingStore>,
    properties: Arc<PropertyStore>,
    customers: Arc<CustomerStore>,
    links: Arc<EventLinkStore>,
}

impl Reconciler {
    pub fn new(
        bookings: Arc<BookingStore>,
        properties: Arc<PropertyStore>,
        customers: Arc<CustomerStore>,
        links: Arc<EventLinkStore>,
    ) -> Self {
        Reconciler {
            bookings,
            properties,
            customers,
            links,
        }
    }

    /// Reconcile a batch against the property registered for `calendar_id`.
    /// If no property is mapped, the whole batch is skipped so no orphan
    /// bookings are created.
    pub fn reconcile(&self, calendar_id: &str, events: &[ExternalEvent]) -> ReconcileOutcome {
        let Some(property) = self.properties.find_by_calendar_id(calendar_id) else {
            warn!(calendar_id, "no property mapped to calendar, skipping batch");
            return ReconcileOutcome::default();
        };
        self.reconcile_into(&property, events)
    }

    /// Reconcile a batch directly into a known property (feed imports target
    /// the property, not a calendar mapping).
    pub fn reconcile_into(&self, property: &Property, events: &[ExternalEvent]) -> ReconcileOutcome {
        let calendar_id = property
            .calendar_id
            .clone()
            .unwrap_or_else(|| format!("ical:{}", property.id));

        let mut outcome = ReconcileOutcome::default();
        for event in events {
            self.reconcile_event(property, &calendar_id, event, &mut outcome);
        }
        outcome
    }

    fn reconcile_event(
        &self,
        property: &Property,
        calendar_id: &str,
        event: &ExternalEvent,
        outcome: &mut ReconcileOutcome,
    ) {
        if event.status == ExternalEventStatus::Cancelled {
            self.cancel_event(event, outcome);
            return;
        }

        let Some((check_in, check_out)) = event.stay_dates() else {
            debug!(uid = %event.uid, "event has no resolvable dates, skipping");
            outcome.skipped += 1;
            return;
        };

        let source = event.provider.booking_source();
        let customer = match event.guest_email() {
            Some(email) => self.customers.get_or_create_from_email(email),
            None => {
                let (email, first, last) = placeholder_guest(source);
                self.customers.get_or_create(email, first, last)
            }
        };

        match self.links.get(&event.uid) {
            Some(link) => {
                let update = BookingUpdate {
                    property_id: property.id,
                    customer_id: customer.id,
                    check_in,
                    check_out,
                    source,
                };
                match self.bookings.update(link.booking_id, update) {
                    Ok(_) => outcome.updated += 1,
                    Err(err) => self.skip_conflict(event, err, outcome),
                }
            }
            None => {
                let new = NewBooking {
                    property_id: property.id,
                    customer_id: customer.id,
                    check_in,
                    check_out,
                    guests: 1,
                    status: BookingStatus::Confirmed,
                    source,
                };
                match self.bookings.create(new) {
                    Ok(booking) => {
                        self.links.insert(CalendarEventLink {
                            external_uid: event.uid.as_str().to_string(),
                            calendar_id: calendar_id.to_string(),
                            provider: event.provider,
                            booking_id: booking.id,
                        });
                        outcome.created += 1;
                    }
                    Err(err) => self.skip_conflict(event, err, outcome),
                }
            }
        }
    }

    /// A cancelled external event removes its link and cascade-cancels the
    /// linked booking. Replaying the cancellation finds no link and is a
    /// no-op.
    fn cancel_event(&self, event: &ExternalEvent, outcome: &mut ReconcileOutcome) {
        let Some(link) = self.links.remove(&event.uid) else {
            debug!(uid = %event.uid, "cancellation for unknown event, ignoring");
            return;
        };
        match self.bookings.apply_action(link.booking_id, BookingAction::Cancel) {
            Ok(_) => outcome.cancelled += 1,
            Err(SyncError::InvalidTransition { .. }) => {
                // Already cancelled or checked out; the link removal stands.
                debug!(booking_id = link.booking_id, "booking not cancellable");
            }
            Err(err) => {
                warn!(booking_id = link.booking_id, %err, "cascade cancel failed");
            }
        }
    }

    /// External events that fail validation are a data-quality condition,
    /// not a hard failure: log, count, keep going.
    fn skip_conflict(&self, event: &ExternalEvent, err: SyncError, outcome: &mut ReconcileOutcome) {
        warn!(uid = %event.uid, %err, "skipping conflicting external event");
        outcome.skipped += 1;
    }
}

fn placeholder_guest(source: BookingSource) -> (&'static str, &'static str, &'static str) {
    match source {
        BookingSource::Ical => ("ical-guest@example.invalid", "iCal", "Guest"),
        _ => ("calendar-guest@example.invalid", "Calendar", "Guest"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventDate;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(uid: &str, check_in: NaiveDate, check_out: NaiveDate) -> ExternalEvent {
        ExternalEvent {
            uid: EventUid::new(CalendarProvider::Google, uid),
            provider: CalendarProvider::Google,
            status: ExternalEventStatus::Confirmed,
            start: Some(EventDate::Date(check_in)),
            end: Some(EventDate::Date(check_out)),
            attendee_emails: vec![],
            creator_email: None,
            organizer_email: None,
        }
    }

    fn setup() -> (Reconciler, Arc<BookingStore>, Arc<PropertyStore>, Arc<EventLinkStore>) {
        let bookings = Arc::new(BookingStore::new());
        let properties = Arc::new(PropertyStore::new());
        let customers = Arc::new(CustomerStore::new());
        let links = Arc::new(EventLinkStore::new());
        let reconciler = Reconciler::new(
            Arc::clone(&bookings),
            Arc::clone(&properties),
            Arc::clone(&customers),
            Arc::clone(&links),
        );
        (reconciler, bookings, properties, links)
    }

    #[test]
    fn test_unmapped_calendar_skips_whole_batch() {
        let (reconciler, bookings, _properties, _links) = setup();
        let outcome = reconciler.reconcile(
            "cal-unknown",
            &[event("e1", date(2025, 5, 1), date(2025, 5, 4))],
        );
        assert_eq!(outcome, ReconcileOutcome::default());
        assert!(bookings.list_for_property(1).is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let (reconciler, bookings, properties, _links) = setup();
        let property = properties.create("Flat", Some("cal-1".into()));

        let batch = vec![
            event("e1", date(2025, 5, 1), date(2025, 5, 4)),
            event("e2", date(2025, 5, 10), date(2025, 5, 12)),
        ];

        let first = reconciler.reconcile("cal-1", &batch);
        assert_eq!(first.created, 2);

        let snapshot: Vec<_> = bookings
            .list_for_property(property.id)
            .iter()
            .map(|b| (b.id, b.check_in, b.check_out, b.customer_id))
            .collect();

        let second = reconciler.reconcile("cal-1", &batch);
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 2);

        let replayed: Vec<_> = bookings
            .list_for_property(property.id)
            .iter()
            .map(|b| (b.id, b.check_in, b.check_out, b.customer_id))
            .collect();
        assert_eq!(snapshot, replayed);
    }

    #[test]
    fn test_update_rewrites_dates_in_place() {
        let (reconciler, bookings, properties, _links) = setup();
        let property = properties.create("Flat", Some("cal-1".into()));

        reconciler.reconcile("cal-1", &[event("e1", date(2025, 5, 1), date(2025, 5, 4))]);
        let original_id = bookings.list_for_property(property.id)[0].id;

        reconciler.reconcile("cal-1", &[event("e1", date(2025, 5, 2), date(2025, 5, 6))]);
        let after = bookings.list_for_property(property.id);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, original_id);
        assert_eq!(after[0].check_in, date(2025, 5, 2));
        assert_eq!(after[0].check_out, date(2025, 5, 6));
    }

    #[test]
    fn test_cancellation_removes_link_and_cancels_booking() {
        let (reconciler, bookings, properties, links) = setup();
        let property = properties.create("Flat", Some("cal-1".into()));

        reconciler.reconcile("cal-1", &[event("e1", date(2025, 5, 1), date(2025, 5, 4))]);

        let mut cancelled = event("e1", date(2025, 5, 1), date(2025, 5, 4));
        cancelled.status = ExternalEventStatus::Cancelled;

        let outcome = reconciler.reconcile("cal-1", std::slice::from_ref(&cancelled));
        assert_eq!(outcome.cancelled, 1);
        assert!(links.get(&cancelled.uid).is_none());
        assert_eq!(
            bookings.list_for_property(property.id)[0].status,
            BookingStatus::Cancelled
        );

        // Replaying the cancellation is a no-op
        let replay = reconciler.reconcile("cal-1", std::slice::from_ref(&cancelled));
        assert_eq!(replay, ReconcileOutcome::default());
    }

    #[test]
    fn test_conflicting_event_is_skipped_batch_continues() {
        let (reconciler, bookings, properties, _links) = setup();
        let property = properties.create("Flat", Some("cal-1".into()));

        let batch = vec![
            event("e1", date(2025, 5, 1), date(2025, 5, 5)),
            // Overlaps e1, no link yet: data-quality skip
            event("e2", date(2025, 5, 3), date(2025, 5, 7)),
            event("e3", date(2025, 5, 10), date(2025, 5, 12)),
        ];
        let outcome = reconciler.reconcile("cal-1", &batch);
        assert_eq!(outcome.created, 2);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(bookings.list_for_property(property.id).len(), 2);
    }

    #[test]
    fn test_conflicting_update_is_skipped_and_booking_unchanged() {
        let (reconciler, bookings, properties, _links) = setup();
        let property = properties.create("Flat", Some("cal-1".into()));

        reconciler.reconcile(
            "cal-1",
            &[
                event("e1", date(2025, 5, 1), date(2025, 5, 4)),
                event("e2", date(2025, 5, 10), date(2025, 5, 14)),
            ],
        );

        // e1 is linked now; moving it onto e2's dates must not clobber either
        let outcome = reconciler.reconcile("cal-1", &[event("e1", date(2025, 5, 9), date(2025, 5, 12))]);
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.skipped, 1);

        let list = bookings.list_for_property(property.id);
        let moved = list.iter().find(|b| b.check_in == date(2025, 5, 1));
        assert!(moved.is_some_and(|b| b.check_out == date(2025, 5, 4)));
    }

    #[test]
    fn test_event_without_dates_is_skipped() {
        let (reconciler, _bookings, properties, _links) = setup();
        properties.create("Flat", Some("cal-1".into()));

        let mut no_dates = event("e1", date(2025, 5, 1), date(2025, 5, 4));
        no_dates.start = None;
        let outcome = reconciler.reconcile("cal-1", &[no_dates]);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_placeholder_guest_is_created_once() {
        let (reconciler, bookings, properties, _links) = setup();
        let property = properties.create("Flat", Some("cal-1".into()));

        let batch = vec![
            event("e1", date(2025, 5, 1), date(2025, 5, 4)),
            event("e2", date(2025, 5, 10), date(2025, 5, 12)),
        ];
        reconciler.reconcile("cal-1", &batch);
        let list = bookings.list_for_property(property.id);
        assert_eq!(list[0].customer_id, list[1].customer_id);
    }

    #[test]
    fn test_attendee_email_resolves_customer() {
        let (reconciler, bookings, properties, _links) = setup();
        let property = properties.create("Flat", Some("cal-1".into()));

        let mut with_guest = event("e1", date(2025, 5, 1), date(2025, 5, 4));
        with_guest.attendee_emails = vec!["guest@example.com".into()];
        let mut placeholder = event("e2", date(2025, 5, 10), date(2025, 5, 12));
        placeholder.attendee_emails = vec![];

        reconciler.reconcile("cal-1", &[with_guest, placeholder]);
        let list = bookings.list_for_property(property.id);
        assert_ne!(list[0].customer_id, list[1].customer_id);
    }
}
