//! Google wire types to provider-neutral events.

use rentsync_core::{CalendarProvider, EventDate, EventUid, ExternalEvent, ExternalEventStatus};

use crate::types::{GoogleEvent, GoogleEventTime};

pub fn to_external_event(event: &GoogleEvent) -> ExternalEvent {
    let raw_uid = event.ical_uid.as_deref().unwrap_or(&event.id);

    let status = match event.status.as_deref() {
        Some("cancelled") => ExternalEventStatus::Cancelled,
        Some("tentative") => ExternalEventStatus::Tentative,
        _ => ExternalEventStatus::Confirmed,
    };

    ExternalEvent {
        uid: EventUid::new(CalendarProvider::Google, raw_uid),
        provider: CalendarProvider::Google,
        status,
        start: event.start.as_ref().and_then(to_event_date),
        end: event.end.as_ref().and_then(to_event_date),
        attendee_emails: event
            .attendees
            .iter()
            .filter_map(|a| a.email.clone())
            .collect(),
        creator_email: event.creator.as_ref().and_then(|p| p.email.clone()),
        organizer_email: event.organizer.as_ref().and_then(|p| p.email.clone()),
    }
}

fn to_event_date(time: &GoogleEventTime) -> Option<EventDate> {
    match (time.date, time.date_time) {
        (Some(date), _) => Some(EventDate::Date(date)),
        (None, Some(date_time)) => Some(EventDate::DateTime(date_time)),
        (None, None) => None,
    }
}
