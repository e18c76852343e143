//! iCalendar feed parsing for one-way channel imports.
//!
//! Only the fields the reconciler consumes: UID, DTSTART, DTEND, STATUS and
//! attendee/organizer addresses. Malformed components are skipped, never
//! aborting the rest of the feed.

use icalendar::{
    DatePerhapsTime,
    parser::{read_calendar, unfold},
};
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::event::{CalendarProvider, EventDate, EventUid, ExternalEvent, ExternalEventStatus};

/// Parse a full feed into reconciler inputs.
pub fn parse_feed(content: &str) -> SyncResult<Vec<ExternalEvent>> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| SyncError::Feed(e.to_string()))?;

    let mut events = Vec::new();
    for component in &calendar.components {
        if component.name != "VEVENT" {
            continue;
        }
        match parse_vevent(component) {
            Some(event) => events.push(event),
            None => debug!("skipping feed component without usable UID/dates"),
        }
    }
    Ok(events)
}

fn parse_vevent(vevent: &icalendar::parser::Component<'_>) -> Option<ExternalEvent> {
    let uid = vevent.find_prop("UID")?.val.to_string();
    let start = to_event_date(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?);
    let end = to_event_date(DatePerhapsTime::try_from(vevent.find_prop("DTEND")?).ok()?);

    let status = vevent
        .find_prop("STATUS")
        .map(|p| match p.val.as_ref() {
            "TENTATIVE" => ExternalEventStatus::Tentative,
            "CANCELLED" => ExternalEventStatus::Cancelled,
            _ => ExternalEventStatus::Confirmed,
        })
        .unwrap_or(ExternalEventStatus::Confirmed);

    let attendee_emails: Vec<String> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "ATTENDEE")
        .map(|p| strip_mailto(p.val.as_ref()))
        .collect();

    let organizer_email = vevent
        .find_prop("ORGANIZER")
        .map(|p| strip_mailto(p.val.as_ref()));

    Some(ExternalEvent {
        uid: EventUid::new(CalendarProvider::Ical, &uid),
        provider: CalendarProvider::Ical,
        status,
        start: Some(start),
        end: Some(end),
        attendee_emails,
        creator_email: None,
        organizer_email,
    })
}

/// All-day DATE values stay dates; DATE-TIME values keep their instant here
/// and drop time-of-day later when normalized to a stay date.
fn to_event_date(dpt: DatePerhapsTime) -> EventDate {
    match dpt {
        DatePerhapsTime::Date(d) => EventDate::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            icalendar::CalendarDateTime::Utc(dt) => EventDate::DateTime(dt),
            icalendar::CalendarDateTime::Floating(naive) => EventDate::DateTime(naive.and_utc()),
            icalendar::CalendarDateTime::WithTimezone { date_time, .. } => {
                EventDate::DateTime(date_time.and_utc())
            }
        },
    }
}

fn strip_mailto(value: &str) -> String {
    value.strip_prefix("mailto:").unwrap_or(value).to_string()
}
