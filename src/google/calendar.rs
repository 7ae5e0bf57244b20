use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{FetchError, GoogleApiClient};

/// Maximum number of events returned by a listing.
pub const CALENDAR_MAX_RESULTS: usize = 5;

/// Length of the look-ahead window starting at "now".
pub const CALENDAR_WINDOW_HOURS: i64 = 24;

/// Upper bound on pages followed while looking for upcoming events.
const CALENDAR_MAX_PAGES: usize = 10;

/// Start or end of an event: `dateTime` for timed events, `date` for all-day ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    /// The instant this time denotes. All-day dates resolve to UTC midnight.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        if let Some(dt) = &self.date_time {
            return DateTime::parse_from_rfc3339(dt)
                .ok()
                .map(|dt| dt.with_timezone(&Utc));
        }
        let date = NaiveDate::parse_from_str(self.date.as_deref()?, "%Y-%m-%d").ok()?;
        Some(date.and_hms_opt(0, 0, 0)?.and_utc())
    }
}

/// A calendar event in Google's own JSON shape. Fields the relay does not
/// look at are passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: EventTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventList {
    #[serde(default)]
    items: Vec<CalendarEvent>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl GoogleApiClient {
    /// Up to five single-instance events on the primary calendar starting
    /// within the next 24 hours, earliest first.
    ///
    /// Events already in progress fill the first pages and are dropped, so
    /// pages are followed until five upcoming events have been seen.
    pub async fn list_upcoming_events(
        &self,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, FetchError> {
        let time_max = now + Duration::hours(CALENDAR_WINDOW_HOURS);
        let time_min_str = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let time_max_str = time_max.to_rfc3339_opts(SecondsFormat::Millis, true);
        let max_results = CALENDAR_MAX_RESULTS.to_string();

        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..CALENDAR_MAX_PAGES {
            let mut query = vec![
                ("timeMin", time_min_str.as_str()),
                ("timeMax", time_max_str.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
                ("maxResults", max_results.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let page: EventList = self
                .get_json("/calendar/v3/calendars/primary/events", access_token, &query)
                .await?;
            items.extend(page.items);

            let upcoming = items
                .iter()
                .filter(|event| starts_within(event, now, time_max))
                .count();
            match page.next_page_token {
                Some(token) if upcoming < CALENDAR_MAX_RESULTS => page_token = Some(token),
                _ => break,
            }
        }

        let events = within_window(items, now, time_max);
        debug!("fetched {} calendar events", events.len());
        Ok(events)
    }
}

fn starts_within(event: &CalendarEvent, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    event
        .start
        .instant()
        .is_some_and(|start| start >= from && start < to)
}

/// Google's `timeMin` bounds the event *end*, so events already in progress
/// come back too. Keep only those starting in `[from, to)`, capped and sorted.
fn within_window(
    events: Vec<CalendarEvent>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<CalendarEvent> {
    let mut kept: Vec<(DateTime<Utc>, CalendarEvent)> = events
        .into_iter()
        .filter_map(|event| {
            let start = event.start.instant()?;
            (start >= from && start < to).then_some((start, event))
        })
        .collect();

    // Stable, so Google's order wins for events starting at the same instant.
    kept.sort_by_key(|(start, _)| *start);
    kept.truncate(CALENDAR_MAX_RESULTS);
    kept.into_iter().map(|(_, event)| event).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn timed(id: &str, start: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.into(),
            summary: Some(format!("event {id}")),
            start: EventTime {
                date_time: Some(start.into()),
                ..Default::default()
            },
            end: EventTime::default(),
            html_link: None,
            extra: Default::default(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn instant_handles_offsets_and_all_day_dates() {
        let t = EventTime {
            date_time: Some("2026-03-10T14:30:00+02:00".into()),
            ..Default::default()
        };
        assert_eq!(t.instant(), Some(Utc.with_ymd_and_hms(2026, 3, 10, 12, 30, 0).unwrap()));

        let d = EventTime {
            date: Some("2026-03-11".into()),
            ..Default::default()
        };
        assert_eq!(d.instant(), Some(Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 0).unwrap()));

        assert_eq!(EventTime::default().instant(), None);
    }

    #[test]
    fn window_is_half_open() {
        let now = now();
        let end = now + Duration::hours(24);
        let events = vec![
            timed("at-start", "2026-03-10T12:00:00Z"),
            timed("at-end", "2026-03-11T12:00:00Z"),
            timed("before", "2026-03-10T11:59:59Z"),
            timed("inside", "2026-03-11T11:59:59Z"),
        ];
        let ids: Vec<_> = within_window(events, now, end).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["at-start", "inside"]);
    }

    #[test]
    fn window_caps_and_orders_by_start() {
        let now = now();
        let end = now + Duration::hours(24);
        let events: Vec<_> = (0..8)
            .rev()
            .map(|h| timed(&format!("e{h}"), &format!("2026-03-10T{:02}:00:00Z", 13 + h)))
            .collect();
        let ids: Vec<_> = within_window(events, now, end).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["e0", "e1", "e2", "e3", "e4"]);
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let raw = r#"{"id":"x","summary":"Standup","start":{"dateTime":"2026-03-10T13:00:00Z"},"end":{"dateTime":"2026-03-10T13:15:00Z"},"htmlLink":"https://calendar.google.com/x","location":"Room 4"}"#;
        let event: CalendarEvent = serde_json::from_str(raw).unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["location"], "Room 4");
        assert_eq!(json["start"]["dateTime"], "2026-03-10T13:00:00Z");
        assert_eq!(json["htmlLink"], "https://calendar.google.com/x");
    }
}
