pub mod sla;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The operational status of a `Service`.
///
/// `Unstable` is degraded but still counts as up for availability purposes;
/// only `NotWorking` accrues downtime.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Working,
    NotWorking,
    Unstable,
}

/// A recorded status transition. Immutable once appended.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEvent {
    pub status: Status,
    pub time: DateTime<Utc>,
}

/// A service whose status history is being tracked.
///
/// Events are kept in insertion order; all ordering is by timestamp with
/// insertion order breaking ties. The history is a step function over
/// status: the status in effect at any instant is that of the latest event
/// at or before it, or `Working` when no such event exists.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Service {
    pub description: String,
    pub events: Vec<StatusEvent>,
}

impl Service {
    #[must_use]
    pub fn new(description: String) -> Self {
        Self {
            description,
            events: Vec::new(),
        }
    }

    /// The most recent event, preferring the later-inserted of events with
    /// equal timestamps.
    #[must_use]
    pub fn latest_event(&self) -> Option<StatusEvent> {
        let mut latest: Option<StatusEvent> = None;
        for event in &self.events {
            if latest.map_or(true, |l| event.time >= l.time) {
                latest = Some(*event);
            }
        }
        latest
    }

    /// The status in effect now. A service with no recorded events is
    /// assumed `Working`.
    #[must_use]
    pub fn current_status(&self) -> Status {
        self.latest_event().map_or(Status::Working, |e| e.status)
    }

    /// Events with timestamps in `[start, end]`, ascending by timestamp,
    /// ties by insertion order.
    #[must_use]
    pub fn events_in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<StatusEvent> {
        let mut events: Vec<StatusEvent> = self
            .events
            .iter()
            .copied()
            .filter(|e| e.time >= start && e.time <= end)
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        events.sort_by_key(|e| e.time);
        events
    }
}

/// A service together with its resolved current status, as exposed by the
/// listing and registration endpoints.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServiceSummary {
    pub name: String,
    pub description: String,
    pub current_status: Status,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn event(status: Status, secs: i64) -> StatusEvent {
        StatusEvent {
            status,
            time: at(secs),
        }
    }

    #[test]
    fn no_events_resolves_to_working() {
        let service = Service::new("db".to_string());
        assert_eq!(service.current_status(), Status::Working);
        assert!(service.latest_event().is_none());
    }

    #[test]
    fn current_status_is_latest_by_timestamp() {
        let mut service = Service::new("db".to_string());
        service.events.push(event(Status::NotWorking, 100));
        service.events.push(event(Status::Working, 50));
        assert_eq!(service.current_status(), Status::NotWorking);
    }

    #[test]
    fn equal_timestamps_resolve_to_last_inserted() {
        let mut service = Service::new("db".to_string());
        service.events.push(event(Status::NotWorking, 100));
        service.events.push(event(Status::Unstable, 100));
        assert_eq!(service.current_status(), Status::Unstable);
    }

    #[test]
    fn range_is_inclusive_and_sorted() {
        let mut service = Service::new("db".to_string());
        service.events.push(event(Status::Working, 300));
        service.events.push(event(Status::NotWorking, 0));
        service.events.push(event(Status::Unstable, 600));
        service.events.push(event(Status::Working, -10));

        let events = service.events_in_range(at(0), at(600));
        assert_eq!(
            events,
            vec![
                event(Status::NotWorking, 0),
                event(Status::Working, 300),
                event(Status::Unstable, 600),
            ]
        );
    }

    #[test]
    fn range_keeps_insertion_order_on_ties() {
        let mut service = Service::new("db".to_string());
        service.events.push(event(Status::NotWorking, 100));
        service.events.push(event(Status::Working, 100));
        let events = service.events_in_range(at(0), at(200));
        assert_eq!(events[0].status, Status::NotWorking);
        assert_eq!(events[1].status, Status::Working);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Status::NotWorking).unwrap(),
            "\"not_working\""
        );
        assert_eq!(
            serde_json::from_str::<Status>("\"unstable\"").unwrap(),
            Status::Unstable
        );
    }
}
