//! Availability computation over a service's status history.

use crate::{Status, StatusEvent};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::{error::Error, fmt::Display};

/// Availability figures for one service over one time window. Durations are
/// in seconds.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SlaReport {
    pub total_time: f64,
    pub total_downtime: f64,
    pub sla_percentage: f64,
}

/// The requested window has non-positive length (`end <= start`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidWindowError;

impl Display for InvalidWindowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Window end must be after window start")
    }
}

impl Error for InvalidWindowError {}

/// Computes total downtime and availability percentage over `[start, end]`.
///
/// `events` must already be filtered to the window and sorted ascending by
/// timestamp (ties by insertion order), as `events_in_range` returns them.
/// The service is assumed `Working` at window start until the first event
/// says otherwise; an event exactly at `start` overrides that default.
/// Only `NotWorking` intervals count as downtime: `Unstable` is a degraded
/// but available state, by policy.
pub fn compute_sla(
    events: &[StatusEvent],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<SlaReport, InvalidWindowError> {
    if end <= start {
        return Err(InvalidWindowError);
    }

    let total_time = seconds(end - start);
    let mut downtime = 0.0;
    let mut last_status = Status::Working;
    let mut last_time = start;

    for event in events {
        if last_status == Status::NotWorking {
            downtime += seconds(event.time - last_time);
        }
        last_status = event.status;
        last_time = event.time;
    }
    // The final status holds until the window closes.
    if last_status == Status::NotWorking {
        downtime += seconds(end - last_time);
    }

    let sla_percentage = round3((total_time - downtime) / total_time * 100.0);
    Ok(SlaReport {
        total_time,
        total_downtime: downtime,
        sla_percentage,
    })
}

fn seconds(delta: TimeDelta) -> f64 {
    delta.num_milliseconds() as f64 / 1000.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
