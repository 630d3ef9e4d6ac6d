//! Free slot search over a single day.

use chrono::{DateTime, Duration};
use chrono_tz::Tz;

use super::datetime::start_of_day;
use crate::google::gcal::{Event, EventDateTime};

/// Time occupied by an existing event, in the caller's timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyInterval {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSlot {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

fn boundary(when: &EventDateTime, tz: Tz) -> Option<DateTime<Tz>> {
    if let Some(dt) = &when.date_time {
        return Some(dt.with_timezone(&tz));
    }
    // All-day events are pinned to local midnight so that nothing
    // naive leaks into the arithmetic
    when.date.and_then(|date| start_of_day(date, tz).ok())
}

/// Convert an event into a busy interval in `tz`. Events without a
/// usable start or end are skipped.
pub fn busy_interval(event: &Event, tz: Tz) -> Option<BusyInterval> {
    let start = boundary(&event.start, tz);
    let end = boundary(&event.end, tz);
    match (start, end) {
        (Some(start), Some(end)) => Some(BusyInterval { start, end }),
        _ => {
            tracing::warn!("Skipping event {} with no usable start or end", event.id);
            None
        }
    }
}

/// Scan `busy` for gaps of at least `min_duration` between `now` and
/// `end_of_day`.
///
/// The cursor only ever moves forward, so overlapping or unordered
/// intervals can't produce negative or duplicate slots. Returned slots
/// are ordered and never overlap.
pub fn find_free_slots(
    busy: &[BusyInterval],
    now: DateTime<Tz>,
    end_of_day: DateTime<Tz>,
    min_duration: Duration,
) -> Vec<FreeSlot> {
    let mut intervals = busy.to_vec();
    intervals.sort_by_key(|interval| interval.start);

    let mut slots = Vec::new();
    let mut current = now;

    for interval in intervals {
        if current >= end_of_day {
            break;
        }
        let start = interval.start.min(end_of_day);
        if start > current && start - current >= min_duration {
            slots.push(FreeSlot {
                start: current,
                end: start,
            });
        }
        // Taking `start` too keeps an inverted interval from pulling
        // the cursor back behind a slot that was just emitted
        current = current.max(start).max(interval.end);
    }

    if end_of_day > current && end_of_day - current >= min_duration {
        slots.push(FreeSlot {
            start: current,
            end: end_of_day,
        });
    }

    slots
}
