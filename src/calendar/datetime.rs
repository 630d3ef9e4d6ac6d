//! Permissive date/time parsing and timezone handling.
//!
//! All arithmetic downstream happens on `DateTime<Tz>` values in a
//! single caller-specified timezone. Naive values coming in from the
//! model are localized here and never subtracted from aware ones.

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;

use super::error::CalendarError;

/// Formats that carry an explicit UTC offset.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M%z",
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M %z",
];

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %I:%M %p",
    "%Y-%m-%d %I:%M%p",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%d-%m-%Y %H:%M",
    "%d.%m.%Y %H:%M",
    "%B %d, %Y %H:%M",
    "%B %d %Y %H:%M",
    "%B %d, %Y %I:%M %p",
    "%B %d %Y %I:%M %p",
    "%b %d, %Y %H:%M",
    "%b %d %Y %H:%M",
    "%b %d, %Y %I:%M %p",
    "%d %B %Y %H:%M",
    "%d %b %Y %H:%M",
    "%d %B %Y %I:%M %p",
    "%A, %B %d, %Y %H:%M",
    "%A %B %d %Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
];

const TIME_FORMATS: &[&str] = &[
    "%H:%M:%S",
    "%H:%M",
    "%I:%M:%S %p",
    "%I:%M:%S%p",
    "%I:%M %p",
    "%I:%M%p",
];

/// Result of parsing a free-form date/time string. The caller decides
/// which timezone to attach to a `Naive` value and which day a bare
/// `Time` falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedDateTime {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
    Time(NaiveTime),
}

/// Parse a date/time the way a person or a model might write it.
/// Date-only input resolves to midnight. Time-only input such as
/// "15:00" or "3pm" is kept as a bare time of day.
pub fn parse_datetime(input: &str) -> Result<ParsedDateTime, CalendarError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(CalendarError::validation("empty date/time"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(ParsedDateTime::Aware(dt));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Ok(ParsedDateTime::Aware(dt));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(ParsedDateTime::Aware(dt));
        }
    }

    // A trailing "Z" on an otherwise naive value means UTC
    if let Some(stripped) = s.strip_suffix('Z').or_else(|| s.strip_suffix('z'))
        && let Some(naive) = parse_naive(stripped)
    {
        return Ok(ParsedDateTime::Aware(naive.and_utc().fixed_offset()));
    }

    if let Some(naive) = parse_naive(s) {
        return Ok(ParsedDateTime::Naive(naive));
    }
    parse_time(s)
        .map(ParsedDateTime::Time)
        .ok_or_else(|| CalendarError::validation(format!("could not parse date/time '{}'", s)))
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Some(date) = parse_date(s) {
        return Some(date.and_time(NaiveTime::MIN));
    }

    // "Oct 6 2025 10am", "2025-10-06 3 PM": a date followed by a time,
    // split at the rightmost whitespace that leaves a valid time
    s.char_indices()
        .filter(|(_, c)| c.is_whitespace())
        .rev()
        .find_map(|(i, _)| {
            let time = parse_time(&s[i..])?;
            let date = parse_date(s[..i].trim_end_matches([',', ' ']))?;
            Some(date.and_time(time))
        })
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    if let Some(time) = TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
    {
        return Some(time);
    }
    parse_hour_with_meridiem(s)
}

/// "3pm", "3 PM", "12am". chrono needs a minute, so the hour is read
/// by hand.
fn parse_hour_with_meridiem(s: &str) -> Option<NaiveTime> {
    let lower = s.to_ascii_lowercase();
    let (hour, pm) = if let Some(h) = lower.strip_suffix("pm") {
        (h, true)
    } else if let Some(h) = lower.strip_suffix("am") {
        (h, false)
    } else {
        return None;
    };
    let hour: u32 = hour.trim().parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    NaiveTime::from_hms_opt(hour, 0, 0)
}

pub fn parse_timezone(name: &str) -> Result<Tz, CalendarError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| CalendarError::validation(format!("unknown timezone '{}'", name)))
}

/// Attach `tz` to a naive value or convert an aware one into `tz`. A
/// bare time of day falls on today in `tz`.
pub fn localize(parsed: ParsedDateTime, tz: Tz) -> Result<DateTime<Tz>, CalendarError> {
    localize_at(parsed, &Utc::now().with_timezone(&tz))
}

/// Same as `localize` with an explicit notion of now, whose timezone
/// is the target.
pub fn localize_at(parsed: ParsedDateTime, now: &DateTime<Tz>) -> Result<DateTime<Tz>, CalendarError> {
    let tz = now.timezone();
    match parsed {
        ParsedDateTime::Aware(dt) => Ok(dt.with_timezone(&tz)),
        ParsedDateTime::Naive(naive) => localize_naive(naive, tz),
        ParsedDateTime::Time(time) => localize_naive(now.date_naive().and_time(time), tz),
    }
}

/// Ambiguous local times (DST fall-back) resolve to the earlier
/// instant. Local times skipped by a DST jump are rejected.
pub fn localize_naive(naive: NaiveDateTime, tz: Tz) -> Result<DateTime<Tz>, CalendarError> {
    tz.from_local_datetime(&naive).earliest().ok_or_else(|| {
        CalendarError::validation(format!("{} does not exist in timezone {}", naive, tz.name()))
    })
}

/// Midnight at the start of `date` in `tz`.
pub fn start_of_day(date: NaiveDate, tz: Tz) -> Result<DateTime<Tz>, CalendarError> {
    localize_naive(date.and_time(NaiveTime::MIN), tz)
}

/// 23:59:59 local time on the same calendar day as `now`.
pub fn end_of_day(now: &DateTime<Tz>) -> Result<DateTime<Tz>, CalendarError> {
    let last_second = NaiveTime::from_hms_opt(23, 59, 59)
        .ok_or_else(|| CalendarError::validation("invalid end of day"))?;
    let tz = now.timezone();
    localize_naive(now.date_naive().and_time(last_second), tz)
}
