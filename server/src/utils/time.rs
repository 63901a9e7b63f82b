//! Time utility functions
//!
//! Calendar boundaries used by relative-date filters. All boundaries are
//! computed in UTC and weeks start on Monday.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};

/// Parse a filter operand into a UTC timestamp
///
/// Accepts RFC 3339 (`2024-01-15T10:30:00+05:00`), naive date-times
/// (`2024-01-15T10:30:00`, `2024-01-15 10:30:00`, taken as UTC) and plain
/// dates (`2024-01-15`, taken as midnight UTC).
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

/// Format a timestamp the way it is stored in text columns
///
/// Second precision with a `Z` suffix, so bound values compare as text
/// against stored ones.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Midnight of the day containing `dt`
pub fn start_of_day(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Midnight of the Monday of the week containing `dt`
pub fn start_of_week(dt: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(dt) - TimeDelta::days(i64::from(dt.weekday().num_days_from_monday()))
}

/// Midnight of the first day of the month containing `dt`
pub fn start_of_month(dt: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(dt) - TimeDelta::days(i64::from(dt.day0()))
}

/// Midnight of January 1st of the year containing `dt`
pub fn start_of_year(dt: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(dt) - TimeDelta::days(i64::from(dt.ordinal0()))
}

/// Shift by whole calendar months (negative moves backwards)
pub fn shift_months(dt: DateTime<Utc>, months: i32) -> Option<DateTime<Utc>> {
    let delta = Months::new(months.unsigned_abs());
    if months >= 0 {
        dt.checked_add_months(delta)
    } else {
        dt.checked_sub_months(delta)
    }
}

/// `dt` minus a number of days, `None` when out of range
pub fn days_before(dt: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_days(days).and_then(|delta| dt.checked_sub_signed(delta))
}

/// `dt` plus a number of days, `None` when out of range
pub fn days_after(dt: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_days(days).and_then(|delta| dt.checked_add_signed(delta))
}
