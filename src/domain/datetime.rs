//! Date and time parsing for hand-maintained feeds
//!
//! Feed authors type dates however they like. Unambiguous machine formats
//! (ISO 8601, RFC 3339/2822, spelled-out month names) are tried first; only
//! when none of them recognise the text is it read as day/month/year.
//! Slash- or dash-separated numeric dates with the year last are never read
//! month-first.

use crate::domain::types::TimeOfDay;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

static DAY_MONTH_YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})[/\-](\d{1,2})[/\-](\d{4})$").expect("valid day/month/year regex")
});
static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})(?::(\d{2}))?\s*(am|pm)?$").expect("valid time regex")
});

/// `%Y` happily reads "7" as year 7; short years are not guessed
const MIN_MACHINE_YEAR: i32 = 1000;

const DATE_TIME_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
];

// chrono accepts full and abbreviated names for both %B/%b and %A/%a
const DATE_FORMATS: [&str; 8] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %B %Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%A %d %B %Y",
    "%A, %d %B %Y",
    "%A, %B %d, %Y",
];

/// Parse a calendar date, returning None when nothing recognises the text
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    parse_machine_date(text)
        .filter(|date| date.year() >= MIN_MACHINE_YEAR)
        .or_else(|| parse_day_month_year(text))
}

/// Formats a general-purpose date parser would accept
fn parse_machine_date(text: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local().date());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.naive_local().date());
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| DATE_FORMATS.iter().find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok()))
}

/// `D/M/YYYY` or `D-M-YYYY`; impossible dates (31/02/2025) are rejected
fn parse_day_month_year(text: &str) -> Option<NaiveDate> {
    let caps = DAY_MONTH_YEAR_RE.captures(text)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse `H`, `H:MM`, optionally followed by `am`/`pm`
///
/// `12am` is midnight, `12pm` is noon. Out-of-range results (`25:00`,
/// `9:75`) are rejected rather than rolled over.
pub fn parse_time(text: &str) -> Option<TimeOfDay> {
    let text = text.trim().to_lowercase();
    let caps = TIME_RE.captures(&text)?;

    let mut hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    match caps.get(3).map(|m| m.as_str()) {
        Some("pm") if hour < 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        _ => {}
    }

    (hour < 24 && minute < 60).then_some(TimeOfDay { hour, minute })
}

/// Put a parsed time on a parsed day; no time means midnight
pub fn combine(date: Option<NaiveDate>, time: Option<TimeOfDay>) -> Option<NaiveDateTime> {
    let date = date?;
    match time {
        Some(t) => date.and_hms_opt(t.hour, t.minute, 0),
        None => date.and_hms_opt(0, 0, 0),
    }
}
