//! Derived list views: the rolling upcoming list and the category index

use crate::domain::types::Event;
use chrono::{Duration, NaiveDateTime};
use std::collections::BTreeSet;

/// Events starting within `[now, now + days]`, soonest first, at most `limit`
pub fn upcoming(events: &[Event], now: NaiveDateTime, days: u32, limit: usize) -> Vec<Event> {
    let horizon = now + Duration::days(i64::from(days));
    let mut soon: Vec<Event> =
        events.iter().filter(|e| e.start >= now && e.start <= horizon).cloned().collect();
    soon.sort_by_key(|e| e.start);
    soon.truncate(limit);
    soon
}

/// Distinct non-empty categories, sorted
pub fn categories(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .map(|e| e.category.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
