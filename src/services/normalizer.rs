//! Row normalization: arbitrary-header feed rows into canonical events
//!
//! This is the only place where the dynamic row shape becomes the fixed
//! [`Event`] type.

use crate::domain::datetime::{combine, parse_date, parse_time};
use crate::domain::types::{Event, RawRow, UNTITLED};
use chrono::NaiveDateTime;
use tracing::debug;

/// Recognised feed columns (matched case-insensitively, trimmed)
pub mod columns {
    pub const TITLE: &str = "title";
    pub const START_DATE: &str = "start date";
    pub const START_TIME: &str = "start time";
    pub const END_DATE: &str = "end date";
    pub const END_TIME: &str = "end time";
    pub const COST: &str = "cost";
    pub const ADDRESS: &str = "address";
    pub const POSTCODE: &str = "postcode";
    pub const WEBSITE: &str = "website";
    pub const IMAGE: &str = "image";
    pub const DESCRIPTION: &str = "description";
    pub const CATEGORY: &str = "category";
}

/// A normalized row whose start may not have resolved
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub title: String,
    pub cost: String,
    pub address: String,
    pub postcode: String,
    pub website: String,
    pub image: String,
    pub description: String,
    pub category: String,
}

impl NormalizedRow {
    /// Leading whitespace-delimited token of the postcode
    pub fn area(&self) -> &str {
        self.postcode.split_whitespace().next().unwrap_or("")
    }

    /// Canonical event, or None when the start never resolved
    pub fn into_event(self) -> Option<Event> {
        let start = self.start?;
        let area = self.area().to_string();
        Some(Event {
            title: self.title,
            start,
            end: self.end,
            cost: self.cost,
            address: self.address,
            postcode: self.postcode,
            area,
            website: self.website,
            image: self.image,
            description: self.description,
            category: self.category,
        })
    }
}

/// Map one feed row onto the canonical field set. Never fails.
pub fn normalize(row: &RawRow) -> NormalizedRow {
    let start_date = parse_date(row.get(columns::START_DATE));
    let end_date = parse_date(row.get(columns::END_DATE)).or(start_date);

    let title = row.get(columns::TITLE).trim();
    let title = if title.is_empty() { UNTITLED } else { title };

    NormalizedRow {
        start: combine(start_date, parse_time(row.get(columns::START_TIME))),
        end: combine(end_date, parse_time(row.get(columns::END_TIME))),
        title: title.to_string(),
        cost: row.get(columns::COST).to_string(),
        address: row.get(columns::ADDRESS).to_string(),
        postcode: row.get(columns::POSTCODE).to_string(),
        website: row.get(columns::WEBSITE).to_string(),
        image: row.get(columns::IMAGE).to_string(),
        description: row.get(columns::DESCRIPTION).to_string(),
        category: row.get(columns::CATEGORY).trim().to_lowercase(),
    }
}

/// Normalize a batch, dropping rows without a resolvable start
///
/// Returns the kept events in input order and the number of dropped rows.
pub fn normalize_rows<'a, I>(rows: I) -> (Vec<Event>, usize)
where
    I: IntoIterator<Item = &'a RawRow>,
{
    let mut events = Vec::new();
    let mut dropped = 0usize;
    for (index, row) in rows.into_iter().enumerate() {
        match normalize(row).into_event() {
            Some(event) => events.push(event),
            None => {
                dropped += 1;
                debug!(
                    row = %index,
                    start_date = %row.get(columns::START_DATE),
                    "row_dropped_no_start"
                );
            }
        }
    }
    (events, dropped)
}
