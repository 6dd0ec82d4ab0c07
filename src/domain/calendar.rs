//! Month calendar grid
//!
//! The grid always covers whole Monday-to-Sunday weeks: it starts on the
//! Monday on or before the 1st and stops after the Sunday on or after the
//! last day, so adjacent-month days pad the first and last rows.

use crate::domain::types::Event;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;
use std::collections::HashMap;

pub const DAYS_PER_WEEK: usize = 7;

/// One day of the grid with every event starting on it, in input order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayCell {
    pub date: NaiveDate,
    /// False for padding days borrowed from the previous or next month
    pub in_month: bool,
    pub events: Vec<Event>,
}

impl DayCell {
    /// At most `limit` events, for views that cap cell height
    pub fn preview(&self, limit: usize) -> &[Event] {
        &self.events[..self.events.len().min(limit)]
    }
}

/// Flat, week-aligned sequence of day cells; `cells.len() % 7 == 0`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarGrid {
    pub month_start: NaiveDate,
    pub month_end: NaiveDate,
    pub cells: Vec<DayCell>,
}

impl CalendarGrid {
    /// Cells grouped as Monday-first rows
    pub fn weeks(&self) -> impl Iterator<Item = &[DayCell]> {
        self.cells.chunks(DAYS_PER_WEEK)
    }

    pub fn cell(&self, date: NaiveDate) -> Option<&DayCell> {
        self.cells.iter().find(|c| c.date == date)
    }
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn last_of_month(date: NaiveDate) -> NaiveDate {
    let first = first_of_month(date);
    let next_first = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    next_first.and_then(|d| d.pred_opt()).unwrap_or(first)
}

/// Monday on or before `date`
pub fn start_of_week(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// First day of the month `delta` months away from `anchor`'s month
pub fn shift_month(anchor: NaiveDate, delta: i32) -> NaiveDate {
    let months = anchor.year() * 12 + anchor.month0() as i32 + delta;
    let year = months.div_euclid(12);
    let month = months.rem_euclid(12) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_else(|| first_of_month(anchor))
}

/// Build the grid for the month containing `anchor`
///
/// Days are emitted while the cursor is on or before the month end, or is
/// not yet back on a Monday. Past the month end a Monday is at most six days
/// away, so the loop always terminates with a completed final week.
pub fn build(anchor: NaiveDate, events: &[Event]) -> CalendarGrid {
    let month_start = first_of_month(anchor);
    let month_end = last_of_month(anchor);

    let mut by_day: HashMap<NaiveDate, Vec<Event>> = HashMap::new();
    for event in events {
        by_day.entry(event.start.date()).or_default().push(event.clone());
    }

    let mut cells = Vec::with_capacity(6 * DAYS_PER_WEEK);
    let mut cursor = start_of_week(month_start);
    while cursor <= month_end || cursor.weekday() != Weekday::Mon {
        cells.push(DayCell {
            date: cursor,
            in_month: cursor >= month_start && cursor <= month_end,
            events: by_day.remove(&cursor).unwrap_or_default(),
        });
        let Some(next) = cursor.succ_opt() else {
            break;
        };
        cursor = next;
    }

    CalendarGrid { month_start, month_end, cells }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event_on(title: &str, date: NaiveDate, hour: u32) -> Event {
        Event {
            title: title.to_string(),
            start: date.and_hms_opt(hour, 0, 0).unwrap(),
            end: None,
            cost: String::new(),
            address: String::new(),
            postcode: String::new(),
            area: String::new(),
            website: String::new(),
            image: String::new(),
            description: String::new(),
            category: String::new(),
        }
    }

    #[test]
    fn test_every_month_is_week_aligned() {
        for year in [2024, 2025, 2026] {
            for month in 1..=12 {
                let grid = build(ymd(year, month, 15), &[]);
                assert_eq!(grid.cells.len() % DAYS_PER_WEEK, 0, "{year}-{month}");
                assert_eq!(grid.cells[0].date.weekday(), Weekday::Mon);
                assert_eq!(grid.cells.last().unwrap().date.weekday(), Weekday::Sun);
                assert!(grid.cell(grid.month_start).is_some());
                assert!(grid.cell(grid.month_end).is_some());
            }
        }
    }

    #[test]
    fn test_month_starting_on_monday_has_no_leading_padding() {
        // September 2025 starts on a Monday and ends on a Tuesday
        let grid = build(ymd(2025, 9, 10), &[]);
        assert_eq!(grid.cells[0].date, ymd(2025, 9, 1));
        assert_eq!(grid.cells.last().unwrap().date, ymd(2025, 10, 5));
        assert_eq!(grid.cells.len(), 35);
    }

    #[test]
    fn test_month_starting_on_sunday() {
        // 1 February 2026 is a Sunday, so the first row is almost all January
        let grid = build(ymd(2026, 2, 1), &[]);
        assert_eq!(grid.cells[0].date, ymd(2026, 1, 26));
        assert_eq!(grid.cells.last().unwrap().date, ymd(2026, 3, 1));
        assert_eq!(grid.weeks().count(), 5);
        assert!(!grid.cells[0].in_month);
        assert!(grid.cell(ymd(2026, 2, 28)).unwrap().in_month);
    }

    #[test]
    fn test_events_bucketed_by_start_day() {
        let day = ymd(2025, 3, 7);
        let events: Vec<Event> = (0..6)
            .map(|i| event_on(&format!("e{i}"), day, 9 + i))
            .chain(std::iter::once(event_on("other", ymd(2025, 3, 8), 10)))
            .chain(std::iter::once(event_on("elsewhere", ymd(2025, 6, 1), 10)))
            .collect();

        let grid = build(day, &events);
        let cell = grid.cell(day).unwrap();
        assert_eq!(cell.events.len(), 6);
        assert_eq!(cell.preview(4).len(), 4);
        assert_eq!(cell.preview(4)[0].title, "e0");
        assert_eq!(grid.cell(ymd(2025, 3, 8)).unwrap().events[0].title, "other");

        let total: usize = grid.cells.iter().map(|c| c.events.len()).sum();
        assert_eq!(total, 7);
    }

    #[test]
    fn test_padding_days_carry_events() {
        // 31 March 2025 is a Monday; grid for April pads it in
        let grid = build(ymd(2025, 4, 1), &[event_on("late march", ymd(2025, 3, 31), 18)]);
        let cell = grid.cell(ymd(2025, 3, 31)).unwrap();
        assert!(!cell.in_month);
        assert_eq!(cell.events.len(), 1);
    }

    #[test]
    fn test_shift_month() {
        assert_eq!(shift_month(ymd(2025, 1, 31), -1), ymd(2024, 12, 1));
        assert_eq!(shift_month(ymd(2025, 12, 15), 1), ymd(2026, 1, 1));
        assert_eq!(shift_month(ymd(2025, 5, 20), 0), ymd(2025, 5, 1));
        assert_eq!(shift_month(ymd(2025, 5, 20), -17), ymd(2023, 12, 1));
    }

    #[test]
    fn test_month_bounds() {
        assert_eq!(last_of_month(ymd(2024, 2, 10)), ymd(2024, 2, 29));
        assert_eq!(last_of_month(ymd(2025, 12, 1)), ymd(2025, 12, 31));
        assert_eq!(start_of_week(ymd(2025, 3, 9)), ymd(2025, 3, 3));
        assert_eq!(start_of_week(ymd(2025, 3, 3)), ymd(2025, 3, 3));
    }
}
