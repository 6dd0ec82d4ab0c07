//! Domain models - canonical event types and pure algorithms
//!
//! - `types` - `Event`, `GeoPoint`, `TimeOfDay`, `RawRow`
//! - `datetime` - free-text date/time parsing
//! - `calendar` - week-aligned month grid
//! - `geo` - haversine distance

pub mod calendar;
pub mod datetime;
pub mod geo;
pub mod types;

pub use calendar::{CalendarGrid, DayCell};
pub use types::{Event, GeoPoint, RawRow, TimeOfDay};
