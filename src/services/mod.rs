//! Services - event pipeline and views
//!
//! - `normalizer` - Raw feed rows to canonical events
//! - `geocode_cache` - Memoizing front for the geocoder
//! - `distance` - Radius predicate over geocoded locations
//! - `filter` - Multi-criteria filter engine
//! - `listing` - Upcoming list and category index
//! - `board` - Facade wiring feed, filters and views

pub mod board;
pub mod distance;
pub mod filter;
pub mod geocode_cache;
pub mod listing;
pub mod normalizer;

pub use board::{BoardError, EventBoard};
pub use distance::DistanceFilter;
pub use filter::{FilterCriteria, FilterEngine};
pub use geocode_cache::{GeocodeCache, HomeLocation};
