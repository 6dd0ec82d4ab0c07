//! Shared types for the events board

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Title used when the source row carries none
pub const UNTITLED: &str = "Untitled";

/// Geographic coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
}

impl GeoPoint {
    /// Returns None unless both components are finite
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        (latitude.is_finite() && longitude.is_finite()).then_some(Self { latitude, longitude })
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5},{:.5}", self.latitude, self.longitude)
    }
}

/// Hour and minute parsed from a free-text time column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

/// Canonical event produced by normalization
///
/// `end` may precede `start` when the feed is malformed; nothing downstream
/// relies on the ordering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub title: String,
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    pub cost: String,
    pub address: String,
    pub postcode: String,
    pub area: String,
    pub website: String,
    pub image: String,
    pub description: String,
    /// Lowercased at normalization time
    pub category: String,
}

impl Event {
    /// Lowercased text searched by the free-text filter
    pub fn search_text(&self) -> String {
        [
            self.title.as_str(),
            self.description.as_str(),
            self.address.as_str(),
            self.category.as_str(),
            self.postcode.as_str(),
        ]
        .join(" ")
        .to_lowercase()
    }

    /// Free-text location used for geocoding this event's venue
    pub fn location_query(&self, locality_suffix: &str) -> String {
        let place = [self.address.trim(), self.postcode.trim()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        if place.is_empty() {
            return String::new();
        }
        format!("{place}{locality_suffix}")
    }
}

/// One decoded feed row: header -> raw text, in column order
///
/// Headers are whatever the feed author typed, so lookups go through
/// [`RawRow::get`] which ignores case and surrounding whitespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    fields: Vec<(String, String)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, header: &str, value: &str) -> Self {
        self.push(header, value);
        self
    }

    pub fn push(&mut self, header: &str, value: &str) {
        self.fields.push((header.to_string(), value.to_string()));
    }

    /// Value of the first column whose trimmed, lowercased header equals `column`.
    /// Missing columns read as empty text.
    pub fn get(&self, column: &str) -> &str {
        let wanted = column.trim().to_lowercase();
        self.fields
            .iter()
            .find(|(header, _)| header.trim().to_lowercase() == wanted)
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = RawRow::new();
        for (k, v) in iter {
            row.push(k.as_ref(), v.as_ref());
        }
        row
    }
}
