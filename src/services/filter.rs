//! Multi-criteria event filtering
//!
//! All active predicates are ANDed. Text, category, area and toggle checks
//! run first as a cheap in-memory pass; the distance check only sees the
//! survivors, since it is the only step that may reach the geocoder.

use crate::domain::types::Event;
use crate::infra::metrics::Metrics;
use crate::services::distance::DistanceFilter;
use crate::services::geocode_cache::GeocodeCache;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Filter criteria, normalized to lowercase on construction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    text: String,
    category: String,
    area: String,
    toggles: BTreeSet<String>,
    home: String,
    max_miles: Option<f64>,
}

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.trim().to_lowercase();
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.trim().to_lowercase();
        self
    }

    pub fn with_area(mut self, area: &str) -> Self {
        self.area = area.trim().to_lowercase();
        self
    }

    pub fn with_toggle(mut self, toggle: &str) -> Self {
        let toggle = toggle.trim().to_lowercase();
        if !toggle.is_empty() {
            self.toggles.insert(toggle);
        }
        self
    }

    pub fn with_distance(mut self, home: &str, max_miles: f64) -> Self {
        self.home = home.trim().to_string();
        self.max_miles = Some(max_miles);
        self
    }

    /// Seed criteria from a URL query string
    ///
    /// Recognised keys: `q`, `cat`, `area`, `toggle` (repeatable or
    /// comma-separated), `home`, `miles`. Unknown keys are ignored.
    pub fn from_query(query: &str) -> Self {
        let mut criteria = Self::default();
        let Ok(mut url) = reqwest::Url::parse("http://localhost/") else {
            return criteria;
        };
        url.set_query(Some(query.trim_start_matches('?')));

        let mut home = String::new();
        let mut miles = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "q" => criteria = criteria.with_text(&value),
                "cat" => criteria = criteria.with_category(&value),
                "area" => criteria = criteria.with_area(&value),
                "toggle" => {
                    for toggle in value.split(',') {
                        criteria = criteria.with_toggle(toggle);
                    }
                }
                "home" => home = value.trim().to_string(),
                "miles" => miles = value.trim().parse::<f64>().ok(),
                _ => {}
            }
        }
        if let Some(miles) = miles {
            criteria = criteria.with_distance(&home, miles);
        } else {
            criteria.home = home;
        }
        criteria
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn area(&self) -> &str {
        &self.area
    }

    pub fn toggles(&self) -> &BTreeSet<String> {
        &self.toggles
    }

    pub fn home(&self) -> &str {
        &self.home
    }

    pub fn max_miles(&self) -> Option<f64> {
        self.max_miles
    }

    /// Fill in a home query when the caller asked for a radius without one
    pub fn with_default_home(mut self, home: &str) -> Self {
        if self.home.is_empty() {
            self.home = home.trim().to_string();
        }
        self
    }

    /// Distance filtering needs both a home query and a positive radius
    pub fn distance_active(&self) -> bool {
        !self.home.is_empty() && self.max_miles.is_some_and(|m| m.is_finite() && m > 0.0)
    }

    /// Every predicate except distance
    pub fn matches_locally(&self, event: &Event) -> bool {
        let text_ok = self.text.is_empty() || event.search_text().contains(&self.text);
        let category_ok =
            self.category.is_empty() || event.category.to_lowercase() == self.category;
        let area_ok = self.area.is_empty() || event.area.to_lowercase() == self.area;
        // Toggles only ever narrow: any one matching keyword admits the event
        let toggles_ok = self.toggles.is_empty() || {
            let category = event.category.to_lowercase();
            self.toggles.iter().any(|t| category.contains(t.as_str()))
        };
        text_ok && category_ok && area_ok && toggles_ok
    }
}

pub struct FilterEngine {
    cache: Arc<GeocodeCache>,
    locality_suffix: String,
    concurrency: usize,
    metrics: Option<Arc<Metrics>>,
}

impl FilterEngine {
    pub fn new(cache: Arc<GeocodeCache>, locality_suffix: &str) -> Self {
        Self { cache, locality_suffix: locality_suffix.to_string(), concurrency: 1, metrics: None }
    }

    /// Allow up to `n` candidate geocodes in flight. 1 keeps strict event order.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cache(&self) -> &GeocodeCache {
        &self.cache
    }

    /// Filter `events` and sort ascending by start (stable for equal starts)
    pub async fn apply(&self, events: &[Event], criteria: &FilterCriteria) -> Vec<Event> {
        let started = Instant::now();
        let mut kept: Vec<Event> =
            events.iter().filter(|e| criteria.matches_locally(e)).cloned().collect();
        let after_local = kept.len();

        if criteria.distance_active() {
            kept = self.within_distance(kept, criteria).await;
        }

        kept.sort_by_key(|e| e.start);

        if let Some(metrics) = &self.metrics {
            metrics.record_filter_pass();
        }
        info!(
            input = %events.len(),
            after_local = %after_local,
            output = %kept.len(),
            distance = %criteria.distance_active(),
            elapsed_ms = %started.elapsed().as_millis(),
            "events_filtered"
        );
        kept
    }

    async fn within_distance(&self, candidates: Vec<Event>, criteria: &FilterCriteria) -> Vec<Event> {
        let max_miles = criteria.max_miles.unwrap_or(0.0);
        let Some(origin) = self.cache.resolve(&criteria.home).await else {
            warn!(home = %criteria.home, "home_location_unresolved");
            return Vec::new();
        };
        self.cache.remember_home(&criteria.home, origin);

        let filter = DistanceFilter::new(&self.cache);
        let filter = &filter;
        let suffix = self.locality_suffix.as_str();
        let checks = candidates.into_iter().map(move |event| async move {
            let query = event.location_query(suffix);
            let inside = filter.within_radius(origin, &query, max_miles).await;
            (event, inside)
        });

        let results: Vec<(Event, bool)> =
            stream::iter(checks).buffered(self.concurrency).collect().await;
        debug!(
            origin = %origin,
            checked = %results.len(),
            concurrency = %self.concurrency,
            "distance_pass_complete"
        );
        results.into_iter().filter_map(|(event, inside)| inside.then_some(event)).collect()
    }
}
