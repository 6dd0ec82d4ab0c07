//! Caching front for the geocoder
//!
//! Keys are the trimmed, lowercased query under the `geo:` namespace. Both
//! found and not-found outcomes are stored, so a query that failed once is
//! never sent to the provider again while its entry exists. Concurrent
//! resolutions of the same new key share one lookup; if two writers still
//! race on a key, the last write wins.

use crate::domain::types::GeoPoint;
use crate::infra::metrics::Metrics;
use crate::io::geocoder::Geocoder;
use crate::io::store::KvStore;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const CACHE_NAMESPACE: &str = "geo:";
pub const HOME_LOCATION_KEY: &str = "home_location";

/// The user's last confirmed reference point for distance filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeLocation {
    pub query: String,
    pub point: GeoPoint,
}

/// Normalized query text, empty if the query is blank
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

pub fn cache_key(query: &str) -> String {
    format!("{CACHE_NAMESPACE}{}", normalize_query(query))
}

type InflightMap = Mutex<FxHashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Per-key lookup gate; its map entry goes away when the holder is dropped,
/// including when the resolving future is cancelled mid-lookup
struct InflightGate<'a> {
    map: &'a InflightMap,
    key: String,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> InflightGate<'a> {
    fn enter(map: &'a InflightMap, key: &str) -> Self {
        let gate = map.lock().entry(key.to_string()).or_default().clone();
        Self { map, key: key.to_string(), gate }
    }
}

impl Drop for InflightGate<'_> {
    fn drop(&mut self) {
        let mut map = self.map.lock();
        // A later caller may already have installed a fresh gate
        if map.get(&self.key).is_some_and(|g| Arc::ptr_eq(g, &self.gate)) {
            map.remove(&self.key);
        }
    }
}

pub struct GeocodeCache {
    geocoder: Arc<dyn Geocoder>,
    store: Arc<dyn KvStore>,
    inflight: InflightMap,
    metrics: Option<Arc<Metrics>>,
}

impl GeocodeCache {
    pub fn new(geocoder: Arc<dyn Geocoder>, store: Arc<dyn KvStore>) -> Self {
        Self { geocoder, store, inflight: Mutex::new(FxHashMap::default()), metrics: None }
    }

    /// Create a cache with metrics recording
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Stored outcome for `key`: `Some(None)` is a cached "no result"
    fn cached(&self, key: &str) -> Option<Option<GeoPoint>> {
        let raw = self.store.get(key)?;
        match serde_json::from_str::<Option<GeoPoint>>(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "geocode_cache_entry_unreadable");
                None
            }
        }
    }

    fn remember(&self, key: &str, value: Option<GeoPoint>) {
        let encoded = match serde_json::to_string(&value) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = %key, error = %e, "geocode_cache_encode_failed");
                return;
            }
        };
        if let Err(e) = self.store.set(key, encoded) {
            warn!(key = %key, error = %e, "geocode_cache_write_failed");
        }
    }

    /// Resolve a free-text location, consulting the cache first
    ///
    /// Transport errors, non-success responses and empty result sets all
    /// resolve to `None` and are cached as such. Blank queries resolve to
    /// `None` without touching the cache or the provider.
    pub async fn resolve(&self, query: &str) -> Option<GeoPoint> {
        if normalize_query(query).is_empty() {
            return None;
        }
        let key = cache_key(query);

        if let Some(hit) = self.cached(&key) {
            self.record_hit(&key, hit.is_some());
            return hit;
        }

        let inflight = InflightGate::enter(&self.inflight, &key);
        let _turn = inflight.gate.lock().await;

        // Another task may have finished the lookup while we waited
        if let Some(hit) = self.cached(&key) {
            self.record_hit(&key, hit.is_some());
            return hit;
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_geocode_miss();
        }

        let start = Instant::now();
        let outcome = self.geocoder.lookup(query.trim()).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_geocode_latency(start.elapsed().as_millis() as u64);
        }

        let result = match outcome {
            Ok(found) => {
                info!(query = %query.trim(), found = %found.is_some(), "geocode_resolved");
                found
            }
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_geocode_failure();
                }
                warn!(query = %query.trim(), error = %e, "geocode_lookup_failed");
                None
            }
        };

        self.remember(&key, result);
        result
    }

    fn record_hit(&self, key: &str, found: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_geocode_hit();
        }
        debug!(key = %key, found = %found, "geocode_cache_hit");
    }

    /// Last confirmed home location, if any
    pub fn home(&self) -> Option<HomeLocation> {
        let raw = self.store.get(HOME_LOCATION_KEY)?;
        serde_json::from_str(&raw).ok()
    }

    pub fn remember_home(&self, query: &str, point: GeoPoint) {
        let home = HomeLocation { query: query.trim().to_string(), point };
        if self.home().as_ref() == Some(&home) {
            return;
        }
        match serde_json::to_string(&home) {
            Ok(encoded) => {
                if let Err(e) = self.store.set(HOME_LOCATION_KEY, encoded) {
                    warn!(error = %e, "home_location_write_failed");
                } else {
                    info!(query = %home.query, point = %home.point, "home_location_saved");
                }
            }
            Err(e) => warn!(error = %e, "home_location_encode_failed"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fake geocoder shared by service tests

    use super::*;
    use crate::io::geocoder::GeocodeError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers from a fixed table; unknown queries have no result
    #[derive(Default)]
    pub struct FakeGeocoder {
        places: HashMap<String, GeoPoint>,
        failing: Vec<String>,
        calls: AtomicUsize,
    }

    impl FakeGeocoder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_place(mut self, query: &str, lat: f64, lon: f64) -> Self {
            self.places.insert(normalize_query(query), GeoPoint::new(lat, lon).unwrap());
            self
        }

        /// Queries that fail with a provider error
        pub fn with_failure(mut self, query: &str) -> Self {
            self.failing.push(normalize_query(query));
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    /// Never answers; stands in for a provider whose caller goes away
    pub struct StalledGeocoder;

    #[async_trait]
    impl Geocoder for StalledGeocoder {
        async fn lookup(&self, _query: &str) -> Result<Option<GeoPoint>, GeocodeError> {
            std::future::pending().await
        }
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn lookup(&self, query: &str) -> Result<Option<GeoPoint>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            let key = normalize_query(query);
            if self.failing.contains(&key) {
                return Err(GeocodeError::Status(503));
            }
            Ok(self.places.get(&key).copied())
        }
    }
}
