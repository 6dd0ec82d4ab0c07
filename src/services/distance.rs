//! Proximity predicate over geocoded locations

use crate::domain::geo::haversine_miles;
use crate::domain::types::GeoPoint;
use crate::services::geocode_cache::GeocodeCache;
use tracing::debug;

pub struct DistanceFilter<'a> {
    cache: &'a GeocodeCache,
}

impl<'a> DistanceFilter<'a> {
    pub fn new(cache: &'a GeocodeCache) -> Self {
        Self { cache }
    }

    /// True iff `candidate_query` resolves to a point within `max_miles` of
    /// `origin`. An unresolvable candidate is outside every radius.
    pub async fn within_radius(&self, origin: GeoPoint, candidate_query: &str, max_miles: f64) -> bool {
        let Some(candidate) = self.cache.resolve(candidate_query).await else {
            debug!(query = %candidate_query, "distance_candidate_unresolved");
            return false;
        };
        let miles = haversine_miles(origin, candidate);
        debug!(query = %candidate_query, miles = %format!("{miles:.2}"), max_miles = %max_miles, "distance_checked");
        miles <= max_miles
    }
}
