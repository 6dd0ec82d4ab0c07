//! Forward geocoding over HTTP (Nominatim-style search API)
//!
//! Request: `GET <endpoint>?q=<query>&format=json&limit=1`
//! Response: JSON array of candidates, each carrying `lat`/`lon` as numeric
//! text. Only the first candidate is used.

use crate::domain::types::GeoPoint;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocode request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("geocode provider returned HTTP {0}")]
    Status(u16),

    #[error("geocode response not understood: {0}")]
    Body(String),
}

/// Resolve free text to at most one best-match coordinate
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` means the provider answered with no candidates
    async fn lookup(&self, query: &str) -> Result<Option<GeoPoint>, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct Candidate {
    lat: String,
    lon: String,
}

/// Parse a provider response body into the first candidate's coordinates
fn parse_candidates(body: &[u8]) -> Result<Option<GeoPoint>, GeocodeError> {
    let candidates: Vec<Candidate> =
        serde_json::from_slice(body).map_err(|e| GeocodeError::Body(e.to_string()))?;
    let Some(first) = candidates.first() else {
        return Ok(None);
    };

    let lat = first.lat.trim().parse::<f64>();
    let lon = first.lon.trim().parse::<f64>();
    match (lat, lon) {
        (Ok(lat), Ok(lon)) => GeoPoint::new(lat, lon)
            .map(Some)
            .ok_or_else(|| GeocodeError::Body(format!("non-finite coordinate {lat},{lon}"))),
        _ => Err(GeocodeError::Body(format!("unparsable coordinate {},{}", first.lat, first.lon))),
    }
}

pub struct HttpGeocoder {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpGeocoder {
    pub fn new(endpoint: &str, user_agent: &str, timeout: Duration) -> Result<Self, GeocodeError> {
        // Create HTTP client once for reuse (connection pooling)
        let client = reqwest::Client::builder().timeout(timeout).user_agent(user_agent).build()?;
        Ok(Self { endpoint: endpoint.to_string(), client })
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn lookup(&self, query: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        let start = Instant::now();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(query = %query, status = %status.as_u16(), "geocode_http_status");
            return Err(GeocodeError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let result = parse_candidates(&body);
        debug!(
            query = %query,
            latency_ms = %start.elapsed().as_millis(),
            found = %matches!(result, Ok(Some(_))),
            "geocode_lookup"
        );
        result
    }
}
