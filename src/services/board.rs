//! Event board facade
//!
//! Wires the feed, normalizer, filter engine and views together. Every view
//! reloads the feed, so edits to the sheet show up on the next request.

use crate::domain::calendar::{self, CalendarGrid};
use crate::domain::types::Event;
use crate::infra::config::{Config, NOT_CONFIGURED_MESSAGE};
use crate::infra::metrics::Metrics;
use crate::io::feed::{FeedClient, FeedError};
use crate::io::geocoder::HttpGeocoder;
use crate::io::store::FileStore;
use crate::services::filter::{FilterCriteria, FilterEngine};
use crate::services::geocode_cache::GeocodeCache;
use crate::services::listing;
use crate::services::normalizer::normalize_rows;
use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum BoardError {
    /// No usable feed link; a normal state, not a failure
    #[error("{}", NOT_CONFIGURED_MESSAGE)]
    NotConfigured,

    #[error(transparent)]
    Feed(#[from] FeedError),
}

pub struct EventBoard {
    config: Config,
    feed: FeedClient,
    filter: FilterEngine,
    metrics: Arc<Metrics>,
}

impl EventBoard {
    pub fn new(
        config: Config,
        feed: FeedClient,
        cache: Arc<GeocodeCache>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let filter = FilterEngine::new(cache, config.locality_suffix())
            .with_concurrency(config.geocode_concurrency())
            .with_metrics(metrics.clone());
        Self { config, feed, filter, metrics }
    }

    /// Build the production board: HTTP feed and geocoder, file-backed cache
    pub fn from_config(config: Config, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let feed = FeedClient::new(Duration::from_millis(config.feed_timeout_ms()))
            .context("Failed to build feed client")?;
        let geocoder = HttpGeocoder::new(
            config.geocode_endpoint(),
            config.user_agent(),
            Duration::from_millis(config.geocode_timeout_ms()),
        )
        .context("Failed to build geocoder")?;
        let store = FileStore::open_or_empty(config.cache_file());
        let cache = GeocodeCache::new(Arc::new(geocoder), Arc::new(store))
            .with_metrics(metrics.clone());
        Ok(Self::new(config, feed, Arc::new(cache), metrics))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Fetch, decode and normalize the feed
    ///
    /// Rows without a parseable start are dropped and counted. A decode
    /// failure rejects the whole load.
    pub async fn load_events(&self) -> Result<Vec<Event>, BoardError> {
        let Some(url) = self.config.feed_url() else {
            info!(config_file = %self.config.config_file(), "feed_not_configured");
            return Err(BoardError::NotConfigured);
        };

        let start = Instant::now();
        let rows = match self.feed.fetch_rows(url).await {
            Ok(rows) => rows,
            Err(e) => {
                self.metrics.record_feed_failure();
                warn!(url = %url, error = %e, "feed_load_failed");
                return Err(e.into());
            }
        };
        let (events, dropped) = normalize_rows(&rows);
        self.metrics.record_feed_load(rows.len(), dropped);

        info!(
            rows = %rows.len(),
            events = %events.len(),
            dropped = %dropped,
            latency_ms = %start.elapsed().as_millis(),
            "feed_loaded"
        );
        Ok(events)
    }

    /// Events in the configured window after `now`
    pub async fn upcoming(&self, now: NaiveDateTime) -> Result<Vec<Event>, BoardError> {
        let events = self.load_events().await?;
        Ok(listing::upcoming(
            &events,
            now,
            self.config.upcoming_days(),
            self.config.upcoming_limit(),
        ))
    }

    /// Filtered list, sorted by start
    pub async fn list(&self, criteria: &FilterCriteria) -> Result<Vec<Event>, BoardError> {
        let events = self.load_events().await?;
        let criteria = self.with_stored_home(criteria);
        Ok(self.filter.apply(&events, &criteria).await)
    }

    /// Calendar for the month containing `anchor`, over the filtered events
    pub async fn calendar(
        &self,
        anchor: NaiveDate,
        criteria: &FilterCriteria,
    ) -> Result<CalendarGrid, BoardError> {
        let events = self.list(criteria).await?;
        Ok(calendar::build(anchor, &events))
    }

    pub async fn categories(&self) -> Result<Vec<String>, BoardError> {
        let events = self.load_events().await?;
        Ok(listing::categories(&events))
    }

    /// A radius without a home falls back to the last confirmed home
    fn with_stored_home(&self, criteria: &FilterCriteria) -> FilterCriteria {
        if criteria.max_miles().is_none() || !criteria.home().is_empty() {
            return criteria.clone();
        }
        match self.filter.cache().home() {
            Some(home) => criteria.clone().with_default_home(&home.query),
            None => criteria.clone(),
        }
    }
}
