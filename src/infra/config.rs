//! Configuration loading
//!
//! Config file is selected via:
//! 1. --config <path> command line argument (parsed in main)
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! A `.json` file is read as the flat camelCase object the board's
//! `config.json` has always used (`eventsCsvUrl` plus optional overrides).
//! Anything else is parsed as sectioned TOML.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Marker left in template configs where the feed link belongs
const PLACEHOLDER_MARKER: &str = "PASTE_YOUR";

pub const NOT_CONFIGURED_MESSAGE: &str = "Configure your CSV link in config.json.";

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub events_csv_url: Option<String>,
    #[serde(default = "default_feed_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { events_csv_url: None, timeout_ms: default_feed_timeout_ms() }
    }
}

fn default_feed_timeout_ms() -> u64 {
    15_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeConfig {
    #[serde(default = "default_geocode_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_geocode_timeout_ms")]
    pub timeout_ms: u64,
    /// Appended to every event location before lookup
    #[serde(default = "default_locality_suffix")]
    pub locality_suffix: String,
    /// Candidate lookups in flight at once; 1 keeps event order
    #[serde(default = "default_geocode_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_geocode_endpoint(),
            user_agent: default_user_agent(),
            timeout_ms: default_geocode_timeout_ms(),
            locality_suffix: default_locality_suffix(),
            concurrency: default_geocode_concurrency(),
            cache_file: default_cache_file(),
        }
    }
}

fn default_geocode_endpoint() -> String {
    "https://nominatim.openstreetmap.org/search".to_string()
}

fn default_user_agent() -> String {
    format!("events-board/{}", env!("CARGO_PKG_VERSION"))
}

fn default_geocode_timeout_ms() -> u64 {
    10_000
}

fn default_locality_suffix() -> String {
    ", Bristol, UK".to_string()
}

fn default_geocode_concurrency() -> usize {
    1
}

fn default_cache_file() -> String {
    "geocode-cache.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewsConfig {
    #[serde(default = "default_upcoming_days")]
    pub upcoming_days: u32,
    #[serde(default = "default_upcoming_limit")]
    pub upcoming_limit: usize,
    #[serde(default = "default_calendar_cell_limit")]
    pub calendar_cell_limit: usize,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            upcoming_days: default_upcoming_days(),
            upcoming_limit: default_upcoming_limit(),
            calendar_cell_limit: default_calendar_cell_limit(),
        }
    }
}

fn default_upcoming_days() -> u32 {
    7
}

fn default_upcoming_limit() -> usize {
    12
}

fn default_calendar_cell_limit() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// API port (0 to disable)
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { bind_address: default_bind_address(), port: default_http_port() }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub geocode: GeocodeConfig,
    #[serde(default)]
    pub views: ViewsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Flat `config.json` shape; unset fields keep their TOML defaults
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct JsonConfig {
    #[serde(default)]
    pub events_csv_url: Option<String>,
    pub feed_timeout_ms: Option<u64>,
    pub geocode_endpoint: Option<String>,
    pub user_agent: Option<String>,
    pub geocode_timeout_ms: Option<u64>,
    pub locality_suffix: Option<String>,
    pub geocode_concurrency: Option<usize>,
    pub cache_file: Option<String>,
    pub upcoming_days: Option<u32>,
    pub upcoming_limit: Option<usize>,
    pub calendar_cell_limit: Option<usize>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub metrics_interval_secs: Option<u64>,
}

impl From<JsonConfig> for TomlConfig {
    fn from(json: JsonConfig) -> Self {
        let mut config = TomlConfig::default();
        config.feed.events_csv_url = json.events_csv_url;
        if let Some(v) = json.feed_timeout_ms {
            config.feed.timeout_ms = v;
        }
        if let Some(v) = json.geocode_endpoint {
            config.geocode.endpoint = v;
        }
        if let Some(v) = json.user_agent {
            config.geocode.user_agent = v;
        }
        if let Some(v) = json.geocode_timeout_ms {
            config.geocode.timeout_ms = v;
        }
        if let Some(v) = json.locality_suffix {
            config.geocode.locality_suffix = v;
        }
        if let Some(v) = json.geocode_concurrency {
            config.geocode.concurrency = v;
        }
        if let Some(v) = json.cache_file {
            config.geocode.cache_file = v;
        }
        if let Some(v) = json.upcoming_days {
            config.views.upcoming_days = v;
        }
        if let Some(v) = json.upcoming_limit {
            config.views.upcoming_limit = v;
        }
        if let Some(v) = json.calendar_cell_limit {
            config.views.calendar_cell_limit = v;
        }
        if let Some(v) = json.bind_address {
            config.http.bind_address = v;
        }
        if let Some(v) = json.port {
            config.http.port = v;
        }
        if let Some(v) = json.metrics_interval_secs {
            config.metrics.interval_secs = v;
        }
        config
    }
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    events_csv_url: Option<String>,
    feed_timeout_ms: u64,
    geocode_endpoint: String,
    user_agent: String,
    geocode_timeout_ms: u64,
    locality_suffix: String,
    geocode_concurrency: usize,
    cache_file: String,
    upcoming_days: u32,
    upcoming_limit: usize,
    calendar_cell_limit: usize,
    bind_address: String,
    http_port: u16,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_sections(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_sections(sections: TomlConfig, config_file: String) -> Self {
        Self {
            events_csv_url: sections.feed.events_csv_url,
            feed_timeout_ms: sections.feed.timeout_ms,
            geocode_endpoint: sections.geocode.endpoint,
            user_agent: sections.geocode.user_agent,
            geocode_timeout_ms: sections.geocode.timeout_ms,
            locality_suffix: sections.geocode.locality_suffix,
            geocode_concurrency: sections.geocode.concurrency.max(1),
            cache_file: sections.geocode.cache_file,
            upcoming_days: sections.views.upcoming_days,
            upcoming_limit: sections.views.upcoming_limit,
            calendar_cell_limit: sections.views.calendar_cell_limit,
            bind_address: sections.http.bind_address,
            http_port: sections.http.port,
            metrics_interval_secs: sections.metrics.interval_secs.max(1),
            config_file,
        }
    }

    /// Config file path when none was given on the command line
    pub fn resolve_config_path() -> String {
        env::var("CONFIG_FILE").unwrap_or_else(|_| "config/dev.toml".to_string())
    }

    /// Load configuration from a TOML or JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let sections: TomlConfig = if is_json {
            serde_json::from_str::<JsonConfig>(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
                .into()
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        };

        Ok(Self::from_sections(sections, path.display().to_string()))
    }

    /// Load configuration - tries the file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Feed location, or `None` while the board is not configured
    ///
    /// Blank values and template placeholders both count as not configured.
    pub fn feed_url(&self) -> Option<&str> {
        let url = self.events_csv_url.as_deref()?.trim();
        if url.is_empty() || url.contains(PLACEHOLDER_MARKER) {
            return None;
        }
        Some(url)
    }

    pub fn feed_timeout_ms(&self) -> u64 {
        self.feed_timeout_ms
    }

    pub fn geocode_endpoint(&self) -> &str {
        &self.geocode_endpoint
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn geocode_timeout_ms(&self) -> u64 {
        self.geocode_timeout_ms
    }

    pub fn locality_suffix(&self) -> &str {
        &self.locality_suffix
    }

    pub fn geocode_concurrency(&self) -> usize {
        self.geocode_concurrency
    }

    pub fn cache_file(&self) -> &str {
        &self.cache_file
    }

    pub fn upcoming_days(&self) -> u32 {
        self.upcoming_days
    }

    pub fn upcoming_limit(&self) -> usize {
        self.upcoming_limit
    }

    pub fn calendar_cell_limit(&self) -> usize {
        self.calendar_cell_limit
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point the board at a feed
    pub fn with_feed_url(mut self, url: impl Into<String>) -> Self {
        self.events_csv_url = Some(url.into());
        self
    }

    /// Builder method for tests to change the lookup suffix
    pub fn with_locality_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.locality_suffix = suffix.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.feed_url(), None);
        assert_eq!(config.feed_timeout_ms(), 15_000);
        assert_eq!(config.geocode_timeout_ms(), 10_000);
        assert_eq!(config.locality_suffix(), ", Bristol, UK");
        assert_eq!(config.geocode_concurrency(), 1);
        assert_eq!(config.upcoming_days(), 7);
        assert_eq!(config.upcoming_limit(), 12);
        assert_eq!(config.calendar_cell_limit(), 4);
        assert_eq!(config.http_port(), 8080);
        assert_eq!(config.metrics_interval_secs(), 60);
    }

    #[test]
    fn test_feed_url_placeholder_is_not_configured() {
        let config = Config::default().with_feed_url("https://PASTE_YOUR_SHEET_LINK_HERE");
        assert_eq!(config.feed_url(), None);

        let config = Config::default().with_feed_url("   ");
        assert_eq!(config.feed_url(), None);

        let config = Config::default().with_feed_url(" https://example.com/events.csv ");
        assert_eq!(config.feed_url(), Some("https://example.com/events.csv"));
    }

    #[test]
    fn test_json_overrides_only_given_fields() {
        let json: JsonConfig =
            serde_json::from_str(r#"{"eventsCsvUrl":"events.csv","upcomingLimit":3}"#).unwrap();
        let config = Config::from_sections(json.into(), "test".to_string());
        assert_eq!(config.feed_url(), Some("events.csv"));
        assert_eq!(config.upcoming_limit(), 3);
        assert_eq!(config.upcoming_days(), 7);
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        let mut sections = TomlConfig::default();
        sections.geocode.concurrency = 0;
        let config = Config::from_sections(sections, "test".to_string());
        assert_eq!(config.geocode_concurrency(), 1);
    }

    #[test]
    fn test_json_without_timeout_keeps_feed_default() {
        let json: JsonConfig = serde_json::from_str(r#"{"eventsCsvUrl":"events.csv"}"#).unwrap();
        let config = Config::from_sections(json.into(), "test".to_string());
        assert_eq!(config.feed_timeout_ms(), 15_000);
    }

    #[test]
    fn test_resolve_config_path() {
        match env::var("CONFIG_FILE") {
            Ok(path) => assert_eq!(Config::resolve_config_path(), path),
            Err(_) => assert_eq!(Config::resolve_config_path(), "config/dev.toml"),
        }
    }
}
