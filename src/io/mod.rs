//! IO modules - external system interfaces
//!
//! - `feed` - Tabular event feed fetch (HTTP or local file) and CSV decode
//! - `geocoder` - Free-text geocoding provider client
//! - `store` - Persistent key-value store backing the geocode cache
//! - `http` - JSON API and Prometheus metrics endpoint

pub mod feed;
pub mod geocoder;
pub mod http;
pub mod store;

pub use feed::{FeedClient, FeedError};
pub use geocoder::{GeocodeError, Geocoder, HttpGeocoder};
pub use http::start_http_server;
pub use store::{FileStore, KvStore, MemoryStore, StoreError};
