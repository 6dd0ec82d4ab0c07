//! Tabular event feed: fetch and decode
//!
//! The feed is a CSV document with a header row. Decoding yields one
//! [`RawRow`] per record keyed by the header text exactly as written;
//! interpreting the columns is the normalizer's job.

use crate::domain::types::RawRow;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("feed returned HTTP {0}")]
    Status(u16),

    #[error("failed to read feed file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed feed: {0}")]
    Decode(#[from] csv::Error),
}

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Decode CSV bytes into header-keyed rows
///
/// Short records simply lack the trailing columns. Records whose fields are
/// all blank are skipped. Any CSV error, including non-UTF-8 text, fails the
/// whole decode.
pub fn decode_rows(bytes: &[u8]) -> Result<Vec<RawRow>, FeedError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader =
        csv::ReaderBuilder::new().has_headers(true).flexible(true).from_reader(bytes);

    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push(headers.iter().zip(record.iter()).collect::<RawRow>());
    }

    debug!(columns = %headers.len(), rows = %rows.len(), "feed_decoded");
    Ok(rows)
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Fetches the raw feed text from a URL or a local path
pub struct FeedClient {
    client: reqwest::Client,
}

impl FeedClient {
    pub fn new(timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, location: &str) -> Result<Vec<u8>, FeedError> {
        let start = Instant::now();
        let body = if is_remote(location) {
            let response = self.client.get(location).header("Cache-Control", "no-store").send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FeedError::Status(status.as_u16()));
            }
            response.bytes().await?.to_vec()
        } else {
            tokio::fs::read(location)
                .await
                .map_err(|source| FeedError::Io { path: location.to_string(), source })?
        };

        info!(
            remote = %is_remote(location),
            bytes = %body.len(),
            latency_ms = %start.elapsed().as_millis(),
            "feed_fetched"
        );
        Ok(body)
    }

    /// Fetch and decode in one step
    pub async fn fetch_rows(&self, location: &str) -> Result<Vec<RawRow>, FeedError> {
        let body = self.fetch(location).await?;
        decode_rows(&body)
    }
}
