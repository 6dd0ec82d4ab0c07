//! End-to-end tests: feed file -> normalize -> filter -> views
//!
//! Uses a table-driven geocoder and an on-disk cache file so persistence
//! across board instances is covered too.

use async_trait::async_trait;
use chrono::{NaiveDate, Timelike};
use events_board::domain::types::GeoPoint;
use events_board::infra::{Config, Metrics};
use events_board::io::{FeedClient, FileStore, GeocodeError, Geocoder, KvStore};
use events_board::services::{EventBoard, FilterCriteria, GeocodeCache};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, NamedTempFile};

const FEED: &str = "\
Title,Start Date,Start Time,End Date,End Time,Cost,Address,Postcode,Website,Image,Description,Category
Salsa Night,13/06/2025,8pm,,11pm,£5,Old Market Assembly,BS2 0EZ,,,Beginners welcome,Dance Class
Farmers Market,2025-06-14,9:00am,,1pm,Free,Corn Street,BS1 1JQ,,,,Market
Harbour Walk,14-06-2025,,,,,Harbourside,BS1 5TX,,,Guided walk,outdoor
Clifton Quiz,2025-06-14,7:30pm,,,£2,The Lansdown,BS8 2ER,,,,
Bath Ceramics,15/06/2025,10am,,,£30,Walcot Street,BA1 5BG,,,Throwing class,Art Class
Nowhere Gig,16/06/2025,9pm,,,,,,,,Secret location,music
Undated Jam,TBC,8pm,,,,Somewhere,BS3 1AA,,,,music
";

/// Answers from a fixed table keyed by lowercased query
struct TableGeocoder {
    places: HashMap<String, GeoPoint>,
    calls: AtomicUsize,
}

impl TableGeocoder {
    fn new(entries: &[(&str, f64, f64)]) -> Self {
        let places = entries
            .iter()
            .map(|(q, lat, lon)| (q.to_lowercase(), GeoPoint::new(*lat, *lon).unwrap()))
            .collect();
        Self { places, calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Geocoder for TableGeocoder {
    async fn lookup(&self, query: &str) -> Result<Option<GeoPoint>, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.places.get(&query.trim().to_lowercase()).copied())
    }
}

fn geocoder() -> Arc<TableGeocoder> {
    Arc::new(TableGeocoder::new(&[
        ("BS1 4DJ", 51.4536, -2.5930),
        ("Old Market Assembly BS2 0EZ, Bristol, UK", 51.4570, -2.5790),
        ("Corn Street BS1 1JQ, Bristol, UK", 51.4545, -2.5945),
        ("Harbourside BS1 5TX, Bristol, UK", 51.4490, -2.6000),
        ("The Lansdown BS8 2ER, Bristol, UK", 51.4590, -2.6170),
        ("Walcot Street BA1 5BG, Bristol, UK", 51.3860, -2.3590),
    ]))
}

fn feed_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(FEED.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn board(feed: &NamedTempFile, cache_path: &std::path::Path, geocoder: Arc<TableGeocoder>) -> EventBoard {
    let config = Config::default().with_feed_url(feed.path().to_str().unwrap());
    let metrics = Arc::new(Metrics::new());
    let store = FileStore::open(cache_path).unwrap();
    let cache = GeocodeCache::new(geocoder, Arc::new(store)).with_metrics(metrics.clone());
    let client = FeedClient::new(Duration::from_secs(5)).unwrap();
    EventBoard::new(config, client, Arc::new(cache), metrics)
}

fn titles(events: &[events_board::domain::Event]) -> Vec<&str> {
    events.iter().map(|e| e.title.as_str()).collect()
}

#[tokio::test]
async fn test_unfiltered_list_is_sorted_and_complete() {
    let feed = feed_file();
    let dir = tempdir().unwrap();
    let board = board(&feed, &dir.path().join("cache.json"), geocoder());

    let events = board.list(&FilterCriteria::new()).await.unwrap();
    assert_eq!(
        titles(&events),
        vec![
            "Salsa Night",
            "Harbour Walk",
            "Farmers Market",
            "Clifton Quiz",
            "Bath Ceramics",
            "Nowhere Gig"
        ]
    );

    let salsa = &events[0];
    assert_eq!(salsa.start.hour(), 20);
    // End date falls back to the start date
    assert_eq!(salsa.end.unwrap().date(), NaiveDate::from_ymd_opt(2025, 6, 13).unwrap());
    assert_eq!(salsa.end.unwrap().hour(), 23);
    assert_eq!(salsa.area, "BS2");
    assert_eq!(salsa.category, "dance class");

    // Date-only rows start at midnight
    assert_eq!(events[1].start.hour(), 0);
}

#[tokio::test]
async fn test_toggle_and_text_filters() {
    let feed = feed_file();
    let dir = tempdir().unwrap();
    let board = board(&feed, &dir.path().join("cache.json"), geocoder());

    let classes = board.list(&FilterCriteria::from_query("toggle=class")).await.unwrap();
    assert_eq!(titles(&classes), vec!["Salsa Night", "Bath Ceramics"]);

    let either = board.list(&FilterCriteria::from_query("toggle=market,outdoor")).await.unwrap();
    assert_eq!(titles(&either), vec!["Harbour Walk", "Farmers Market"]);

    let text = board.list(&FilterCriteria::from_query("q=WALK")).await.unwrap();
    assert_eq!(titles(&text), vec!["Harbour Walk"]);

    let area = board.list(&FilterCriteria::from_query("area=bs1")).await.unwrap();
    assert_eq!(titles(&area), vec!["Harbour Walk", "Farmers Market"]);
}

#[tokio::test]
async fn test_distance_filter_caches_and_persists() {
    let feed = feed_file();
    let dir = tempdir().unwrap();
    let cache_path = dir.path().join("cache.json");

    let first_geocoder = geocoder();
    let board_one = board(&feed, &cache_path, first_geocoder.clone());
    let near = board_one.list(&FilterCriteria::from_query("home=BS1+4DJ&miles=2")).await.unwrap();
    // Bath is ~11 miles out; the gig has no location and is excluded
    assert_eq!(
        titles(&near),
        vec!["Salsa Night", "Harbour Walk", "Farmers Market", "Clifton Quiz"]
    );
    let first_calls = first_geocoder.calls.load(Ordering::SeqCst);
    // Home plus five located events; the locationless gig never reaches the provider
    assert_eq!(first_calls, 6);

    // Same board again: everything is cached
    board_one.list(&FilterCriteria::from_query("home=BS1+4DJ&miles=2")).await.unwrap();
    assert_eq!(first_geocoder.calls.load(Ordering::SeqCst), first_calls);

    // A fresh board over the same cache file needs no lookups and remembers home
    let second_geocoder = geocoder();
    let board_two = board(&feed, &cache_path, second_geocoder.clone());
    let again = board_two.list(&FilterCriteria::from_query("miles=2")).await.unwrap();
    assert_eq!(titles(&again), titles(&near));
    assert_eq!(second_geocoder.calls.load(Ordering::SeqCst), 0);

    let store = FileStore::open(&cache_path).unwrap();
    assert!(store.get("home_location").unwrap().contains("BS1 4DJ"));
    assert_eq!(store.get("geo:"), None);
}

#[tokio::test]
async fn test_unresolvable_home_excludes_everything() {
    let feed = feed_file();
    let dir = tempdir().unwrap();
    let board = board(&feed, &dir.path().join("cache.json"), geocoder());

    let none = board.list(&FilterCriteria::from_query("home=Atlantis&miles=50")).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_calendar_grid_for_june_2025() {
    let feed = feed_file();
    let dir = tempdir().unwrap();
    let board = board(&feed, &dir.path().join("cache.json"), geocoder());

    let anchor = NaiveDate::from_ymd_opt(2025, 6, 20).unwrap();
    let grid = board.calendar(anchor, &FilterCriteria::new()).await.unwrap();

    // June 2025: Sunday 1st to Monday 30th, padded to 26 May .. 6 July
    assert_eq!(grid.cells.len(), 42);
    assert_eq!(grid.cells[0].date, NaiveDate::from_ymd_opt(2025, 5, 26).unwrap());
    assert!(!grid.cells[0].in_month);
    assert_eq!(grid.cells[41].date, NaiveDate::from_ymd_opt(2025, 7, 6).unwrap());

    let saturday = grid.cell(NaiveDate::from_ymd_opt(2025, 6, 14).unwrap()).unwrap();
    assert_eq!(titles(&saturday.events), vec!["Harbour Walk", "Farmers Market", "Clifton Quiz"]);
}
