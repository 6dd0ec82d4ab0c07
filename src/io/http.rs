//! HTTP JSON API
//!
//! Read-only endpoints over the event board plus Prometheus text metrics:
//!
//! - `GET /health`
//! - `GET /events/upcoming`
//! - `GET /events?q=&cat=&area=&toggle=&home=&miles=`
//! - `GET /calendar?month=YYYY-MM&<same filters>`
//! - `GET /categories`
//! - `GET /metrics`
//!
//! An unconfigured feed answers 503 with the setup message instead of data.

use crate::domain::calendar::{self, CalendarGrid};
use crate::infra::config::NOT_CONFIGURED_MESSAGE;
use crate::infra::metrics::{MetricsSummary, METRICS_LOOKUP_BOUNDS_MS, METRICS_NUM_BUCKETS};
use crate::services::board::{BoardError, EventBoard};
use crate::services::filter::FilterCriteria;
use bytes::Bytes;
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

const JSON: &str = "application/json";
const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// A rendered response before it is turned into a hyper body
#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    fn json(status: StatusCode, value: Value) -> Self {
        Self { status, content_type: JSON, body: value.to_string() }
    }

    fn ok(value: Value) -> Self {
        Self::json(StatusCode::OK, value)
    }

    fn error(status: StatusCode, code: &str, message: &str) -> Self {
        Self::json(status, json!({ "ok": false, "error": code, "message": message }))
    }
}

impl From<BoardError> for Reply {
    fn from(err: BoardError) -> Self {
        match err {
            BoardError::NotConfigured => Reply::error(
                StatusCode::SERVICE_UNAVAILABLE,
                "feed_not_configured",
                NOT_CONFIGURED_MESSAGE,
            ),
            BoardError::Feed(e) => {
                Reply::error(StatusCode::BAD_GATEWAY, "feed_unavailable", &e.to_string())
            }
        }
    }
}

fn month_label(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// `YYYY-MM` to the first of that month; blank means the current month
fn parse_month(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(calendar::first_of_month(today));
    }
    NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d").ok()
}

fn query_value(query: &str, key: &str) -> String {
    let Ok(mut url) = reqwest::Url::parse("http://localhost/") else {
        return String::new();
    };
    url.set_query(Some(query));
    url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned()).unwrap_or_default()
}

fn calendar_json(grid: &CalendarGrid, cell_limit: usize) -> Value {
    let weeks: Vec<Value> = grid
        .weeks()
        .map(|week| {
            week.iter()
                .map(|cell| {
                    let shown = cell.preview(cell_limit);
                    json!({
                        "date": cell.date,
                        "in_month": cell.in_month,
                        "events": shown,
                        "more": cell.events.len() - shown.len(),
                    })
                })
                .collect()
        })
        .collect();
    json!({
        "ok": true,
        "month": month_label(grid.month_start),
        "prev": month_label(calendar::shift_month(grid.month_start, -1)),
        "next": month_label(calendar::shift_month(grid.month_start, 1)),
        "weeks": weeks,
    })
}

/// Route one request against the board
///
/// `now` is the local wall-clock time used for the upcoming window and the
/// default calendar month.
pub async fn route(
    board: &EventBoard,
    method: &Method,
    path: &str,
    query: &str,
    now: NaiveDateTime,
) -> Reply {
    if *method != Method::GET {
        return Reply::error(StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed", method.as_str());
    }

    match path {
        "/health" => Reply { status: StatusCode::OK, content_type: "text/plain", body: "ok".into() },
        "/metrics" => Reply {
            status: StatusCode::OK,
            content_type: PROMETHEUS_TEXT,
            body: format_prometheus_metrics(&board.metrics().report()),
        },
        "/events/upcoming" => match board.upcoming(now).await {
            Ok(events) => Reply::ok(json!({ "ok": true, "events": events })),
            Err(e) => e.into(),
        },
        "/events" => {
            let criteria = FilterCriteria::from_query(query);
            match board.list(&criteria).await {
                Ok(events) => Reply::ok(json!({ "ok": true, "events": events })),
                Err(e) => e.into(),
            }
        }
        "/calendar" => {
            let Some(anchor) = parse_month(&query_value(query, "month"), now.date()) else {
                return Reply::error(StatusCode::BAD_REQUEST, "bad_month", "expected month=YYYY-MM");
            };
            let criteria = FilterCriteria::from_query(query);
            match board.calendar(anchor, &criteria).await {
                Ok(grid) => Reply::ok(calendar_json(&grid, board.config().calendar_cell_limit())),
                Err(e) => e.into(),
            }
        }
        "/categories" => match board.categories().await {
            Ok(categories) => Reply::ok(json!({ "ok": true, "categories": categories })),
            Err(e) => e.into(),
        },
        _ => Reply::error(StatusCode::NOT_FOUND, "not_found", path),
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    board: Arc<EventBoard>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    board.metrics().record_http_request();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();
    let reply = route(&board, req.method(), &path, &query, Local::now().naive_local()).await;
    debug!(method = %req.method(), path = %path, status = %reply.status.as_u16(), "http_request");

    Ok(Response::builder()
        .status(reply.status)
        .header("Content-Type", reply.content_type)
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(reply.body)))
        .expect("static response should not fail"))
}

/// Serve the API until the shutdown flag flips
pub async fn start_http_server(
    bind_address: &str,
    port: u16,
    board: Arc<EventBoard>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = format!("{bind_address}:{port}").parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!(addr = %addr, "http_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let board = board.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let board = board.clone();
                                async move { handle_request(req, board).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

fn write_counter(output: &mut String, name: &str, help: &str, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} counter");
    let _ = writeln!(output, "{name} {val}");
}

fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");
    let _ = writeln!(output, "{name}_sum {sum}");
    let _ = writeln!(output, "{name}_count {cumulative}");
}

/// Format a metrics snapshot in Prometheus text exposition format
pub fn format_prometheus_metrics(summary: &MetricsSummary) -> String {
    let mut output = String::with_capacity(2048);

    write_counter(&mut output, "events_board_feed_loads_total", "Successful feed loads", summary.feed_loads);
    write_counter(
        &mut output,
        "events_board_feed_failures_total",
        "Feed loads that failed to fetch or decode",
        summary.feed_failures,
    );
    write_counter(&mut output, "events_board_rows_decoded_total", "Feed rows decoded", summary.rows_decoded);
    write_counter(
        &mut output,
        "events_board_rows_dropped_total",
        "Feed rows dropped for an unparseable start",
        summary.rows_dropped,
    );
    write_counter(&mut output, "events_board_geocode_hits_total", "Geocode cache hits", summary.geocode_hits);
    write_counter(
        &mut output,
        "events_board_geocode_lookups_total",
        "External geocode lookups",
        summary.geocode_misses,
    );
    write_counter(
        &mut output,
        "events_board_geocode_failures_total",
        "External geocode lookups that failed",
        summary.geocode_failures,
    );
    write_histogram(
        &mut output,
        "events_board_geocode_lookup_ms",
        "External geocode lookup latency in milliseconds",
        &summary.lookup_buckets,
        &METRICS_LOOKUP_BOUNDS_MS,
        summary.lookup_sum_ms,
    );
    write_counter(&mut output, "events_board_filter_passes_total", "Filter passes", summary.filter_passes);
    write_counter(&mut output, "events_board_http_requests_total", "HTTP requests served", summary.http_requests);

    let _ = writeln!(output, "# HELP events_board_uptime_seconds Seconds since start");
    let _ = writeln!(output, "# TYPE events_board_uptime_seconds gauge");
    let _ = writeln!(output, "events_board_uptime_seconds {}", summary.uptime_secs);

    output
}
