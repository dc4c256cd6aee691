//! JSON HTTP API and Prometheus endpoint
//!
//! Uses hyper http1 with one task per connection. Handlers never hold the store
//! lock across an await; route planning copies the profile out first.

use crate::domain::route::RouteType;
use crate::domain::types::{epoch_ms, CellKey, LatLng, ReportId};
use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::services::ingestion::{ReportService, ReportSubmission};
use crate::services::map_view::{cell_detail, cell_markers, heat_points, SensoryFilter, DEFAULT_INTENSITY};
use crate::services::profile_manager::{ProfileManager, ProfileUpdate};
use crate::services::route_scorer::{RoutePlanner, RouteRequest};
use crate::services::store::StoreError;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 64 * 1024;

type HttpResponse = Response<Full<Bytes>>;

/// Everything the handlers need
pub struct AppState {
    pub reports: Arc<ReportService>,
    pub profiles: Arc<ProfileManager>,
    pub planner: Arc<RoutePlanner>,
    pub metrics: Arc<Metrics>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    ok: bool,
    error: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteBody {
    #[serde(default)]
    start: Option<LatLng>,
    #[serde(default)]
    end: Option<LatLng>,
    #[serde(default)]
    route_type: Option<String>,
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> HttpResponse {
    match serde_json::to_vec(value) {
        Ok(body) => Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(Full::new(Bytes::from(body)))
            .expect("static response should not fail"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    let body = serde_json::to_vec(&ErrorBody { ok: false, error: message }).unwrap_or_default();
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

fn empty_response(status: StatusCode) -> HttpResponse {
    Response::builder()
        .status(status)
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::new()))
        .expect("static response should not fail")
}

fn store_error_response(e: &StoreError) -> HttpResponse {
    error_response(StatusCode::NOT_FOUND, &e.to_string())
}

fn parse_json<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, HttpResponse> {
    serde_json::from_slice(body)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &format!("invalid JSON body: {e}")))
}

/// Value of `name` in a raw query string
fn query_param<'a>(query: Option<&'a str>, name: &str) -> Option<&'a str> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// Parse a cell key path segment, accepting a percent-encoded comma
fn parse_cell_segment(segment: &str) -> Option<CellKey> {
    segment.replace("%2C", ",").replace("%2c", ",").parse().ok()
}

/// Prometheus text exposition
fn format_prometheus_metrics(summary: &MetricsSummary) -> String {
    let mut output = String::with_capacity(2048);
    let counters = [
        ("sensmap_reports_ingested_total", "Reports accepted", summary.reports_ingested),
        ("sensmap_reports_rejected_total", "Submissions rejected by validation", summary.reports_rejected),
        ("sensmap_reports_deleted_total", "Reports removed by explicit delete", summary.reports_deleted),
        ("sensmap_undo_total", "Successful undo operations", summary.undo_total),
        ("sensmap_reports_compacted_total", "Reports removed by compaction", summary.reports_compacted),
        ("sensmap_route_requests_total", "Route plans served", summary.route_requests),
        ("sensmap_route_fallbacks_total", "Route plans using the straight-line fallback", summary.route_fallbacks),
    ];
    for (name, help, value) in counters {
        let _ = writeln!(output, "# HELP {name} {help}");
        let _ = writeln!(output, "# TYPE {name} counter");
        let _ = writeln!(output, "{name} {value}");
    }

    let gauges = [
        ("sensmap_cells", "Cells holding at least one report", summary.cells as u64),
        ("sensmap_reports", "Reports currently stored", summary.reports as u64),
        ("sensmap_route_latency_max_us", "Max route planning latency in the current window", summary.route_latency_max_us),
    ];
    for (name, help, value) in gauges {
        let _ = writeln!(output, "# HELP {name} {help}");
        let _ = writeln!(output, "# TYPE {name} gauge");
        let _ = writeln!(output, "{name} {value}");
    }
    output
}

/// Route one request; `body` is the fully read request body
pub async fn dispatch(
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
    state: &AppState,
) -> HttpResponse {
    let segments: Vec<&str> = path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect();
    let now_ms = epoch_ms();

    match (method, segments.as_slice()) {
        (&Method::OPTIONS, _) => Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type")
            .body(Full::new(Bytes::new()))
            .expect("static response should not fail"),

        (&Method::GET, ["health"]) => Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail"),

        (&Method::GET, ["metrics"]) => {
            let (cells, reports) = {
                let store = state.reports.store().read();
                (store.cell_count(), store.report_count())
            };
            let body = format_prometheus_metrics(&state.metrics.peek(cells, reports));
            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail")
        }

        (&Method::POST, ["reports"]) => {
            let submission: ReportSubmission = match parse_json(body) {
                Ok(s) => s,
                Err(response) => return response,
            };
            match state.reports.submit(&submission, now_ms) {
                Ok(receipt) => json_response(StatusCode::CREATED, &receipt),
                Err(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()),
            }
        }

        (&Method::POST, ["reports", "undo"]) => match state.reports.undo_last() {
            Ok(removed) => json_response(StatusCode::OK, &removed),
            Err(e) => store_error_response(&e),
        },

        (&Method::DELETE, ["cells", cell, "reports", id]) => {
            let (Some(cell), Ok(id)) = (parse_cell_segment(cell), id.parse::<u64>()) else {
                return error_response(StatusCode::BAD_REQUEST, "invalid cell key or report id");
            };
            match state.reports.delete(cell, ReportId(id)) {
                Ok(_) => empty_response(StatusCode::NO_CONTENT),
                Err(e) => store_error_response(&e),
            }
        }

        (&Method::GET, ["cells"]) => {
            let filter: SensoryFilter = match query_param(query, "filter").unwrap_or("all").parse() {
                Ok(f) => f,
                Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
            };
            let profile = state.profiles.get();
            let markers = {
                let store = state.reports.store().read();
                cell_markers(&store, &profile, filter, now_ms)
            };
            json_response(StatusCode::OK, &markers)
        }

        (&Method::GET, ["cells", cell]) => {
            let Some(cell) = parse_cell_segment(cell) else {
                return error_response(StatusCode::BAD_REQUEST, "invalid cell key");
            };
            let profile = state.profiles.get();
            let detail = {
                let store = state.reports.store().read();
                cell_detail(&store, cell, &profile, now_ms)
            };
            match detail {
                Some(detail) => json_response(StatusCode::OK, &detail),
                None => store_error_response(&StoreError::CellNotFound(cell)),
            }
        }

        (&Method::GET, ["heatmap"]) => {
            let intensity = match query_param(query, "intensity") {
                None => DEFAULT_INTENSITY,
                Some(raw) => match raw.parse::<f64>() {
                    Ok(v) if (0.0..=1.0).contains(&v) => v,
                    _ => return error_response(StatusCode::BAD_REQUEST, "intensity must be in [0, 1]"),
                },
            };
            let profile = state.profiles.get();
            let points = {
                let store = state.reports.store().read();
                heat_points(&store, &profile, intensity, now_ms)
            };
            json_response(StatusCode::OK, &points)
        }

        (&Method::GET, ["profile"]) => json_response(StatusCode::OK, &state.profiles.get()),

        (&Method::PUT, ["profile"]) => {
            let update: ProfileUpdate = match parse_json(body) {
                Ok(u) => u,
                Err(response) => return response,
            };
            match state.profiles.update(&update) {
                Ok(profile) => json_response(StatusCode::OK, &profile),
                Err(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()),
            }
        }

        (&Method::POST, ["route"]) => {
            let route: RouteBody = match parse_json(body) {
                Ok(r) => r,
                Err(response) => return response,
            };
            let request = RouteRequest {
                start: route.start,
                end: route.end,
                route_type: match route.route_type.as_deref() {
                    None | Some("") => RouteType::default(),
                    Some(name) => name.parse().unwrap_or_default(),
                },
            };
            let profile = state.profiles.get();
            match state.planner.plan(request, &profile, now_ms).await {
                Ok(scored) => json_response(StatusCode::OK, &scored),
                Err(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()),
            }
        }

        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail"),
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Result<HttpResponse, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            debug!(error = %e, "request_body_rejected");
            return Ok(error_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"));
        }
    };

    let response =
        dispatch(&parts.method, parts.uri.path(), parts.uri.query(), &body, &state).await;
    debug!(
        method = %parts.method,
        path = %parts.uri.path(),
        status = %response.status().as_u16(),
        "http_request"
    );
    Ok(response)
}

/// Start the API server
pub async fn start_api_server(
    bind_address: &str,
    port: u16,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = format!("{bind_address}:{port}").parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!(addr = %addr, "api_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "api_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "api_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("api_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
