//! Routing provider contract and the OSRM HTTP client
//!
//! A provider turns (start, end) into zero or more route alternatives. Any error
//! is recovered by the route planner with a straight-line fallback, so providers
//! only need to report what went wrong.

use crate::domain::route::RouteAlternative;
use crate::domain::types::LatLng;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("routing provider timed out after {0:?}")]
    Timeout(Duration),
    #[error("routing request failed: {0}")]
    Request(String),
    #[error("routing provider returned status {0}")]
    Status(u16),
    #[error("routing response could not be decoded: {0}")]
    Decode(String),
    #[error("routing provider returned no routes")]
    NoRoutes,
}

/// Source of route alternatives between two points
#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Alternatives in provider order (the provider's preferred route first)
    async fn alternatives(
        &self,
        start: LatLng,
        end: LatLng,
    ) -> Result<Vec<RouteAlternative>, ProviderError>;
}

/// OSRM response body (only the fields used here)
#[derive(Debug, Deserialize)]
struct OsrmResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
}

/// GeoJSON LineString; coordinates are `[lng, lat]`
#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

/// Parse an OSRM `route` service response body
fn parse_osrm_routes(body: &[u8]) -> Result<Vec<RouteAlternative>, ProviderError> {
    let response: OsrmResponse =
        serde_json::from_slice(body).map_err(|e| ProviderError::Decode(e.to_string()))?;

    if let Some(code) = response.code.as_deref() {
        if code != "Ok" {
            debug!(code = %code, "osrm_non_ok_code");
            return Err(ProviderError::NoRoutes);
        }
    }

    let routes: Vec<RouteAlternative> = response
        .routes
        .into_iter()
        .map(|r| RouteAlternative {
            geometry: r.geometry.coordinates.iter().map(|[lng, lat]| LatLng::new(*lat, *lng)).collect(),
            distance_meters: r.distance,
            duration_seconds: r.duration,
        })
        .collect();

    if routes.is_empty() {
        return Err(ProviderError::NoRoutes);
    }
    Ok(routes)
}

/// OSRM `route` service client (walking profile by default)
pub struct OsrmClient {
    base_url: String,
    profile: String,
    http_client: reqwest::Client,
}

impl OsrmClient {
    pub fn new(base_url: &str, profile: &str, timeout: Duration) -> Result<Self, ProviderError> {
        // Create HTTP client once for reuse (connection pooling)
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            profile: profile.to_string(),
            http_client,
        })
    }

    fn route_url(&self, start: LatLng, end: LatLng) -> String {
        format!(
            "{}/route/v1/{}/{},{};{},{}?overview=full&geometries=geojson&alternatives=true",
            self.base_url, self.profile, start.lng, start.lat, end.lng, end.lat
        )
    }
}

#[async_trait]
impl RouteProvider for OsrmClient {
    async fn alternatives(
        &self,
        start: LatLng,
        end: LatLng,
    ) -> Result<Vec<RouteAlternative>, ProviderError> {
        let url = self.route_url(start, end);
        let request_start = Instant::now();

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(request_start.elapsed())
            } else {
                ProviderError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| ProviderError::Request(e.to_string()))?;
        let routes = parse_osrm_routes(&body)?;

        debug!(
            routes = %routes.len(),
            latency_ms = %request_start.elapsed().as_millis(),
            "osrm_routes_received"
        );
        Ok(routes)
    }
}
