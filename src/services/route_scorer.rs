//! Route scoring and selection
//!
//! Protocol:
//! 1. Fetch alternatives from the routing provider (bounded by a timeout). Any
//!    failure, timeout or empty answer becomes one straight-line alternative.
//! 2. Score each alternative: every vertex except the last is resolved to its grid
//!    cell; a cell with active reports costs the decay-weighted mean of the
//!    per-report personalized scores, otherwise 2.5. The route's sensory score is
//!    the mean of those costs.
//! 3. Blend the sensory score with travel time per route type.
//! 4. Keep the first alternative with the strictly lowest composite cost.
//!
//! Note the order in step 2: reports are personalized first and then averaged,
//! unlike the map views which average per dimension and personalize the result.

use crate::domain::profile::SensitivityProfile;
use crate::domain::route::{RouteAlternative, RouteSource, RouteType, ScoredRoute};
use crate::domain::types::LatLng;
use crate::infra::metrics::Metrics;
use crate::io::routing::{ProviderError, RouteProvider};
use crate::services::decay::{decay_weight, is_active};
use crate::services::grid::haversine_distance;
use crate::services::personalization::personalize_values;
use crate::services::store::{GridCell, ReportStore, SharedStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Cost of a sampled point whose cell has no active report
pub const NEUTRAL_SEGMENT_COST: f64 = 2.5;

/// Assumed walking speed for the straight-line fallback, m/s
pub const DEFAULT_WALKING_SPEED_MPS: f64 = 1.4;

/// Duration used when an alternative carries none
pub const DEFAULT_ROUTE_DURATION_SECS: f64 = 600.0;

/// Default provider timeout
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RouteError {
    #[error("route start point is not set")]
    MissingStart,
    #[error("route end point is not set")]
    MissingEnd,
    #[error("route point {0} is not a valid latitude/longitude")]
    InvalidLocation(LatLng),
    #[error("no route alternatives to choose from")]
    NoAlternatives,
}

/// Cost of one sampled point given its cell (if any)
pub fn segment_cost(cell: Option<&GridCell>, profile: &SensitivityProfile, now_ms: u64) -> f64 {
    let Some(cell) = cell else {
        return NEUTRAL_SEGMENT_COST;
    };

    let mut weighted_score = 0.0;
    let mut total_weight = 0.0;
    for report in cell.reports() {
        let w = decay_weight(report, now_ms);
        if is_active(w) {
            weighted_score += personalize_values(&report.values, profile) * w;
            total_weight += w;
        }
    }

    if total_weight > 0.0 {
        weighted_score / total_weight
    } else {
        NEUTRAL_SEGMENT_COST
    }
}

/// Mean sampled cost along `geometry`; 2.5 when there are fewer than two points
pub fn route_sensory_score(
    store: &ReportStore,
    geometry: &[LatLng],
    profile: &SensitivityProfile,
    now_ms: u64,
) -> f64 {
    if geometry.len() < 2 {
        return NEUTRAL_SEGMENT_COST;
    }

    // Sample each vertex that starts a segment
    let samples = &geometry[..geometry.len() - 1];
    let total: f64 =
        samples.iter().map(|point| segment_cost(store.cell_at(*point), profile, now_ms)).sum();
    total / samples.len() as f64
}

/// Composite ranking cost; lower is better
pub fn composite_cost(route_type: &RouteType, sensory_score: f64, duration_seconds: f64) -> f64 {
    match route_type {
        RouteType::Sensory => sensory_score * 0.7 + duration_seconds * 0.0003,
        RouteType::Time => duration_seconds * 0.0008 + sensory_score * 0.2,
        RouteType::Balanced | RouteType::Unrecognized(_) => {
            sensory_score * 0.5 + duration_seconds * 0.0005
        }
    }
}

#[inline]
fn effective_duration(route: &RouteAlternative) -> f64 {
    if route.duration_seconds.is_finite() && route.duration_seconds > 0.0 {
        route.duration_seconds
    } else {
        DEFAULT_ROUTE_DURATION_SECS
    }
}

/// Score every alternative and return the earliest one with the lowest composite cost
pub fn select_best_route(
    store: &ReportStore,
    alternatives: Vec<RouteAlternative>,
    route_type: RouteType,
    profile: &SensitivityProfile,
    now_ms: u64,
    source: RouteSource,
) -> Result<ScoredRoute, RouteError> {
    let mut best: Option<(usize, f64, f64)> = None;
    let mut best_cost = f64::INFINITY;

    for (index, route) in alternatives.iter().enumerate() {
        let sensory_score = route_sensory_score(store, &route.geometry, profile, now_ms);
        let total_score = composite_cost(&route_type, sensory_score, effective_duration(route));

        debug!(
            index = %index,
            sensory_score = %sensory_score,
            total_score = %total_score,
            route_type = %route_type.as_str(),
            "route_alternative_scored"
        );

        if total_score < best_cost {
            best_cost = total_score;
            best = Some((index, sensory_score, total_score));
        }
    }

    let (index, sensory_score, total_score) = match best {
        Some(winner) => winner,
        // Every cost was NaN; keep the provider's first choice, scored as-is
        None => {
            let first = alternatives.first().ok_or(RouteError::NoAlternatives)?;
            let sensory_score = route_sensory_score(store, &first.geometry, profile, now_ms);
            (0, sensory_score, composite_cost(&route_type, sensory_score, effective_duration(first)))
        }
    };

    let route = alternatives.into_iter().nth(index).ok_or(RouteError::NoAlternatives)?;
    Ok(ScoredRoute { route, route_type, sensory_score, total_score, index, source })
}

/// Straight line from `start` to `end` walked at `walking_speed_mps`
pub fn fallback_route(start: LatLng, end: LatLng, walking_speed_mps: f64) -> RouteAlternative {
    let distance = haversine_distance(start, end);
    RouteAlternative {
        geometry: vec![start, end],
        distance_meters: distance,
        duration_seconds: distance / walking_speed_mps,
    }
}

/// A route planning request; either endpoint may still be unset
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub start: Option<LatLng>,
    pub end: Option<LatLng>,
    pub route_type: RouteType,
}

/// Plans routes against the shared store using a routing provider
pub struct RoutePlanner {
    provider: Arc<dyn RouteProvider>,
    store: SharedStore,
    timeout: Duration,
    walking_speed_mps: f64,
    metrics: Arc<Metrics>,
}

impl RoutePlanner {
    pub fn new(provider: Arc<dyn RouteProvider>, store: SharedStore, metrics: Arc<Metrics>) -> Self {
        Self {
            provider,
            store,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
            walking_speed_mps: DEFAULT_WALKING_SPEED_MPS,
            metrics,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_walking_speed(mut self, walking_speed_mps: f64) -> Self {
        self.walking_speed_mps = walking_speed_mps;
        self
    }

    /// Provider alternatives, or the straight-line fallback on any failure
    pub async fn acquire_alternatives(
        &self,
        start: LatLng,
        end: LatLng,
    ) -> (Vec<RouteAlternative>, RouteSource) {
        let result = match tokio::time::timeout(self.timeout, self.provider.alternatives(start, end)).await
        {
            Ok(Ok(routes)) if !routes.is_empty() => Ok(routes),
            Ok(Ok(_)) => Err(ProviderError::NoRoutes),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProviderError::Timeout(self.timeout)),
        };

        match result {
            Ok(routes) => (routes, RouteSource::Provider),
            Err(e) => {
                warn!(error = %e, start = %start, end = %end, "route_provider_failed_using_fallback");
                (vec![fallback_route(start, end, self.walking_speed_mps)], RouteSource::Fallback)
            }
        }
    }

    /// Fetch, score and select the best route for `request`
    pub async fn plan(
        &self,
        request: RouteRequest,
        profile: &SensitivityProfile,
        now_ms: u64,
    ) -> Result<ScoredRoute, RouteError> {
        let start = request.start.ok_or(RouteError::MissingStart)?;
        let end = request.end.ok_or(RouteError::MissingEnd)?;
        if let Some(invalid) = [start, end].into_iter().find(|p| !p.is_valid()) {
            return Err(RouteError::InvalidLocation(invalid));
        }
        let plan_start = Instant::now();

        // No lock held across the network call
        let (alternatives, source) = self.acquire_alternatives(start, end).await;
        let alternative_count = alternatives.len();

        let scored = {
            let store = self.store.read();
            select_best_route(&store, alternatives, request.route_type, profile, now_ms, source)?
        };

        let latency_us = plan_start.elapsed().as_micros() as u64;
        self.metrics.record_route(latency_us, source == RouteSource::Fallback);

        info!(
            route_type = %scored.route_type.as_str(),
            alternatives = %alternative_count,
            selected = %scored.index,
            sensory_score = %format!("{:.3}", scored.sensory_score),
            total_score = %format!("{:.3}", scored.total_score),
            source = ?scored.source,
            latency_us = %latency_us,
            "route_planned"
        );
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Category, Dimensions, ReportId, SensoryReport};
    use crate::services::grid::DEFAULT_CELL_SIZE_M;
    use async_trait::async_trait;

    const NOW: u64 = 1_000 * 3_600_000;

    fn noise_report(id: u64, noise: u8, timestamp: u64) -> SensoryReport {
        SensoryReport {
            id: ReportId(id),
            timestamp,
            category: Category::Irregular,
            values: Dimensions { noise: Some(noise), ..Dimensions::empty() },
            duration_minutes: 30,
            wheelchair_issue: false,
        }
    }

    fn straight(duration_seconds: f64) -> RouteAlternative {
        RouteAlternative {
            geometry: vec![LatLng::new(37.5665, 126.9780), LatLng::new(37.5670, 126.9790)],
            distance_meters: 100.0,
            duration_seconds,
        }
    }

    #[test]
    fn test_empty_store_scores_neutral() {
        let store = ReportStore::new(DEFAULT_CELL_SIZE_M);
        let geometry = vec![LatLng::new(0.0, 0.0), LatLng::new(0.001, 0.001), LatLng::new(0.002, 0.0)];
        let score = route_sensory_score(&store, &geometry, &SensitivityProfile::default(), NOW);
        assert_eq!(score, NEUTRAL_SEGMENT_COST);
        assert_eq!(
            route_sensory_score(&store, &geometry[..1], &SensitivityProfile::default(), NOW),
            NEUTRAL_SEGMENT_COST
        );
    }

    #[test]
    fn test_last_vertex_is_not_sampled() {
        let mut store = ReportStore::new(DEFAULT_CELL_SIZE_M);
        let quiet = LatLng::new(37.5, 127.0);
        let loud = LatLng::new(37.6, 127.1);
        store.insert(loud, noise_report(1, 10, NOW));

        let profile = SensitivityProfile::default();
        // Loud cell only at the final vertex: ignored
        assert_eq!(route_sensory_score(&store, &[quiet, loud], &profile, NOW), NEUTRAL_SEGMENT_COST);
        // Loud cell at the first vertex: mean of 10 and 2.5
        let score = route_sensory_score(&store, &[loud, quiet, loud], &profile, NOW);
        assert!((score - 6.25).abs() < 1e-12);
    }

    #[test]
    fn test_segment_cost_personalizes_per_report() {
        let mut store = ReportStore::new(DEFAULT_CELL_SIZE_M);
        let point = LatLng::new(37.5665, 126.9780);
        let mut both = noise_report(1, 10, NOW);
        both.values.light = Some(0);
        store.insert(point, both);
        store.insert(point, noise_report(2, 4, NOW));

        // Report 1 personalizes to 5, report 2 to 4; equal weights -> 4.5
        let cost = segment_cost(store.cell_at(point), &SensitivityProfile::default(), NOW);
        assert!((cost - 4.5).abs() < 1e-12);
    }

    #[test]
    fn test_segment_cost_ignores_inactive_reports() {
        let mut store = ReportStore::new(DEFAULT_CELL_SIZE_M);
        let point = LatLng::new(37.5665, 126.9780);
        store.insert(point, noise_report(1, 9, NOW - 6 * 3_600_000));

        let cost = segment_cost(store.cell_at(point), &SensitivityProfile::default(), NOW);
        assert_eq!(cost, NEUTRAL_SEGMENT_COST);
    }

    #[test]
    fn test_composite_cost_policies() {
        assert!((composite_cost(&RouteType::Sensory, 4.0, 1000.0) - 3.1).abs() < 1e-12);
        assert!((composite_cost(&RouteType::Balanced, 4.0, 1000.0) - 2.5).abs() < 1e-12);
        assert!((composite_cost(&RouteType::Time, 4.0, 1000.0) - 1.6).abs() < 1e-12);
        assert_eq!(
            composite_cost(&RouteType::Unrecognized("x".into()), 4.0, 1000.0),
            composite_cost(&RouteType::Balanced, 4.0, 1000.0)
        );
    }

    #[test]
    fn test_selection_keeps_first_minimum() {
        let store = ReportStore::new(DEFAULT_CELL_SIZE_M);
        // Empty store: sensory 2.5 everywhere, balanced cost = 1.25 + d * 0.0005
        // Durations chosen for costs [5.0, 3.0, 3.0]
        let alternatives = vec![straight(7500.0), straight(3500.0), straight(3500.0)];

        let best = select_best_route(
            &store,
            alternatives,
            RouteType::Balanced,
            &SensitivityProfile::default(),
            NOW,
            RouteSource::Provider,
        )
        .unwrap();

        assert_eq!(best.index, 1);
        assert!((best.total_score - 3.0).abs() < 1e-9);
        assert_eq!(best.sensory_score, NEUTRAL_SEGMENT_COST);
        assert_eq!(best.route_type, RouteType::Balanced);
    }

    #[test]
    fn test_selection_prefers_quiet_route_in_sensory_mode() {
        let mut store = ReportStore::new(DEFAULT_CELL_SIZE_M);
        let loud = LatLng::new(37.5665, 126.9780);
        store.insert(loud, noise_report(1, 10, NOW));

        let loud_route = RouteAlternative {
            geometry: vec![loud, LatLng::new(37.57, 126.98)],
            distance_meters: 500.0,
            duration_seconds: 300.0,
        };
        let quiet_route = RouteAlternative {
            geometry: vec![LatLng::new(37.56, 126.97), LatLng::new(37.57, 126.98)],
            distance_meters: 4200.0,
            duration_seconds: 3000.0,
        };

        let profile = SensitivityProfile::default();
        let sensory = select_best_route(
            &store,
            vec![loud_route.clone(), quiet_route.clone()],
            RouteType::Sensory,
            &profile,
            NOW,
            RouteSource::Provider,
        )
        .unwrap();
        assert_eq!(sensory.index, 1);

        // Time mode: 300 * 0.0008 + 10 * 0.2 = 2.24 vs 3000 * 0.0008 + 2.5 * 0.2 = 2.9
        let time = select_best_route(
            &store,
            vec![loud_route, quiet_route],
            RouteType::Time,
            &profile,
            NOW,
            RouteSource::Provider,
        )
        .unwrap();
        assert_eq!(time.index, 0);
    }

    #[test]
    fn test_missing_duration_uses_default() {
        let store = ReportStore::new(DEFAULT_CELL_SIZE_M);
        let best = select_best_route(
            &store,
            vec![straight(0.0)],
            RouteType::Balanced,
            &SensitivityProfile::default(),
            NOW,
            RouteSource::Provider,
        )
        .unwrap();
        assert!((best.total_score - (1.25 + 600.0 * 0.0005)).abs() < 1e-12);
    }

    #[test]
    fn test_select_from_nothing() {
        let store = ReportStore::new(DEFAULT_CELL_SIZE_M);
        let result = select_best_route(
            &store,
            vec![],
            RouteType::Sensory,
            &SensitivityProfile::default(),
            NOW,
            RouteSource::Provider,
        );
        assert_eq!(result, Err(RouteError::NoAlternatives));
    }

    #[test]
    fn test_fallback_route() {
        let start = LatLng::new(37.5665, 126.9780);
        let end = LatLng::new(37.5765, 126.9780);
        let route = fallback_route(start, end, DEFAULT_WALKING_SPEED_MPS);
        assert_eq!(route.geometry, vec![start, end]);
        assert!((route.distance_meters - 1111.95).abs() < 0.1);
        assert!((route.duration_seconds - route.distance_meters / 1.4).abs() < 1e-9);
    }

    struct FailingProvider;

    #[async_trait]
    impl RouteProvider for FailingProvider {
        async fn alternatives(
            &self,
            _start: LatLng,
            _end: LatLng,
        ) -> Result<Vec<RouteAlternative>, ProviderError> {
            Err(ProviderError::Request("connection refused".to_string()))
        }
    }

    struct EmptyProvider;

    #[async_trait]
    impl RouteProvider for EmptyProvider {
        async fn alternatives(
            &self,
            _start: LatLng,
            _end: LatLng,
        ) -> Result<Vec<RouteAlternative>, ProviderError> {
            Ok(vec![])
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl RouteProvider for SlowProvider {
        async fn alternatives(
            &self,
            start: LatLng,
            end: LatLng,
        ) -> Result<Vec<RouteAlternative>, ProviderError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![RouteAlternative {
                geometry: vec![start, end],
                distance_meters: 1.0,
                duration_seconds: 1.0,
            }])
        }
    }

    fn planner(provider: Arc<dyn RouteProvider>) -> RoutePlanner {
        let store = ReportStore::new(DEFAULT_CELL_SIZE_M).into_shared();
        RoutePlanner::new(provider, store, Arc::new(Metrics::new()))
    }

    fn request() -> RouteRequest {
        RouteRequest {
            start: Some(LatLng::new(37.5665, 126.9780)),
            end: Some(LatLng::new(37.5700, 126.9820)),
            route_type: RouteType::Sensory,
        }
    }

    #[tokio::test]
    async fn test_failing_provider_falls_back() {
        let planner = planner(Arc::new(FailingProvider));
        let route = planner.plan(request(), &SensitivityProfile::default(), NOW).await.unwrap();

        assert_eq!(route.source, RouteSource::Fallback);
        assert_eq!(route.route.geometry, vec![LatLng::new(37.5665, 126.9780), LatLng::new(37.5700, 126.9820)]);
        assert_eq!(route.index, 0);
    }

    #[tokio::test]
    async fn test_empty_provider_falls_back() {
        let planner = planner(Arc::new(EmptyProvider));
        let route = planner.plan(request(), &SensitivityProfile::default(), NOW).await.unwrap();
        assert_eq!(route.source, RouteSource::Fallback);
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let planner = planner(Arc::new(SlowProvider)).with_timeout(Duration::from_millis(50));
        let (routes, source) = planner
            .acquire_alternatives(LatLng::new(37.5, 127.0), LatLng::new(37.6, 127.0))
            .await;
        assert_eq!(source, RouteSource::Fallback);
        assert_eq!(routes.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_endpoints_are_validation_errors() {
        let planner = planner(Arc::new(FailingProvider));
        let profile = SensitivityProfile::default();

        let mut no_start = request();
        no_start.start = None;
        assert_eq!(planner.plan(no_start, &profile, NOW).await, Err(RouteError::MissingStart));

        let mut no_end = request();
        no_end.end = None;
        assert_eq!(planner.plan(no_end, &profile, NOW).await, Err(RouteError::MissingEnd));

        let mut off_map = request();
        off_map.end = Some(LatLng::new(95.0, 10.0));
        assert_eq!(
            planner.plan(off_map, &profile, NOW).await,
            Err(RouteError::InvalidLocation(LatLng::new(95.0, 10.0)))
        );
    }
}
