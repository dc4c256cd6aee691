//! Read-only map views over the store: heat points, cell markers and cell detail
//!
//! All views aggregate each cell at the same instant and skip cells with no
//! active report.

use crate::domain::profile::SensitivityProfile;
use crate::domain::types::{Bounds, CellKey, Dimension, Dimensions, LatLng, SensoryReport};
use crate::services::aggregation::{aggregate, AggregatedReading};
use crate::services::decay::{age_hours, decay_weight};
use crate::services::personalization::personalize;
use crate::services::store::{GridCell, ReportStore};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Default heat intensity scale
pub const DEFAULT_INTENSITY: f64 = 0.7;

/// Lowest and highest normalized heat value
const MIN_HEAT: f64 = 0.1;
const MAX_HEAT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatPoint {
    pub lat: f64,
    pub lng: f64,
    /// Normalized to [0.1, 1.0]
    pub intensity: f64,
}

/// Which value a marker shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensoryFilter {
    /// Personalized score over all dimensions
    #[default]
    All,
    /// Raw aggregated value of one dimension
    Only(Dimension),
}

impl std::str::FromStr for SensoryFilter {
    type Err = crate::domain::types::ParseDimensionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "all" => Ok(SensoryFilter::All),
            other => other.parse().map(SensoryFilter::Only),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellMarker {
    pub cell: CellKey,
    pub center: LatLng,
    /// Personalized score, or the filtered dimension's aggregated value
    pub score: f64,
    pub dimensions: Dimensions<f64>,
    pub wheelchair: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    #[serde(flatten)]
    pub report: SensoryReport,
    /// Report timestamp as RFC 3339
    pub created_at: Option<DateTime<Utc>>,
    pub weight: f64,
    pub age_hours: f64,
}

/// Everything known about one cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellDetail {
    pub cell: CellKey,
    pub bounds: Bounds,
    /// `None` when the cell has reports but none is active
    pub reading: Option<AggregatedReading>,
    pub personalized_score: Option<f64>,
    pub reports: Vec<ReportView>,
}

fn active_cells(store: &ReportStore, now_ms: u64) -> impl Iterator<Item = (&GridCell, AggregatedReading)> {
    store.cells().filter_map(move |cell| aggregate(cell, now_ms).map(|reading| (cell, reading)))
}

/// Heat points at cell centers, scaled against the highest personalized score
///
/// With a zero maximum every point gets `0.1 * intensity`, clamped to the floor.
pub fn heat_points(
    store: &ReportStore,
    profile: &SensitivityProfile,
    intensity: f64,
    now_ms: u64,
) -> Vec<HeatPoint> {
    let raw: Vec<(LatLng, f64)> = active_cells(store, now_ms)
        .map(|(cell, reading)| (cell.bounds().center(), personalize(&reading.dimensions, profile)))
        .collect();

    let max_score = raw.iter().map(|(_, score)| *score).fold(0.0, f64::max);

    raw.into_iter()
        .map(|(center, score)| {
            let normalized =
                if max_score > 0.0 { score / max_score * intensity } else { MIN_HEAT * intensity };
            HeatPoint { lat: center.lat, lng: center.lng, intensity: normalized.clamp(MIN_HEAT, MAX_HEAT) }
        })
        .collect()
}

/// One marker per active cell, ordered by cell key
///
/// A dimension filter drops cells whose aggregate lacks that dimension or has it at 0.
pub fn cell_markers(
    store: &ReportStore,
    profile: &SensitivityProfile,
    filter: SensoryFilter,
    now_ms: u64,
) -> Vec<CellMarker> {
    let mut markers: Vec<CellMarker> = active_cells(store, now_ms)
        .filter_map(|(cell, reading)| {
            let score = match filter {
                SensoryFilter::All => personalize(&reading.dimensions, profile),
                SensoryFilter::Only(dimension) => {
                    reading.dimensions.get(dimension).filter(|v| *v != 0.0)?
                }
            };
            Some(CellMarker {
                cell: cell.key(),
                center: cell.bounds().center(),
                score,
                dimensions: reading.dimensions,
                wheelchair: reading.has_wheelchair_issue,
            })
        })
        .collect();

    markers.sort_by_key(|m| m.cell);
    markers
}

/// Detail view of one cell; `None` when the cell holds no report
pub fn cell_detail(
    store: &ReportStore,
    key: CellKey,
    profile: &SensitivityProfile,
    now_ms: u64,
) -> Option<CellDetail> {
    let cell = store.get(key)?;
    let reading = aggregate(cell, now_ms);
    let personalized_score = reading.as_ref().map(|r| personalize(&r.dimensions, profile));

    let reports = cell
        .reports()
        .iter()
        .map(|report| ReportView {
            report: report.clone(),
            created_at: DateTime::from_timestamp_millis(report.timestamp as i64),
            weight: decay_weight(report, now_ms),
            age_hours: age_hours(report, now_ms).max(0.0),
        })
        .collect();

    Some(CellDetail { cell: key, bounds: cell.bounds(), reading, personalized_score, reports })
}
