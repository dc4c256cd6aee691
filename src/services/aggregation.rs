//! Per-cell aggregation of active reports
//!
//! Only reports whose decay weight exceeds the active floor take part. Each
//! dimension is the weighted mean over the reports that actually supplied it.

use crate::domain::types::{Dimension, Dimensions, SensoryReport};
use crate::services::decay::{decay_weight, is_active};
use crate::services::store::GridCell;
use serde::Serialize;

/// Decay-weighted reading of one cell at one instant
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedReading {
    /// Weighted mean per dimension, only for dimensions some active report supplied
    pub dimensions: Dimensions<f64>,
    /// Sum of the weights of all participating reports
    pub total_weight: f64,
    pub has_wheelchair_issue: bool,
    /// Number of participating reports
    pub report_count: usize,
}

#[derive(Default, Clone, Copy)]
struct Accumulator {
    weighted_sum: f64,
    weight: f64,
}

/// Aggregate a cell at `now_ms`; `None` when no report is active
pub fn aggregate(cell: &GridCell, now_ms: u64) -> Option<AggregatedReading> {
    aggregate_reports(cell.reports(), now_ms)
}

/// Aggregate an arbitrary report slice at `now_ms`
pub fn aggregate_reports(reports: &[SensoryReport], now_ms: u64) -> Option<AggregatedReading> {
    let mut acc = [Accumulator::default(); 4];
    let mut total_weight = 0.0;
    let mut has_wheelchair_issue = false;
    let mut report_count = 0;

    for report in reports {
        let w = decay_weight(report, now_ms);
        if !is_active(w) {
            continue;
        }

        for (dimension, value) in report.values.present() {
            let entry = &mut acc[slot(dimension)];
            entry.weighted_sum += f64::from(value) * w;
            entry.weight += w;
        }
        total_weight += w;
        has_wheelchair_issue |= report.wheelchair_issue;
        report_count += 1;
    }

    if report_count == 0 {
        return None;
    }

    let mut dimensions = Dimensions::empty();
    for dimension in Dimension::ALL {
        let a = acc[slot(dimension)];
        if a.weight > 0.0 {
            dimensions.set(dimension, Some(a.weighted_sum / a.weight));
        }
    }

    Some(AggregatedReading { dimensions, total_weight, has_wheelchair_issue, report_count })
}

#[inline]
fn slot(dimension: Dimension) -> usize {
    match dimension {
        Dimension::Noise => 0,
        Dimension::Light => 1,
        Dimension::Odor => 2,
        Dimension::Crowd => 3,
    }
}
