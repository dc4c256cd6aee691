//! Time-decay weighting of sensory reports
//!
//! `weight = exp(-rate * age_hours / max_age_hours)` until the report reaches its
//! category's maximum age, then 0.

use crate::domain::types::{Category, SensoryReport};

/// Reports at or under this weight are removed by compaction
pub const EXPIRY_WEIGHT: f64 = 0.01;

/// Reports must weigh more than this to take part in any aggregate
pub const ACTIVE_WEIGHT_FLOOR: f64 = 0.1;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Decay parameters for one category
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayParams {
    pub max_age_hours: f64,
    pub decay_rate: f64,
}

impl DecayParams {
    pub const fn for_category(category: Category) -> Self {
        match category {
            Category::Irregular => Self { max_age_hours: 6.0, decay_rate: 0.8 },
            Category::Regular => Self { max_age_hours: 168.0, decay_rate: 0.3 },
        }
    }

    /// Weight for a report `age_hours` old
    ///
    /// Negative ages (clock skew, reports stamped in the future) count as fresh.
    #[inline]
    pub fn weight_at(&self, age_hours: f64) -> f64 {
        let age_hours = age_hours.max(0.0);
        if age_hours >= self.max_age_hours {
            return 0.0;
        }
        (-self.decay_rate * age_hours / self.max_age_hours).exp()
    }
}

/// Age of a report at `now_ms`, in hours
#[inline]
pub fn age_hours(report: &SensoryReport, now_ms: u64) -> f64 {
    (now_ms as f64 - report.timestamp as f64) / MS_PER_HOUR
}

/// Freshness weight in [0, 1] of `report` at `now_ms`
#[inline]
pub fn decay_weight(report: &SensoryReport, now_ms: u64) -> f64 {
    DecayParams::for_category(report.category).weight_at(age_hours(report, now_ms))
}

/// True when the report still contributes to aggregates and route scores
#[inline]
pub fn is_active(weight: f64) -> bool {
    weight > ACTIVE_WEIGHT_FLOOR
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Dimensions, ReportId};

    const HOUR_MS: u64 = 3_600_000;

    fn report(category: Category, timestamp: u64) -> SensoryReport {
        SensoryReport {
            id: ReportId(timestamp),
            timestamp,
            category,
            values: Dimensions { noise: Some(8), ..Dimensions::empty() },
            duration_minutes: 30,
            wheelchair_issue: false,
        }
    }

    #[test]
    fn test_fresh_report_weighs_one() {
        let r = report(Category::Irregular, 1_000);
        assert_eq!(decay_weight(&r, 1_000), 1.0);
        let r = report(Category::Regular, 1_000);
        assert_eq!(decay_weight(&r, 1_000), 1.0);
    }

    #[test]
    fn test_irregular_three_hours() {
        let r = report(Category::Irregular, 0);
        let w = decay_weight(&r, 3 * HOUR_MS);
        assert!((w - (-0.4f64).exp()).abs() < 1e-12);
        assert!((w - 0.6703).abs() < 1e-4);
        assert!(is_active(w));
    }

    #[test]
    fn test_expiry_at_max_age() {
        let irregular = report(Category::Irregular, 0);
        assert_eq!(decay_weight(&irregular, 6 * HOUR_MS), 0.0);
        assert_eq!(decay_weight(&irregular, 7 * HOUR_MS), 0.0);
        assert!(decay_weight(&irregular, 6 * HOUR_MS - 1) > 0.0);

        let regular = report(Category::Regular, 0);
        assert_eq!(decay_weight(&regular, 168 * HOUR_MS), 0.0);
        assert!(decay_weight(&regular, 167 * HOUR_MS) > 0.0);
    }

    #[test]
    fn test_strictly_decreasing_and_bounded() {
        for category in [Category::Irregular, Category::Regular] {
            let r = report(category, 0);
            let max_ms = (DecayParams::for_category(category).max_age_hours * MS_PER_HOUR) as u64;
            let step = max_ms / 200;
            let mut previous = f64::INFINITY;
            let mut t = 0;
            while t < max_ms {
                let w = decay_weight(&r, t);
                assert!((0.0..=1.0).contains(&w));
                assert!(w < previous, "not decreasing at {t} ms for {category:?}");
                previous = w;
                t += step;
            }
        }
    }

    #[test]
    fn test_future_timestamp_counts_as_fresh() {
        let r = report(Category::Irregular, 10 * HOUR_MS);
        assert_eq!(decay_weight(&r, 9 * HOUR_MS), 1.0);
    }

    #[test]
    fn test_irregular_stays_active_until_expiry() {
        // exp(-0.8) ~ 0.449 at the last instant, so irregular reports stay active to the end
        let r = report(Category::Irregular, 0);
        assert!(is_active(decay_weight(&r, 6 * HOUR_MS - 1)));
    }
}
