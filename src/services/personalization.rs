//! Personalized comfort score
//!
//! Collapses a multi-dimensional reading to one value in 0..=10 by averaging the
//! present dimensions weighted by the user's thresholds (`threshold / 10`).

use crate::domain::profile::SensitivityProfile;
use crate::domain::types::Dimensions;

/// Personalized score of `reading` under `profile`
///
/// Returns 0 when no dimension is present or every present dimension has weight 0.
pub fn personalize(reading: &Dimensions<f64>, profile: &SensitivityProfile) -> f64 {
    let mut total_score = 0.0;
    let mut total_weight = 0.0;

    for (dimension, value) in reading.present() {
        let weight = profile.weight(dimension);
        total_score += value * weight;
        total_weight += weight;
    }

    if total_weight > 0.0 {
        total_score / total_weight
    } else {
        0.0
    }
}

/// Personalized score of a single report's raw values
#[inline]
pub fn personalize_values(values: &Dimensions<u8>, profile: &SensitivityProfile) -> f64 {
    personalize(&values.map(f64::from), profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(noise: Option<f64>, light: Option<f64>, odor: Option<f64>, crowd: Option<f64>) -> Dimensions<f64> {
        Dimensions { noise, light, odor, crowd }
    }

    #[test]
    fn test_default_profile_is_plain_mean() {
        let r = reading(Some(8.0), Some(2.0), None, None);
        let score = personalize(&r, &SensitivityProfile::default());
        assert!((score - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_zero_thresholds_score_zero() {
        let profile = SensitivityProfile::from_thresholds(0, 0, 0, 0).unwrap();
        let r = reading(Some(9.0), Some(7.0), Some(3.0), Some(10.0));
        assert_eq!(personalize(&r, &profile), 0.0);
    }

    #[test]
    fn test_empty_reading_scores_zero() {
        assert_eq!(personalize(&Dimensions::empty(), &SensitivityProfile::default()), 0.0);
    }

    #[test]
    fn test_zero_threshold_ignores_dimension() {
        let profile = SensitivityProfile::from_thresholds(0, 10, 5, 5).unwrap();
        let r = reading(Some(10.0), Some(2.0), None, None);
        assert!((personalize(&r, &profile) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_weights_shift_the_mean() {
        // noise 10 weighted 1.0, crowd 0 weighted 0.5 -> 10 / 1.5
        let profile = SensitivityProfile::from_thresholds(10, 5, 5, 5).unwrap();
        let r = reading(Some(10.0), None, None, Some(0.0));
        assert!((personalize(&r, &profile) - 6.666_666).abs() < 1e-5);
    }

    #[test]
    fn test_personalize_values() {
        let values = Dimensions { odor: Some(4u8), crowd: Some(6u8), ..Dimensions::empty() };
        let score = personalize_values(&values, &SensitivityProfile::default());
        assert!((score - 5.0).abs() < 1e-12);
    }
}
