//! User sensitivity profile

use crate::domain::types::Dimension;
use serde::{Deserialize, Serialize};

/// Threshold assigned to every dimension when nothing has been saved
pub const DEFAULT_THRESHOLD: u8 = 5;

/// Highest accepted threshold (and highest sensory value)
pub const MAX_THRESHOLD: u8 = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("{dimension} threshold {value} is outside 0..=10")]
    OutOfRange { dimension: &'static str, value: i64 },
}

/// Per-dimension sensitivity, each in 0..=10
///
/// A threshold of 0 makes the dimension irrelevant to the user, 10 gives it
/// full weight in the personalized score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityProfile {
    pub noise_threshold: u8,
    pub light_threshold: u8,
    pub odor_threshold: u8,
    pub crowd_threshold: u8,
}

impl Default for SensitivityProfile {
    fn default() -> Self {
        Self {
            noise_threshold: DEFAULT_THRESHOLD,
            light_threshold: DEFAULT_THRESHOLD,
            odor_threshold: DEFAULT_THRESHOLD,
            crowd_threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl SensitivityProfile {
    /// Build a profile from raw thresholds, rejecting anything outside 0..=10
    pub fn from_thresholds(noise: i64, light: i64, odor: i64, crowd: i64) -> Result<Self, ProfileError> {
        Ok(Self {
            noise_threshold: checked_threshold(Dimension::Noise, noise)?,
            light_threshold: checked_threshold(Dimension::Light, light)?,
            odor_threshold: checked_threshold(Dimension::Odor, odor)?,
            crowd_threshold: checked_threshold(Dimension::Crowd, crowd)?,
        })
    }

    pub fn threshold(&self, dimension: Dimension) -> u8 {
        match dimension {
            Dimension::Noise => self.noise_threshold,
            Dimension::Light => self.light_threshold,
            Dimension::Odor => self.odor_threshold,
            Dimension::Crowd => self.crowd_threshold,
        }
    }

    /// Weight in [0, 1] applied to a dimension when personalizing
    #[inline]
    pub fn weight(&self, dimension: Dimension) -> f64 {
        f64::from(self.threshold(dimension)) / f64::from(MAX_THRESHOLD)
    }

    /// True when every threshold is within 0..=10
    pub fn is_valid(&self) -> bool {
        Dimension::ALL.iter().all(|d| self.threshold(*d) <= MAX_THRESHOLD)
    }
}

fn checked_threshold(dimension: Dimension, value: i64) -> Result<u8, ProfileError> {
    if (0..=i64::from(MAX_THRESHOLD)).contains(&value) {
        Ok(value as u8)
    } else {
        Err(ProfileError::OutOfRange { dimension: dimension.as_str(), value })
    }
}
