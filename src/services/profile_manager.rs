//! Sensitivity profile ownership
//!
//! The profile is read by every view and route plan and replaced only through
//! `update`, which validates first and persists after.

use crate::domain::profile::{ProfileError, SensitivityProfile};
use crate::io::persistence::Persistence;
use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Requested thresholds; omitted fields keep their current value
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub noise_threshold: Option<i64>,
    pub light_threshold: Option<i64>,
    pub odor_threshold: Option<i64>,
    pub crowd_threshold: Option<i64>,
}

pub struct ProfileManager {
    current: RwLock<SensitivityProfile>,
    persistence: Option<Arc<Persistence>>,
}

impl ProfileManager {
    pub fn new(initial: SensitivityProfile) -> Self {
        Self { current: RwLock::new(initial), persistence: None }
    }

    pub fn with_persistence(mut self, persistence: Arc<Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Copy of the current profile
    pub fn get(&self) -> SensitivityProfile {
        *self.current.read()
    }

    /// Apply `update` atomically; on error the profile is unchanged
    ///
    /// The file is written before the lock is released so concurrent updates reach
    /// disk in the order they were applied.
    pub fn update(&self, update: &ProfileUpdate) -> Result<SensitivityProfile, ProfileError> {
        let updated = {
            let mut current = self.current.write();
            let next = SensitivityProfile::from_thresholds(
                update.noise_threshold.unwrap_or(i64::from(current.noise_threshold)),
                update.light_threshold.unwrap_or(i64::from(current.light_threshold)),
                update.odor_threshold.unwrap_or(i64::from(current.odor_threshold)),
                update.crowd_threshold.unwrap_or(i64::from(current.crowd_threshold)),
            )?;
            *current = next;
            if let Some(persistence) = &self.persistence {
                if let Err(e) = persistence.save_profile(&next) {
                    warn!(error = %e, "profile_write_failed");
                }
            }
            next
        };

        info!(
            noise = %updated.noise_threshold,
            light = %updated.light_threshold,
            odor = %updated.odor_threshold,
            crowd = %updated.crowd_threshold,
            "profile_updated"
        );

        Ok(updated)
    }
}

impl Default for ProfileManager {
    fn default() -> Self {
        Self::new(SensitivityProfile::default())
    }
}
