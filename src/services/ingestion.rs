//! Report ingestion - validation, id assignment and the mutation entry points
//!
//! `ReportService` is the only writer of user data into the store: submit, delete
//! by id and undo. Every successful mutation queues a grid snapshot for the writer
//! task when one is attached.

use crate::domain::types::{
    Category, CellKey, DurationInput, Dimension, Dimensions, LatLng, ReportId, SensoryReport,
};
use crate::infra::metrics::Metrics;
use crate::io::persistence::SnapshotQueue;
use crate::services::store::{ReportStore, SharedStore, StoreError};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Highest value any sensory dimension may take
pub const MAX_DIMENSION_VALUE: i64 = 10;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IngestError {
    #[error("location {0} is not a valid latitude/longitude")]
    InvalidLocation(LatLng),
    #[error("report must carry at least one sensory value")]
    NoDimensions,
    #[error("{dimension} must be between 0 and 10, got {value}")]
    ValueOutOfRange { dimension: &'static str, value: i64 },
    #[error("duration is not a whole number of minutes: {0:?}")]
    DurationNotNumeric(String),
    #[error("duration must be between 1 and {max} minutes for this report type, got {minutes}")]
    DurationOutOfRange { minutes: i64, max: u32 },
}

/// Report as submitted by a client, before validation
#[derive(Debug, Clone, Deserialize)]
pub struct ReportSubmission {
    pub location: LatLng,
    #[serde(rename = "type", alias = "category", default)]
    pub category: Category,
    #[serde(default)]
    pub noise: Option<i64>,
    #[serde(default)]
    pub light: Option<i64>,
    #[serde(default)]
    pub odor: Option<i64>,
    #[serde(default)]
    pub crowd: Option<i64>,
    #[serde(default)]
    pub duration: DurationInput,
    #[serde(default)]
    pub wheelchair: Option<bool>,
}

impl ReportSubmission {
    pub fn new(location: LatLng, category: Category) -> Self {
        Self {
            location,
            category,
            noise: None,
            light: None,
            odor: None,
            crowd: None,
            duration: DurationInput::None,
            wheelchair: None,
        }
    }

    fn raw_value(&self, dimension: Dimension) -> Option<i64> {
        match dimension {
            Dimension::Noise => self.noise,
            Dimension::Light => self.light,
            Dimension::Odor => self.odor,
            Dimension::Crowd => self.crowd,
        }
    }
}

/// Hands out strictly increasing report ids based on wall-clock milliseconds
///
/// Two submissions in the same millisecond get consecutive ids.
#[derive(Debug, Default)]
pub struct ReportIdGenerator {
    last: AtomicU64,
}

impl ReportIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue after ids already present in a loaded store
    pub fn starting_after(last: u64) -> Self {
        Self { last: AtomicU64::new(last) }
    }

    pub fn next(&self, now_ms: u64) -> ReportId {
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now_ms.max(current + 1);
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return ReportId(candidate),
                Err(actual) => current = actual,
            }
        }
    }
}

fn parse_duration(input: &DurationInput, category: Category) -> Result<u32, IngestError> {
    let max = category.max_duration_minutes();
    let minutes = match input {
        DurationInput::None => return Ok(max),
        DurationInput::Minutes(m) => *m,
        DurationInput::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(max);
            }
            trimmed
                .parse::<i64>()
                .map_err(|_| IngestError::DurationNotNumeric(text.clone()))?
        }
    };

    if minutes < 1 || minutes > i64::from(max) {
        return Err(IngestError::DurationOutOfRange { minutes, max });
    }
    Ok(minutes as u32)
}

/// Validate a submission and turn it into a stored report
///
/// Returns the submission location alongside the report so the caller can place it.
pub fn build_report(
    submission: &ReportSubmission,
    now_ms: u64,
    ids: &ReportIdGenerator,
) -> Result<(LatLng, SensoryReport), IngestError> {
    if !submission.location.is_valid() {
        return Err(IngestError::InvalidLocation(submission.location));
    }

    let mut values = Dimensions::<u8>::empty();
    for dimension in Dimension::ALL {
        if let Some(value) = submission.raw_value(dimension) {
            if !(0..=MAX_DIMENSION_VALUE).contains(&value) {
                return Err(IngestError::ValueOutOfRange { dimension: dimension.as_str(), value });
            }
            values.set(dimension, Some(value as u8));
        }
    }
    if values.is_empty() {
        return Err(IngestError::NoDimensions);
    }

    let duration_minutes = parse_duration(&submission.duration, submission.category)?;

    let report = SensoryReport {
        id: ids.next(now_ms),
        timestamp: now_ms,
        category: submission.category,
        values,
        duration_minutes,
        wheelchair_issue: submission.wheelchair.unwrap_or(false),
    };
    Ok((submission.location, report))
}

/// Where an accepted report landed
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Receipt {
    pub cell: CellKey,
    pub id: ReportId,
}

/// Mutation entry point for user reports
pub struct ReportService {
    store: SharedStore,
    ids: ReportIdGenerator,
    /// Cell of the most recent accepted submission
    last_added: Mutex<Option<CellKey>>,
    snapshots: Option<SnapshotQueue>,
    metrics: Arc<Metrics>,
}

impl ReportService {
    pub fn new(store: SharedStore, metrics: Arc<Metrics>) -> Self {
        let last_id = store
            .read()
            .cells()
            .flat_map(|c| c.reports().iter().map(|r| r.id.0))
            .max()
            .unwrap_or(0);

        Self {
            store,
            ids: ReportIdGenerator::starting_after(last_id),
            last_added: Mutex::new(None),
            snapshots: None,
            metrics,
        }
    }

    /// Queue a grid snapshot after every successful mutation
    pub fn with_snapshots(mut self, snapshots: SnapshotQueue) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn submit(&self, submission: &ReportSubmission, now_ms: u64) -> Result<Receipt, IngestError> {
        let (location, report) = match build_report(submission, now_ms, &self.ids) {
            Ok(built) => built,
            Err(e) => {
                self.metrics.record_report_rejected();
                warn!(error = %e, "report_rejected");
                return Err(e);
            }
        };

        let id = report.id;
        let cell = {
            let mut store = self.store.write();
            let cell = store.insert(location, report);
            self.queue_snapshot(&store);
            cell
        };
        *self.last_added.lock() = Some(cell);
        self.metrics.record_report_ingested();
        info!(cell = %cell, report_id = %id, category = %submission.category.as_str(), "report_ingested");

        Ok(Receipt { cell, id })
    }

    pub fn delete(&self, cell: CellKey, id: ReportId) -> Result<SensoryReport, StoreError> {
        let removed = {
            let mut store = self.store.write();
            let removed = store.delete_by_id(cell, id)?;
            self.queue_snapshot(&store);
            removed
        };
        self.metrics.record_report_deleted();
        info!(cell = %cell, report_id = %id, "report_deleted");

        Ok(removed)
    }

    /// Remove the newest report of the cell that received the last submission
    ///
    /// Undo is single-step: the remembered cell is cleared whether or not the
    /// cell still held a report.
    pub fn undo_last(&self) -> Result<SensoryReport, StoreError> {
        let cell = self.last_added.lock().take().ok_or(StoreError::NothingToUndo)?;

        let removed = {
            let mut store = self.store.write();
            let removed = store.delete_last(cell)?;
            self.queue_snapshot(&store);
            removed
        };
        self.metrics.record_undo();
        info!(cell = %cell, report_id = %removed.id, "report_undone");

        Ok(removed)
    }

    /// Compact expired reports and queue a snapshot when anything was removed
    pub fn compact(&self, now_ms: u64) -> usize {
        let removed = {
            let mut store = self.store.write();
            let removed = store.compact(now_ms);
            if removed > 0 {
                self.queue_snapshot(&store);
            }
            removed
        };
        if removed > 0 {
            self.metrics.record_compacted(removed);
        }
        removed
    }

    /// Caller must hold the store write lock
    fn queue_snapshot(&self, store: &ReportStore) {
        if let Some(snapshots) = &self.snapshots {
            snapshots.push(store.snapshot());
        }
    }
}
