//! Report store - per-cell report lists keyed by grid cell
//!
//! The store owns every cell. Cells are created lazily on the first report and
//! removed as soon as their last report goes, so an empty cell is never observable.
//! Shared across tasks as `SharedStore`: writers (insert, delete, compact) take the
//! write lock, aggregation and route scoring take the read lock.

use crate::domain::types::{Bounds, CellKey, LatLng, ReportId, SensoryReport};
use crate::services::decay::{decay_weight, EXPIRY_WEIGHT};
use crate::services::grid::{cell_bounds, cell_key};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Store handle shared between the API, the compaction task and route planning
pub type SharedStore = Arc<RwLock<ReportStore>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("cell {0} not found")]
    CellNotFound(CellKey),
    #[error("report {id} not found in cell {cell}")]
    ReportNotFound { cell: CellKey, id: ReportId },
    #[error("nothing to undo")]
    NothingToUndo,
}

/// One grid cell and its reports in insertion order
#[derive(Debug, Clone)]
pub struct GridCell {
    key: CellKey,
    bounds: Bounds,
    reports: Vec<SensoryReport>,
}

impl GridCell {
    fn new(key: CellKey, cell_size_m: f64) -> Self {
        Self { key, bounds: cell_bounds(key, cell_size_m), reports: Vec::new() }
    }

    pub fn key(&self) -> CellKey {
        self.key
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn reports(&self) -> &[SensoryReport] {
        &self.reports
    }
}

/// Owns all grid cells
pub struct ReportStore {
    cell_size_m: f64,
    cells: FxHashMap<CellKey, GridCell>,
}

impl ReportStore {
    pub fn new(cell_size_m: f64) -> Self {
        Self { cell_size_m, cells: FxHashMap::default() }
    }

    /// Rebuild a store from persisted `(key, reports)` pairs
    ///
    /// Bounds are recomputed from the key. Pairs with no reports are dropped and
    /// repeated keys are merged in input order.
    pub fn from_cells<I>(cell_size_m: f64, cells: I) -> Self
    where
        I: IntoIterator<Item = (CellKey, Vec<SensoryReport>)>,
    {
        let mut store = Self::new(cell_size_m);
        for (key, reports) in cells {
            if reports.is_empty() {
                continue;
            }
            store
                .cells
                .entry(key)
                .or_insert_with(|| GridCell::new(key, cell_size_m))
                .reports
                .extend(reports);
        }
        store
    }

    /// Wrap in the shared lock
    pub fn into_shared(self) -> SharedStore {
        Arc::new(RwLock::new(self))
    }

    pub fn cell_size_m(&self) -> f64 {
        self.cell_size_m
    }

    /// Append a report to the cell containing `coord`, creating it if needed
    pub fn insert(&mut self, coord: LatLng, report: SensoryReport) -> CellKey {
        let key = cell_key(coord, self.cell_size_m);
        let cell_size_m = self.cell_size_m;
        let cell = self.cells.entry(key).or_insert_with(|| GridCell::new(key, cell_size_m));
        debug!(cell = %key, report_id = %report.id, "report_stored");
        cell.reports.push(report);
        key
    }

    /// Remove the report with `id` from cell `key`
    pub fn delete_by_id(&mut self, key: CellKey, id: ReportId) -> Result<SensoryReport, StoreError> {
        let cell = self.cells.get_mut(&key).ok_or(StoreError::CellNotFound(key))?;
        let idx = cell
            .reports
            .iter()
            .position(|r| r.id == id)
            .ok_or(StoreError::ReportNotFound { cell: key, id })?;

        let removed = cell.reports.remove(idx);
        self.drop_if_empty(key);
        Ok(removed)
    }

    /// Remove the most recently appended report of cell `key`
    pub fn delete_last(&mut self, key: CellKey) -> Result<SensoryReport, StoreError> {
        let removed = self
            .cells
            .get_mut(&key)
            .and_then(|cell| cell.reports.pop())
            .ok_or(StoreError::CellNotFound(key))?;
        self.drop_if_empty(key);
        Ok(removed)
    }

    /// Remove every report whose decay weight at `now_ms` is at or below the
    /// expiry weight, then every cell left empty. Returns the number of reports removed.
    pub fn compact(&mut self, now_ms: u64) -> usize {
        let mut removed = 0;
        self.cells.retain(|_, cell| {
            let before = cell.reports.len();
            cell.reports.retain(|r| decay_weight(r, now_ms) > EXPIRY_WEIGHT);
            removed += before - cell.reports.len();
            !cell.reports.is_empty()
        });

        if removed > 0 {
            info!(removed = %removed, cells = %self.cells.len(), "store_compacted");
        }
        removed
    }

    pub fn get(&self, key: CellKey) -> Option<&GridCell> {
        self.cells.get(&key)
    }

    /// Cell containing `coord`, if it holds any report
    pub fn cell_at(&self, coord: LatLng) -> Option<&GridCell> {
        self.cells.get(&cell_key(coord, self.cell_size_m))
    }

    /// All cells, in no particular order
    pub fn cells(&self) -> impl Iterator<Item = &GridCell> {
        self.cells.values()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn report_count(&self) -> usize {
        self.cells.values().map(|c| c.reports.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Owned copy of every cell, ordered by key
    pub fn snapshot(&self) -> Vec<(CellKey, Vec<SensoryReport>)> {
        let mut cells: Vec<_> =
            self.cells.values().map(|c| (c.key, c.reports.clone())).collect();
        cells.sort_by_key(|(key, _)| *key);
        cells
    }

    fn drop_if_empty(&mut self, key: CellKey) {
        if self.cells.get(&key).is_some_and(|c| c.reports.is_empty()) {
            self.cells.remove(&key);
            debug!(cell = %key, "cell_removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Category, Dimensions};
    use crate::services::grid::DEFAULT_CELL_SIZE_M;

    const HOUR_MS: u64 = 3_600_000;
    const SEOUL: LatLng = LatLng { lat: 37.5665, lng: 126.9780 };

    fn report(id: u64, category: Category, timestamp: u64) -> SensoryReport {
        SensoryReport {
            id: ReportId(id),
            timestamp,
            category,
            values: Dimensions { noise: Some(5), ..Dimensions::empty() },
            duration_minutes: 30,
            wheelchair_issue: false,
        }
    }

    #[test]
    fn test_insert_creates_cell_lazily() {
        let mut store = ReportStore::new(DEFAULT_CELL_SIZE_M);
        assert!(store.is_empty());

        let key = store.insert(SEOUL, report(1, Category::Irregular, 0));
        let again = store.insert(SEOUL, report(2, Category::Irregular, 0));

        assert_eq!(key, again);
        assert_eq!(store.cell_count(), 1);
        assert_eq!(store.report_count(), 2);
        let cell = store.get(key).unwrap();
        assert_eq!(cell.reports()[0].id, ReportId(1));
        assert_eq!(cell.reports()[1].id, ReportId(2));
        assert!(cell.bounds().contains(SEOUL));
    }

    #[test]
    fn test_delete_by_id_removes_empty_cell() {
        let mut store = ReportStore::new(DEFAULT_CELL_SIZE_M);
        let key = store.insert(SEOUL, report(1, Category::Irregular, 0));
        store.insert(SEOUL, report(2, Category::Irregular, 0));

        let removed = store.delete_by_id(key, ReportId(1)).unwrap();
        assert_eq!(removed.id, ReportId(1));
        assert_eq!(store.report_count(), 1);

        store.delete_by_id(key, ReportId(2)).unwrap();
        assert!(store.get(key).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_by_id_not_found() {
        let mut store = ReportStore::new(DEFAULT_CELL_SIZE_M);
        let key = store.insert(SEOUL, report(1, Category::Irregular, 0));

        assert_eq!(
            store.delete_by_id(key, ReportId(99)),
            Err(StoreError::ReportNotFound { cell: key, id: ReportId(99) })
        );
        let missing = CellKey::new(0, 0);
        assert_eq!(store.delete_by_id(missing, ReportId(1)), Err(StoreError::CellNotFound(missing)));
        // Nothing changed
        assert_eq!(store.report_count(), 1);
    }

    #[test]
    fn test_delete_last_pops_most_recent() {
        let mut store = ReportStore::new(DEFAULT_CELL_SIZE_M);
        let key = store.insert(SEOUL, report(1, Category::Irregular, 0));
        store.insert(SEOUL, report(2, Category::Irregular, 0));

        assert_eq!(store.delete_last(key).unwrap().id, ReportId(2));
        assert_eq!(store.delete_last(key).unwrap().id, ReportId(1));
        assert!(store.get(key).is_none());
        assert_eq!(store.delete_last(key), Err(StoreError::CellNotFound(key)));
    }

    #[test]
    fn test_compact_removes_expired_reports_and_cells() {
        let mut store = ReportStore::new(DEFAULT_CELL_SIZE_M);
        let elsewhere = LatLng::new(37.6, 127.0);
        let now = 200 * HOUR_MS;

        // Expired irregular (7h old), live irregular (1h old), expired regular (170h old)
        let seoul = store.insert(SEOUL, report(1, Category::Irregular, now - 7 * HOUR_MS));
        store.insert(SEOUL, report(2, Category::Irregular, now - HOUR_MS));
        let other = store.insert(elsewhere, report(3, Category::Regular, now - 170 * HOUR_MS));

        let removed = store.compact(now);

        assert_eq!(removed, 2);
        assert!(store.get(other).is_none());
        let remaining = store.get(seoul).unwrap().reports();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, ReportId(2));
        for cell in store.cells() {
            assert!(!cell.reports().is_empty());
            for r in cell.reports() {
                assert!(decay_weight(r, now) > EXPIRY_WEIGHT);
            }
        }

        // Idempotent
        assert_eq!(store.compact(now), 0);
    }

    #[test]
    fn test_from_cells_recomputes_bounds_and_skips_empty() {
        let key = cell_key(SEOUL, DEFAULT_CELL_SIZE_M);
        let store = ReportStore::from_cells(
            DEFAULT_CELL_SIZE_M,
            vec![
                (key, vec![report(1, Category::Regular, 0)]),
                (CellKey::new(1, 1), vec![]),
                (key, vec![report(2, Category::Regular, 0)]),
            ],
        );

        assert_eq!(store.cell_count(), 1);
        let cell = store.get(key).unwrap();
        assert_eq!(cell.reports().len(), 2);
        assert_eq!(cell.bounds(), cell_bounds(key, DEFAULT_CELL_SIZE_M));
    }

    #[test]
    fn test_snapshot_is_sorted_by_key() {
        let mut store = ReportStore::new(DEFAULT_CELL_SIZE_M);
        store.insert(LatLng::new(37.6, 127.0), report(1, Category::Regular, 0));
        store.insert(SEOUL, report(2, Category::Regular, 0));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot[0].0 < snapshot[1].0);
    }
}
