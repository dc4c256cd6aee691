//! On-disk state - grid snapshot and sensitivity profile
//!
//! The grid snapshot is a JSON array of `["x,y", {"reports": [...]}]` pairs. Loading
//! is lenient: malformed entries and reports are skipped, and an unreadable or
//! corrupt file yields an empty store. Writes go to a uniquely named sibling temp
//! file first and are renamed into place.
//!
//! Grid snapshots are written by a single `SnapshotWriter` task. Mutations push the
//! full grid into a `SnapshotQueue`, which only keeps the newest one.

use crate::domain::profile::SensitivityProfile;
use crate::domain::types::{CellKey, SensoryReport};
use crate::services::store::ReportStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Highest value a persisted report may carry in any dimension
const MAX_STORED_VALUE: u8 = 10;

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Full grid contents, ordered by cell key
pub type GridSnapshot = Vec<(CellKey, Vec<SensoryReport>)>;

#[derive(Serialize, Deserialize)]
struct CellRecord {
    reports: Vec<Value>,
}

#[derive(Serialize)]
struct CellRecordOut<'a> {
    reports: &'a [SensoryReport],
}

/// Encode cells in snapshot layout
pub fn encode_snapshot(cells: &[(CellKey, Vec<SensoryReport>)]) -> Result<String> {
    let entries: Vec<(String, CellRecordOut<'_>)> = cells
        .iter()
        .map(|(key, reports)| (key.to_string(), CellRecordOut { reports }))
        .collect();
    serde_json::to_string(&entries).context("Failed to encode grid snapshot")
}

/// Decode a snapshot, skipping anything malformed
///
/// Returns `None` only when the text is not a JSON array at all.
pub fn decode_snapshot(text: &str) -> Option<Vec<(CellKey, Vec<SensoryReport>)>> {
    let entries: Vec<Value> = serde_json::from_str(text).ok()?;
    let mut cells = Vec::with_capacity(entries.len());
    let mut skipped = 0usize;

    for entry in entries {
        let Some((key, record)) = decode_entry(entry) else {
            skipped += 1;
            continue;
        };

        let mut reports = Vec::with_capacity(record.reports.len());
        for raw in record.reports {
            match serde_json::from_value::<SensoryReport>(raw) {
                Ok(report) if report_in_range(&report) => reports.push(report),
                _ => skipped += 1,
            }
        }
        if !reports.is_empty() {
            cells.push((key, reports));
        }
    }

    if skipped > 0 {
        warn!(skipped = %skipped, "snapshot_entries_skipped");
    }
    Some(cells)
}

fn decode_entry(entry: Value) -> Option<(CellKey, CellRecord)> {
    let (key, record): (String, CellRecord) = serde_json::from_value(entry).ok()?;
    Some((key.parse().ok()?, record))
}

fn report_in_range(report: &SensoryReport) -> bool {
    report.values.present().all(|(_, v)| v <= MAX_STORED_VALUE)
        && !report.values.is_empty()
        && report.duration_minutes >= 1
}

/// Write `contents` atomically, creating parent directories as needed
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(format!(
        ".{}.{}.tmp",
        std::process::id(),
        TMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    let tmp = path.with_file_name(tmp_name);

    std::fs::write(&tmp, contents)
        .with_context(|| format!("Failed to write file: {}", tmp.display()))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to replace file: {}", path.display()));
    }
    Ok(())
}

/// File locations for persisted state
#[derive(Debug, Clone)]
pub struct Persistence {
    snapshot_path: PathBuf,
    profile_path: PathBuf,
}

impl Persistence {
    pub fn new(snapshot_path: impl Into<PathBuf>, profile_path: impl Into<PathBuf>) -> Self {
        let snapshot_path = snapshot_path.into();
        let profile_path = profile_path.into();
        info!(
            snapshot = %snapshot_path.display(),
            profile = %profile_path.display(),
            "persistence_initialized"
        );
        Self { snapshot_path, profile_path }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn profile_path(&self) -> &Path {
        &self.profile_path
    }

    pub fn save_snapshot(&self, cells: &[(CellKey, Vec<SensoryReport>)]) -> Result<()> {
        let json = encode_snapshot(cells)?;
        write_atomic(&self.snapshot_path, &json)?;
        debug!(cells = %cells.len(), bytes = %json.len(), "snapshot_written");
        Ok(())
    }

    /// Load the store; a missing, unreadable or corrupt snapshot gives an empty store
    pub fn load_store(&self, cell_size_m: f64) -> ReportStore {
        let text = match std::fs::read_to_string(&self.snapshot_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.snapshot_path.display(), "snapshot_not_found_starting_empty");
                return ReportStore::new(cell_size_m);
            }
            Err(e) => {
                warn!(path = %self.snapshot_path.display(), error = %e, "snapshot_unreadable_starting_empty");
                return ReportStore::new(cell_size_m);
            }
        };

        match decode_snapshot(&text) {
            Some(cells) => {
                let store = ReportStore::from_cells(cell_size_m, cells);
                info!(
                    cells = %store.cell_count(),
                    reports = %store.report_count(),
                    "snapshot_loaded"
                );
                store
            }
            None => {
                warn!(path = %self.snapshot_path.display(), "snapshot_corrupt_starting_empty");
                ReportStore::new(cell_size_m)
            }
        }
    }

    pub fn save_profile(&self, profile: &SensitivityProfile) -> Result<()> {
        let json = serde_json::to_string(profile).context("Failed to encode profile")?;
        write_atomic(&self.profile_path, &json)?;
        debug!(path = %self.profile_path.display(), "profile_written");
        Ok(())
    }

    /// Load the profile; anything missing, corrupt or out of range gives the default
    pub fn load_profile(&self) -> SensitivityProfile {
        let text = match std::fs::read_to_string(&self.profile_path) {
            Ok(text) => text,
            Err(_) => return SensitivityProfile::default(),
        };

        match serde_json::from_str::<SensitivityProfile>(&text) {
            Ok(profile) if profile.is_valid() => profile,
            Ok(_) | Err(_) => {
                warn!(path = %self.profile_path.display(), "profile_invalid_using_default");
                SensitivityProfile::default()
            }
        }
    }
}

/// Producer side of the snapshot writer
///
/// Pushing replaces any snapshot the writer has not picked up yet. Push while still
/// holding the store write lock so the queue sees snapshots in mutation order.
#[derive(Debug)]
pub struct SnapshotQueue {
    tx: watch::Sender<Option<Arc<GridSnapshot>>>,
}

impl SnapshotQueue {
    pub fn push(&self, snapshot: GridSnapshot) {
        self.tx.send_replace(Some(Arc::new(snapshot)));
    }
}

/// Single task that owns grid snapshot writes
pub struct SnapshotWriter {
    persistence: Arc<Persistence>,
    rx: watch::Receiver<Option<Arc<GridSnapshot>>>,
    written: Option<Arc<GridSnapshot>>,
}

/// Create a connected queue and writer for `persistence`
pub fn snapshot_writer(persistence: Arc<Persistence>) -> (SnapshotQueue, SnapshotWriter) {
    let (tx, rx) = watch::channel(None);
    (SnapshotQueue { tx }, SnapshotWriter { persistence, rx, written: None })
}

impl SnapshotWriter {
    /// Write the newest snapshot whenever one arrives
    ///
    /// Exits on shutdown or once the queue is dropped, writing the last
    /// pending snapshot before returning.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(path = %self.persistence.snapshot_path().display(), "snapshot_writer_started");

        loop {
            tokio::select! {
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.write_latest().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.write_latest().await;
        info!("snapshot_writer_shutdown");
    }

    async fn write_latest(&mut self) {
        let latest = self.rx.borrow_and_update().clone();
        let Some(snapshot) = latest else {
            return;
        };
        if self.written.as_ref().is_some_and(|w| Arc::ptr_eq(w, &snapshot)) {
            return;
        }

        let persistence = self.persistence.clone();
        let pending = snapshot.clone();
        match tokio::task::spawn_blocking(move || persistence.save_snapshot(&pending)).await {
            Ok(Ok(())) => self.written = Some(snapshot),
            Ok(Err(e)) => warn!(error = %e, "snapshot_write_failed"),
            Err(e) => warn!(error = %e, "snapshot_write_task_failed"),
        }
    }
}
