//! Services - the sensory map engine
//!
//! This module contains the core business logic services:
//! - `grid` - Coordinate to cell mapping and cell bounds
//! - `decay` - Time-decay weighting of reports
//! - `store` - Per-cell report storage (the only owner of reports)
//! - `aggregation` - Decay-weighted per-cell readings
//! - `personalization` - Profile-weighted comfort score
//! - `route_scorer` - Route alternative scoring and selection
//! - `ingestion` - Submission validation, report ids, undo
//! - `profile_manager` - Sensitivity profile ownership
//! - `map_view` - Heat points, cell markers and cell detail
//! - `compaction` - Periodic removal of expired reports

pub mod aggregation;
pub mod compaction;
pub mod decay;
pub mod grid;
pub mod ingestion;
pub mod map_view;
pub mod personalization;
pub mod profile_manager;
pub mod route_scorer;
pub mod store;

// Re-export commonly used types
pub use ingestion::{IngestError, ReportService, ReportSubmission};
pub use profile_manager::{ProfileManager, ProfileUpdate};
pub use route_scorer::{RouteError, RoutePlanner, RouteRequest};
pub use store::{ReportStore, SharedStore, StoreError};
