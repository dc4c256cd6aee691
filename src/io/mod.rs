//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `routing` - Routing provider trait and the OSRM HTTP client
//! - `persistence` - Grid snapshot and profile files (JSON)
//! - `http_api` - JSON HTTP API and Prometheus endpoint (hyper)

pub mod http_api;
pub mod persistence;
pub mod routing;

// Re-export commonly used types
pub use http_api::{start_api_server, AppState};
pub use persistence::{snapshot_writer, Persistence, SnapshotQueue, SnapshotWriter};
pub use routing::{OsrmClient, ProviderError, RouteProvider};
