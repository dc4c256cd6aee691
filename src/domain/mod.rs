//! Domain models - core data types of the sensory map
//!
//! - `types` - coordinates, cell keys, dimensions and sensory reports
//! - `profile` - the user sensitivity profile
//! - `route` - route alternatives, route-type policies and scored routes

pub mod profile;
pub mod route;
pub mod types;

pub use profile::{ProfileError, SensitivityProfile};
pub use route::{RouteAlternative, RouteSource, RouteType, ScoredRoute};
pub use types::{
    epoch_ms, Bounds, Category, CellKey, Dimension, Dimensions, DurationInput, LatLng, ReportId,
    SensoryReport,
};
