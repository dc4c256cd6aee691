//! Route alternatives and route-type policies

use crate::domain::types::LatLng;
use serde::Serialize;

/// Ranking policy used to blend sensory cost with travel time
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RouteType {
    #[default]
    Sensory,
    Balanced,
    Time,
    /// Any other requested name; ranked with the balanced formula
    Unrecognized(String),
}

impl std::str::FromStr for RouteType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "sensory" => RouteType::Sensory,
            "balanced" => RouteType::Balanced,
            "time" => RouteType::Time,
            other => RouteType::Unrecognized(other.to_string()),
        })
    }
}

impl RouteType {
    pub fn as_str(&self) -> &str {
        match self {
            RouteType::Sensory => "sensory",
            RouteType::Balanced => "balanced",
            RouteType::Time => "time",
            RouteType::Unrecognized(s) => s,
        }
    }
}

impl Serialize for RouteType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One candidate path as returned by (or synthesized in place of) a routing provider
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteAlternative {
    /// Ordered (lat, lng) vertices
    pub geometry: Vec<LatLng>,
    pub distance_meters: f64,
    pub duration_seconds: f64,
}

/// Where the scored alternatives came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteSource {
    Provider,
    Fallback,
}

/// The selected alternative annotated with its scores
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredRoute {
    #[serde(flatten)]
    pub route: RouteAlternative,
    pub route_type: RouteType,
    /// Mean personalized sensory cost along the route, 0..=10
    pub sensory_score: f64,
    /// Composite cost under `route_type`; lower is better
    pub total_score: f64,
    /// Position of the winner in provider order
    pub index: usize,
    pub source: RouteSource,
}
