//! Shared types for the sensory map

use serde::{Deserialize, Deserializer, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Geographic coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    #[inline]
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite, with latitude in [-90, 90] and longitude in [-180, 180]
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

impl std::fmt::Display for LatLng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

/// Integer grid coordinate identifying one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub x: i64,
    pub y: i64,
}

impl CellKey {
    #[inline]
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// Error returned when a `"x,y"` cell key cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cell key: {0:?}")]
pub struct ParseCellKeyError(pub String);

impl std::str::FromStr for CellKey {
    type Err = ParseCellKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s.split_once(',').ok_or_else(|| ParseCellKeyError(s.to_string()))?;
        let x = x.trim().parse().map_err(|_| ParseCellKeyError(s.to_string()))?;
        let y = y.trim().parse().map_err(|_| ParseCellKeyError(s.to_string()))?;
        Ok(CellKey { x, y })
    }
}

impl Serialize for CellKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CellKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Axis-aligned geographic rectangle (southwest / northeast corners)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Bounds {
    /// Inclusive on all four edges
    pub fn contains(&self, point: LatLng) -> bool {
        point.lat >= self.south_west.lat
            && point.lat <= self.north_east.lat
            && point.lng >= self.south_west.lng
            && point.lng <= self.north_east.lng
    }

    pub fn center(&self) -> LatLng {
        LatLng {
            lat: (self.south_west.lat + self.north_east.lat) / 2.0,
            lng: (self.south_west.lng + self.north_east.lng) / 2.0,
        }
    }
}

/// Newtype wrapper for report IDs (creation time in epoch ms, strictly increasing)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ReportId(pub u64);

impl std::fmt::Display for ReportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Report lifetime class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Short-lived conditions (events, construction)
    #[default]
    Irregular,
    /// Structural conditions (building or road character)
    Regular,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Irregular => "irregular",
            Category::Regular => "regular",
        }
    }

    /// Longest duration a report of this category may declare, in minutes
    pub fn max_duration_minutes(&self) -> u32 {
        match self {
            Category::Irregular => 60,
            Category::Regular => 360,
        }
    }
}

/// Sensory dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Noise,
    Light,
    Odor,
    Crowd,
}

impl Dimension {
    pub const ALL: [Dimension; 4] =
        [Dimension::Noise, Dimension::Light, Dimension::Odor, Dimension::Crowd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Noise => "noise",
            Dimension::Light => "light",
            Dimension::Odor => "odor",
            Dimension::Crowd => "crowd",
        }
    }
}

impl std::str::FromStr for Dimension {
    type Err = ParseDimensionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "noise" => Ok(Dimension::Noise),
            "light" => Ok(Dimension::Light),
            "odor" => Ok(Dimension::Odor),
            "crowd" => Ok(Dimension::Crowd),
            other => Err(ParseDimensionError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sensory dimension: {0:?}")]
pub struct ParseDimensionError(pub String);

/// One optional value per sensory dimension
///
/// Used for raw report values (`u8` in 0..=10) and for aggregated readings (`f64`).
/// Absent dimensions are `None` and are skipped by every consumer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Dimensions<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odor: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crowd: Option<T>,
}

impl<T: Copy> Dimensions<T> {
    pub fn empty() -> Self {
        Self { noise: None, light: None, odor: None, crowd: None }
    }

    #[inline]
    pub fn get(&self, dimension: Dimension) -> Option<T> {
        match dimension {
            Dimension::Noise => self.noise,
            Dimension::Light => self.light,
            Dimension::Odor => self.odor,
            Dimension::Crowd => self.crowd,
        }
    }

    pub fn set(&mut self, dimension: Dimension, value: Option<T>) {
        match dimension {
            Dimension::Noise => self.noise = value,
            Dimension::Light => self.light = value,
            Dimension::Odor => self.odor = value,
            Dimension::Crowd => self.crowd = value,
        }
    }

    /// Present dimensions with their values, in `Dimension::ALL` order
    pub fn present(&self) -> impl Iterator<Item = (Dimension, T)> + '_ {
        Dimension::ALL.into_iter().filter_map(move |d| self.get(d).map(|v| (d, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.present().next().is_none()
    }

    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> Dimensions<U> {
        Dimensions {
            noise: self.noise.map(&f),
            light: self.light.map(&f),
            odor: self.odor.map(&f),
            crowd: self.crowd.map(&f),
        }
    }
}

fn default_duration_minutes() -> u32 {
    Category::Irregular.max_duration_minutes()
}

/// A single user-submitted sensory report
///
/// Immutable once stored. Serialized with the flat field names used by the
/// grid snapshot (`type`, `duration`, `wheelchair`, one key per dimension).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensoryReport {
    pub id: ReportId,
    /// Creation time, epoch milliseconds
    pub timestamp: u64,
    #[serde(rename = "type")]
    pub category: Category,
    #[serde(flatten)]
    pub values: Dimensions<u8>,
    #[serde(rename = "duration", default = "default_duration_minutes")]
    pub duration_minutes: u32,
    #[serde(rename = "wheelchair", default, skip_serializing_if = "std::ops::Not::not")]
    pub wheelchair_issue: bool,
}

/// Raw duration as submitted - either a number or free text
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DurationInput {
    #[default]
    None,
    Minutes(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for DurationInput {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = DurationInput;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a number of minutes or a string")
            }

            fn visit_str<E>(self, value: &str) -> Result<DurationInput, E>
            where
                E: de::Error,
            {
                Ok(DurationInput::Text(value.to_string()))
            }

            fn visit_string<E>(self, value: String) -> Result<DurationInput, E>
            where
                E: de::Error,
            {
                Ok(DurationInput::Text(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<DurationInput, E>
            where
                E: de::Error,
            {
                Ok(DurationInput::Minutes(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<DurationInput, E>
            where
                E: de::Error,
            {
                Ok(DurationInput::Minutes(i64::try_from(value).unwrap_or(i64::MAX)))
            }

            fn visit_f64<E>(self, value: f64) -> Result<DurationInput, E>
            where
                E: de::Error,
            {
                // Fractional minutes are not a valid duration
                Ok(DurationInput::Text(value.to_string()))
            }

            fn visit_unit<E>(self) -> Result<DurationInput, E>
            where
                E: de::Error,
            {
                Ok(DurationInput::None)
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}
