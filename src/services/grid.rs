//! Fixed-resolution grid index
//!
//! Maps a coordinate to an integer cell key and a key back to its bounds using a
//! constant meters-per-degree factor (equirectangular, no pole or dateline handling).
//! Valid for small cells at city-scale latitudes.

use crate::domain::types::{Bounds, CellKey, LatLng};

/// Meters per degree used for both axes
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Default cell edge length in meters
pub const DEFAULT_CELL_SIZE_M: f64 = 15.0;

/// Cell containing `coord`
#[inline]
pub fn cell_key(coord: LatLng, cell_size_m: f64) -> CellKey {
    let x = (coord.lng * METERS_PER_DEGREE / cell_size_m).floor() as i64;
    let y = (coord.lat * METERS_PER_DEGREE / cell_size_m).floor() as i64;
    CellKey { x, y }
}

/// Rectangle covered by `key`
pub fn cell_bounds(key: CellKey, cell_size_m: f64) -> Bounds {
    let lng1 = key.x as f64 * cell_size_m / METERS_PER_DEGREE;
    let lat1 = key.y as f64 * cell_size_m / METERS_PER_DEGREE;
    let lng2 = key.x.saturating_add(1) as f64 * cell_size_m / METERS_PER_DEGREE;
    let lat2 = key.y.saturating_add(1) as f64 * cell_size_m / METERS_PER_DEGREE;
    Bounds { south_west: LatLng::new(lat1, lng1), north_east: LatLng::new(lat2, lng2) }
}

/// Great-circle distance in meters (haversine, mean earth radius)
pub fn haversine_distance(a: LatLng, b: LatLng) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;

    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}
