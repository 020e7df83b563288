//! Geographic primitives: great-circle distances and pickup ETA estimation.
//!
//! Everything here is pure. Coordinate range validation belongs to the
//! booking intake layer; these functions assume valid inputs.

use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// ETA floor. Even a driver standing at the pickup needs time to react.
pub const MIN_ETA_MINUTES: f64 = 1.0;

/// A WGS84 point. Invariant: latitude in [-90, 90], longitude in [-180, 180].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Vehicle classes the platform dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleType {
    TwoWheeler,
    FourWheeler,
}

impl VehicleType {
    /// Average door-to-door speed in city traffic. Two-wheelers filter
    /// through congestion, so they average faster than four-wheelers.
    pub fn avg_speed_kmh(self) -> f64 {
        match self {
            VehicleType::TwoWheeler => 28.0,
            VehicleType::FourWheeler => 22.0,
        }
    }
}

/// Great-circle distance between two coordinates (haversine formula).
pub fn haversine_distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let (lat1, lon1) = (a.latitude.to_radians(), a.longitude.to_radians());
    let (lat2, lon2) = (b.latitude.to_radians(), b.longitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Estimated pickup travel time in minutes, floored at [MIN_ETA_MINUTES].
/// Monotonically non-decreasing in `distance_km` for a fixed vehicle type.
pub fn estimate_eta_minutes(distance_km: f64, vehicle_type: VehicleType) -> f64 {
    if distance_km <= 0.0 {
        return MIN_ETA_MINUTES;
    }
    ((distance_km / vehicle_type.avg_speed_kmh()) * 60.0).max(MIN_ETA_MINUTES)
}
