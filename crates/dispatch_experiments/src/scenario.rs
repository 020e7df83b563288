//! Scenario construction: a synthetic driver fleet and a booking stream over
//! a bounding box, generated reproducibly from a seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use dispatch_core::clock::ONE_SEC_MS;
use dispatch_core::config::SearchPolicy;
use dispatch_core::geo::{Coordinate, VehicleType};
use dispatch_core::types::{BookingId, BookingRequest, DriverCandidate, DriverId, SelectionPriority};

use crate::grid_provider::GridCandidateProvider;
use crate::scripted::DriverScript;

/// Default bounding box: Berlin, Germany (approx).
const DEFAULT_LAT_MIN: f64 = 52.34;
const DEFAULT_LAT_MAX: f64 = 52.68;
const DEFAULT_LNG_MIN: f64 = 13.08;
const DEFAULT_LNG_MAX: f64 = 13.76;

/// Parameters for building a dispatch scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioParams {
    pub num_drivers: usize,
    pub num_bookings: usize,
    pub seed: u64,
    /// Share of the fleet on two-wheelers; the rest drive four-wheelers.
    pub two_wheeler_share: f64,
    pub priority: SelectionPriority,
    pub policy: SearchPolicy,
    pub script: DriverScript,
    /// Bookings arrive evenly spaced across this window.
    pub booking_window_secs: u64,
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            num_drivers: 200,
            num_bookings: 100,
            seed: 0,
            two_wheeler_share: 0.7,
            priority: SelectionPriority::Balanced,
            policy: SearchPolicy::default(),
            script: DriverScript::default(),
            booking_window_secs: 3_600,
            lat_min: DEFAULT_LAT_MIN,
            lat_max: DEFAULT_LAT_MAX,
            lng_min: DEFAULT_LNG_MIN,
            lng_max: DEFAULT_LNG_MAX,
        }
    }
}

impl ScenarioParams {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.script.seed = seed;
        self
    }

    pub fn with_counts(mut self, num_drivers: usize, num_bookings: usize) -> Self {
        self.num_drivers = num_drivers;
        self.num_bookings = num_bookings;
        self
    }

    fn random_point(&self, rng: &mut StdRng) -> Coordinate {
        Coordinate::new(
            rng.gen_range(self.lat_min..=self.lat_max),
            rng.gen_range(self.lng_min..=self.lng_max),
        )
    }
}

/// Generate the driver fleet. Positions, vehicles and histories are all
/// drawn from the scenario seed.
pub fn build_drivers(params: &ScenarioParams) -> Vec<DriverCandidate> {
    let mut rng = StdRng::seed_from_u64(params.seed);
    (0..params.num_drivers)
        .map(|i| {
            let total_trips = rng.gen_range(0..600);
            let completed_trips = if total_trips == 0 {
                0
            } else {
                total_trips - rng.gen_range(0..(total_trips / 5).max(1))
            };
            DriverCandidate {
                driver_id: DriverId::new(format!("drv-{i:04}")),
                location: params.random_point(&mut rng),
                location_timestamp_ms: 0,
                vehicle_type: if rng.gen::<f64>() < params.two_wheeler_share {
                    VehicleType::TwoWheeler
                } else {
                    VehicleType::FourWheeler
                },
                rating: rng.gen_range(3.0..=5.0),
                total_trips,
                completed_trips,
                avg_response_time_secs: rng.gen_range(5.0..=150.0),
                cancellation_rate: rng.gen_range(0.0..=0.3),
            }
        })
        .collect()
}

/// Index the generated fleet into a [GridCandidateProvider].
pub fn build_provider(params: &ScenarioParams) -> GridCandidateProvider {
    let mut provider = GridCandidateProvider::new();
    for driver in build_drivers(params) {
        provider.insert(driver);
    }
    provider
}

/// Generate the booking stream as `(submit_at_ms, request)` pairs, ordered
/// by submission time.
pub fn build_bookings(params: &ScenarioParams) -> Vec<(u64, BookingRequest)> {
    // Offset the stream so booking randomness is independent of fleet size.
    let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(0x00b0_0c1e));
    let spacing_ms = (params.booking_window_secs * ONE_SEC_MS) / params.num_bookings.max(1) as u64;
    (0..params.num_bookings)
        .map(|i| {
            let heavy = rng.gen::<f64>() < 0.15;
            let request = BookingRequest {
                id: BookingId::new(format!("bk-{i:05}")),
                pickup: params.random_point(&mut rng),
                dropoff: params.random_point(&mut rng),
                package_weight_kg: if heavy {
                    rng.gen_range(13.0..=25.0)
                } else {
                    rng.gen_range(0.2..=8.0)
                },
                vehicle_type_required: None,
                priority: params.priority,
            };
            (i as u64 * spacing_ms, request)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fleet_generation_is_reproducible() {
        let params = ScenarioParams::default().with_seed(9).with_counts(50, 10);
        assert_eq!(build_drivers(&params), build_drivers(&params));
    }

    #[test]
    fn fleet_respects_bounds_and_invariants() {
        let params = ScenarioParams::default().with_counts(100, 10);
        for driver in build_drivers(&params) {
            assert!(driver.location.is_valid());
            assert!((params.lat_min..=params.lat_max).contains(&driver.location.latitude));
            assert!((params.lng_min..=params.lng_max).contains(&driver.location.longitude));
            assert!(driver.completed_trips <= driver.total_trips);
            assert!((3.0..=5.0).contains(&driver.rating));
            assert!((0.0..=0.3).contains(&driver.cancellation_rate));
        }
    }

    #[test]
    fn bookings_arrive_in_order_and_validate() {
        let params = ScenarioParams::default().with_counts(10, 40);
        let bookings = build_bookings(&params);
        assert_eq!(bookings.len(), 40);
        let mut last = 0;
        for (at_ms, request) in bookings {
            assert!(at_ms >= last);
            last = at_ms;
            assert!(request.validate().is_ok());
        }
    }

    #[test]
    fn provider_indexes_the_whole_fleet() {
        let params = ScenarioParams::default().with_counts(80, 10);
        assert_eq!(build_provider(&params).len(), 80);
    }
}
