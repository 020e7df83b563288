//! Search and proposal policy knobs.

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::geo::VehicleType;
use crate::types::BookingRequest;

/// How a match attempt searches and proposes.
#[derive(Debug, Clone, Copy, Resource, Serialize, Deserialize)]
pub struct SearchPolicy {
    /// Radius of the first candidate search.
    pub initial_radius_km: f64,
    /// Radius of the single widened retry when the first search is empty.
    pub max_radius_km: f64,
    /// How long a driver has to answer a proposal.
    pub proposal_timeout_secs: u64,
    /// Packages heavier than this require a four-wheeler when the booking
    /// does not name a vehicle type itself.
    pub max_two_wheeler_load_kg: f64,
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self {
            initial_radius_km: 5.0,
            max_radius_km: 15.0,
            proposal_timeout_secs: 120,
            max_two_wheeler_load_kg: 12.0,
        }
    }
}

impl SearchPolicy {
    /// The vehicle class this booking must be served by, if any. An explicit
    /// requirement on the booking wins; otherwise heavy packages force a
    /// four-wheeler.
    pub fn required_vehicle(&self, request: &BookingRequest) -> Option<VehicleType> {
        request.vehicle_type_required.or_else(|| {
            (request.package_weight_kg > self.max_two_wheeler_load_kg)
                .then_some(VehicleType::FourWheeler)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use crate::types::{BookingId, SelectionPriority};

    fn request(weight_kg: f64, required: Option<VehicleType>) -> BookingRequest {
        BookingRequest {
            id: BookingId::new("bk-1"),
            pickup: Coordinate::new(52.52, 13.41),
            dropoff: Coordinate::new(52.49, 13.39),
            package_weight_kg: weight_kg,
            vehicle_type_required: required,
            priority: SelectionPriority::Balanced,
        }
    }

    #[test]
    fn light_packages_accept_any_vehicle() {
        let policy = SearchPolicy::default();
        assert_eq!(policy.required_vehicle(&request(3.0, None)), None);
    }

    #[test]
    fn heavy_packages_require_a_four_wheeler() {
        let policy = SearchPolicy::default();
        assert_eq!(
            policy.required_vehicle(&request(20.0, None)),
            Some(VehicleType::FourWheeler)
        );
    }

    #[test]
    fn explicit_requirement_wins_over_weight() {
        let policy = SearchPolicy::default();
        assert_eq!(
            policy.required_vehicle(&request(20.0, Some(VehicleType::TwoWheeler))),
            Some(VehicleType::TwoWheeler)
        );
    }
}
