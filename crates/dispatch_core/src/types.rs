//! Domain inputs and outputs of a match attempt.
//!
//! [DriverCandidate] and [BookingRequest] arrive from the outside and are
//! never mutated by the kernel; [RankedCandidate] is derived fresh on every
//! ranking pass; [MatchOutcome] is what the caller gets back.

use serde::{Deserialize, Serialize};

use crate::error::InvalidInput;
use crate::geo::{Coordinate, VehicleType};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DriverId(pub String);

impl DriverId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for DriverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookingId(pub String);

impl BookingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for BookingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A driver eligible for matching at the moment of a match attempt.
///
/// Constructed fresh per attempt from the external location/profile store and
/// discarded when the attempt resolves. Location freshness is the provider's
/// concern; the kernel takes what it is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverCandidate {
    pub driver_id: DriverId,
    pub location: Coordinate,
    pub location_timestamp_ms: u64,
    pub vehicle_type: VehicleType,
    /// Average rider rating in [0, 5].
    pub rating: f64,
    pub total_trips: u32,
    pub completed_trips: u32,
    pub avg_response_time_secs: f64,
    /// Share of accepted trips later cancelled by the driver, in [0, 1].
    pub cancellation_rate: f64,
}

/// Which axis the ranking optimizes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionPriority {
    Fastest,
    BestRated,
    Closest,
    #[default]
    Balanced,
}

/// Immutable input to one match attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub id: BookingId,
    pub pickup: Coordinate,
    pub dropoff: Coordinate,
    pub package_weight_kg: f64,
    pub vehicle_type_required: Option<VehicleType>,
    pub priority: SelectionPriority,
}

impl BookingRequest {
    pub fn validate(&self) -> Result<(), InvalidInput> {
        if self.id.0.trim().is_empty() {
            return Err(InvalidInput::MissingBookingId);
        }
        for (field, coordinate) in [("pickup", self.pickup), ("dropoff", self.dropoff)] {
            if !coordinate.latitude.is_finite() || !coordinate.longitude.is_finite() {
                return Err(InvalidInput::NonFiniteCoordinate { field });
            }
            if !coordinate.is_valid() {
                return Err(InvalidInput::CoordinateOutOfRange { field });
            }
        }
        if !self.package_weight_kg.is_finite() || self.package_weight_kg < 0.0 {
            return Err(InvalidInput::InvalidPackageWeight);
        }
        Ok(())
    }
}

/// One candidate with its derived metrics, produced by a ranking pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub driver_id: DriverId,
    pub vehicle_type: VehicleType,
    pub distance_km: f64,
    pub eta_minutes: f64,
    pub rating: f64,
    pub performance_score: f64,
    /// Balanced weighted composite, recorded for every priority mode.
    pub composite_score: f64,
}

/// Driver reply to a dispatched proposal, delivered through the response
/// channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverResponse {
    pub booking_id: BookingId,
    pub driver_id: DriverId,
    pub outcome: ResponseOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    Accepted,
    Rejected,
}

/// Terminal failure reasons surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    NoDriversFound,
    AllCandidatesExhausted,
    Cancelled,
}

/// What a resolved match attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Assigned {
        driver_id: DriverId,
        /// Remaining ranked candidates, for the caller to use as fallbacks.
        alternatives: Vec<RankedCandidate>,
    },
    /// Another path already assigned this booking; resolved, not an error.
    AssignedElsewhere,
    Failed {
        reason: FailureReason,
        /// The (now stale) candidates that were tried, for diagnostics.
        attempted: Vec<RankedCandidate>,
        cause: Option<String>,
    },
}
