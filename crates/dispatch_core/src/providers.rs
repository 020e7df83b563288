//! Collaborator contracts the kernel depends on.
//!
//! The kernel never talks to a database, a push service or a wire format;
//! it sees these three traits, wrapped as ECS resources. Implementations
//! live with the calling layer (or in the experiments harness).

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, SinkError};
use crate::geo::{Coordinate, VehicleType};
use crate::types::{BookingId, DriverCandidate, DriverId};

/// Queries the driver location store for online, available drivers near a
/// pickup. May return stale or empty results; the kernel retries only via
/// its single radius-widening step.
pub trait CandidateProvider: Send + Sync {
    fn find_available(
        &self,
        pickup: Coordinate,
        radius_km: f64,
        vehicle_type: Option<VehicleType>,
    ) -> Result<Vec<DriverCandidate>, ProviderError>;
}

/// Fire-and-forget proposal dispatch. The driver's answer arrives
/// asynchronously through the response channel, never as a return value.
pub trait NotificationSink: Send + Sync {
    fn propose_assignment(
        &mut self,
        booking_id: &BookingId,
        driver_id: &DriverId,
        expires_at_ms: u64,
    ) -> Result<(), SinkError>;
}

/// Context persisted alongside a won assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentMetadata {
    pub pickup: Coordinate,
    pub dropoff: Coordinate,
    pub distance_km: f64,
    pub eta_minutes: f64,
    pub assigned_at_ms: u64,
}

/// Atomic conditional write keyed by booking id. Returns true when this call
/// created the assignment; false means another path already assigned the
/// booking and the caller must back off.
pub trait AssignmentStore: Send + Sync {
    fn create_if_absent(
        &mut self,
        booking_id: &BookingId,
        driver_id: &DriverId,
        metadata: &AssignmentMetadata,
    ) -> bool;
}

/// Resource wrapper for the candidate provider trait object.
#[derive(Resource)]
pub struct CandidateProviderResource(pub Box<dyn CandidateProvider>);

impl std::ops::Deref for CandidateProviderResource {
    type Target = dyn CandidateProvider;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

/// Resource wrapper for the notification sink trait object.
#[derive(Resource)]
pub struct NotificationSinkResource(pub Box<dyn NotificationSink>);

impl std::ops::Deref for NotificationSinkResource {
    type Target = dyn NotificationSink;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl std::ops::DerefMut for NotificationSinkResource {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

/// Resource wrapper for the assignment store trait object.
#[derive(Resource)]
pub struct AssignmentStoreResource(pub Box<dyn AssignmentStore>);

impl std::ops::Deref for AssignmentStoreResource {
    type Target = dyn AssignmentStore;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl std::ops::DerefMut for AssignmentStoreResource {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}
