//! Test helpers: fixtures and in-memory collaborators shared by the kernel
//! tests and the experiments harness.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{ProviderError, SinkError};
use crate::geo::{haversine_distance_km, Coordinate, VehicleType};
use crate::providers::{AssignmentMetadata, AssignmentStore, CandidateProvider, NotificationSink};
use crate::types::{BookingId, BookingRequest, DriverCandidate, DriverId, SelectionPriority};

/// Kilometers per degree of latitude on the 6371 km sphere.
pub const KM_PER_LAT_DEGREE: f64 = 111.194_926_644_558_74;

/// A standard pickup used across test files (Berlin, Alexanderplatz).
pub fn test_pickup() -> Coordinate {
    Coordinate::new(52.5219, 13.4132)
}

/// A point `km` north of `origin`.
pub fn km_north(origin: Coordinate, km: f64) -> Coordinate {
    Coordinate::new(origin.latitude + km / KM_PER_LAT_DEGREE, origin.longitude)
}

/// A two-wheeler candidate with a solid history, parked `km` north of the
/// test pickup. Tweak fields with struct update syntax where a test needs to.
pub fn candidate(id: &str, km: f64) -> DriverCandidate {
    DriverCandidate {
        driver_id: DriverId::new(id),
        location: km_north(test_pickup(), km),
        location_timestamp_ms: 0,
        vehicle_type: VehicleType::TwoWheeler,
        rating: 4.5,
        total_trips: 120,
        completed_trips: 110,
        avg_response_time_secs: 25.0,
        cancellation_rate: 0.05,
    }
}

/// A small booking from the test pickup, 3 km south, balanced priority.
pub fn booking(id: &str) -> BookingRequest {
    BookingRequest {
        id: BookingId::new(id),
        pickup: test_pickup(),
        dropoff: km_north(test_pickup(), -3.0),
        package_weight_kg: 2.5,
        vehicle_type_required: None,
        priority: SelectionPriority::Balanced,
    }
}

/// Candidate provider over a fixed list: filters by haversine distance from
/// the pickup and by vehicle type, or fails outright when told to.
#[derive(Debug, Default)]
pub struct StaticProvider {
    pub candidates: Vec<DriverCandidate>,
    pub fail_with: Option<String>,
}

impl StaticProvider {
    pub fn new(candidates: Vec<DriverCandidate>) -> Self {
        Self {
            candidates,
            fail_with: None,
        }
    }

    pub fn failing(cause: &str) -> Self {
        Self {
            candidates: Vec::new(),
            fail_with: Some(cause.to_string()),
        }
    }
}

impl CandidateProvider for StaticProvider {
    fn find_available(
        &self,
        pickup: Coordinate,
        radius_km: f64,
        vehicle_type: Option<VehicleType>,
    ) -> Result<Vec<DriverCandidate>, ProviderError> {
        if let Some(cause) = &self.fail_with {
            return Err(ProviderError::Unavailable(cause.clone()));
        }
        Ok(self
            .candidates
            .iter()
            .filter(|candidate| haversine_distance_km(pickup, candidate.location) <= radius_km)
            .filter(|candidate| vehicle_type.map_or(true, |vt| candidate.vehicle_type == vt))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalRecord {
    pub booking_id: BookingId,
    pub driver_id: DriverId,
    pub expires_at_ms: u64,
}

/// Shared view of everything a [RecordingSink] dispatched.
#[derive(Debug, Clone, Default)]
pub struct ProposalLog(Arc<Mutex<Vec<ProposalRecord>>>);

impl ProposalLog {
    pub fn len(&self) -> usize {
        self.0.lock().map(|log| log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<ProposalRecord> {
        self.0.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<ProposalRecord> {
        self.0.lock().ok().and_then(|log| log.last().cloned())
    }
}

/// Notification sink that records proposals; dispatch fails for drivers
/// listed in `fail_for`.
#[derive(Debug, Default)]
pub struct RecordingSink {
    log: ProposalLog,
    pub fail_for: Vec<DriverId>,
}

impl RecordingSink {
    pub fn new() -> (Self, ProposalLog) {
        let sink = Self::default();
        let log = sink.log.clone();
        (sink, log)
    }

    pub fn failing_for(fail_for: Vec<DriverId>) -> (Self, ProposalLog) {
        let (mut sink, log) = Self::new();
        sink.fail_for = fail_for;
        (sink, log)
    }
}

impl NotificationSink for RecordingSink {
    fn propose_assignment(
        &mut self,
        booking_id: &BookingId,
        driver_id: &DriverId,
        expires_at_ms: u64,
    ) -> Result<(), SinkError> {
        if self.fail_for.contains(driver_id) {
            return Err(SinkError::DispatchFailed(format!(
                "push delivery to {driver_id} failed"
            )));
        }
        if let Ok(mut log) = self.log.0.lock() {
            log.push(ProposalRecord {
                booking_id: booking_id.clone(),
                driver_id: driver_id.clone(),
                expires_at_ms,
            });
        }
        Ok(())
    }
}

/// Shared view of an [InMemoryAssignmentStore]'s contents.
#[derive(Debug, Clone, Default)]
pub struct AssignmentsHandle(Arc<Mutex<HashMap<BookingId, DriverId>>>);

impl AssignmentsHandle {
    pub fn get(&self, booking_id: &BookingId) -> Option<DriverId> {
        self.0
            .lock()
            .ok()
            .and_then(|map| map.get(booking_id).cloned())
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pre-create an assignment, simulating another process winning the race.
    pub fn preassign(&self, booking_id: BookingId, driver_id: DriverId) {
        if let Ok(mut map) = self.0.lock() {
            map.insert(booking_id, driver_id);
        }
    }
}

/// Assignment store backed by a hash map; the conditional write succeeds at
/// most once per booking id.
#[derive(Debug, Default)]
pub struct InMemoryAssignmentStore {
    assignments: AssignmentsHandle,
}

impl InMemoryAssignmentStore {
    pub fn new() -> (Self, AssignmentsHandle) {
        let store = Self::default();
        let handle = store.assignments.clone();
        (store, handle)
    }
}

impl AssignmentStore for InMemoryAssignmentStore {
    fn create_if_absent(
        &mut self,
        booking_id: &BookingId,
        driver_id: &DriverId,
        _metadata: &AssignmentMetadata,
    ) -> bool {
        let Ok(mut map) = self.assignments.0.lock() else {
            return false;
        };
        match map.entry(booking_id.clone()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(driver_id.clone());
                true
            }
        }
    }
}
