//! Telemetry / KPIs: counters plus one record per resolved booking.

use bevy_ecs::prelude::Resource;
use serde::Serialize;

use crate::ecs::{Booking, BookingState};
use crate::types::{BookingId, DriverId, FailureReason};

/// One resolved booking, recorded at the terminal transition.
/// Timestamps are clock milliseconds; use the helper methods for derived KPIs.
#[derive(Debug, Clone, Serialize)]
pub struct MatchRecord {
    pub booking_id: BookingId,
    pub final_state: BookingState,
    pub failure: Option<FailureReason>,
    pub winning_driver: Option<DriverId>,
    pub requested_at: u64,
    pub resolved_at: u64,
    /// Assignment attempts created, including failed dispatches.
    pub proposals: u32,
    pub radius_widened: bool,
}

impl MatchRecord {
    /// Time from submission to the terminal state.
    pub fn time_to_resolve_ms(&self) -> u64 {
        self.resolved_at.saturating_sub(self.requested_at)
    }

    pub fn was_assigned(&self) -> bool {
        self.final_state == BookingState::Assigned
    }
}

/// Collects dispatch telemetry. Insert as a resource to record resolutions.
#[derive(Debug, Default, Resource)]
pub struct DispatchTelemetry {
    pub bookings_submitted: u64,
    pub proposals_sent: u64,
    pub attempts_accepted: u64,
    pub attempts_rejected: u64,
    pub attempts_expired: u64,
    pub dispatch_failures: u64,
    pub provider_failures: u64,
    pub radius_widenings: u64,
    pub races_lost: u64,
    pub bookings_assigned: u64,
    pub bookings_exhausted: u64,
    pub bookings_cancelled: u64,
    /// Responses for unknown bookings, terminal bookings, settled attempts
    /// or drivers other than the one currently proposed to.
    pub stale_responses: u64,
    pub resolved: Vec<MatchRecord>,
}

impl DispatchTelemetry {
    /// Record a booking's terminal state. Call exactly once per booking,
    /// after its fields are final.
    pub fn push_record(&mut self, booking: &Booking, resolved_at: u64) {
        let winning_driver = (booking.state == BookingState::Assigned)
            .then(|| booking.current_ranked().map(|entry| entry.driver_id.clone()))
            .flatten();
        self.resolved.push(MatchRecord {
            booking_id: booking.request.id.clone(),
            final_state: booking.state,
            failure: booking.failure,
            winning_driver,
            requested_at: booking.requested_at,
            resolved_at,
            proposals: booking.attempt_count,
            radius_widened: booking.radius_widened,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_to_resolve_is_clamped() {
        let record = MatchRecord {
            booking_id: BookingId::new("bk-1"),
            final_state: BookingState::Assigned,
            failure: None,
            winning_driver: Some(DriverId::new("drv-1")),
            requested_at: 5_000,
            resolved_at: 65_000,
            proposals: 1,
            radius_widened: false,
        };
        assert_eq!(record.time_to_resolve_ms(), 60_000);
        assert!(record.was_assigned());
    }
}
