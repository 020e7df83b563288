use bevy_ecs::prelude::{Commands, Query, Res, ResMut};

use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::ecs::{
    AssignmentAttempt, AttemptOutcome, Booking, BookingState, EngagedDrivers, RejectReason,
};
use crate::providers::{AssignmentMetadata, AssignmentStoreResource};
use crate::systems::finish_booking;
use crate::telemetry::DispatchTelemetry;
use crate::types::ResponseOutcome;

/// Settles the in-flight attempt from a driver reply.
///
/// Acceptance goes through the assignment store's conditional write: winning
/// it assigns the booking, losing it means another path already resolved the
/// booking and the coordinator backs off (`AssignedElsewhere`). A decline
/// advances to the next ranked candidate. Replies that do not match the live
/// attempt (terminal booking, settled attempt, different driver) are counted
/// and dropped.
pub fn driver_response_system(
    mut clock: ResMut<DispatchClock>,
    event: Res<CurrentEvent>,
    mut store: ResMut<AssignmentStoreResource>,
    mut engaged: ResMut<EngagedDrivers>,
    mut telemetry: ResMut<DispatchTelemetry>,
    mut commands: Commands,
    mut bookings: Query<&mut Booking>,
    mut attempts: Query<&mut AssignmentAttempt>,
) {
    if event.0.kind != EventKind::DriverResponse {
        return;
    }
    let Some(EventSubject::Response(entity, response)) = event.0.subject.clone() else {
        return;
    };
    let Ok(mut booking) = bookings.get_mut(entity) else {
        telemetry.stale_responses += 1;
        return;
    };
    if booking.state != BookingState::Proposing {
        telemetry.stale_responses += 1;
        return;
    }
    let Some(attempt_entity) = booking.current_attempt else {
        telemetry.stale_responses += 1;
        return;
    };
    let Ok(mut attempt) = attempts.get_mut(attempt_entity) else {
        telemetry.stale_responses += 1;
        return;
    };
    if attempt.outcome != AttemptOutcome::Proposed || attempt.driver_id != response.driver_id {
        telemetry.stale_responses += 1;
        return;
    }

    let now = clock.now();
    attempt.responded_at = Some(now);
    match response.outcome {
        ResponseOutcome::Accepted => {
            attempt.outcome = AttemptOutcome::Accepted;
            telemetry.attempts_accepted += 1;
            let Some(entry) = booking.current_ranked().cloned() else {
                return;
            };
            let metadata = AssignmentMetadata {
                pickup: booking.request.pickup,
                dropoff: booking.request.dropoff,
                distance_km: entry.distance_km,
                eta_minutes: entry.eta_minutes,
                assigned_at_ms: now,
            };
            if store.create_if_absent(&booking.request.id, &response.driver_id, &metadata) {
                telemetry.bookings_assigned += 1;
                finish_booking(
                    &mut commands,
                    &mut telemetry,
                    entity,
                    &mut booking,
                    now,
                    BookingState::Assigned,
                    None,
                    None,
                );
            } else {
                // Someone else assigned this booking first; the driver is
                // free again and this coordinator is done.
                engaged.0.remove(&response.driver_id);
                telemetry.races_lost += 1;
                finish_booking(
                    &mut commands,
                    &mut telemetry,
                    entity,
                    &mut booking,
                    now,
                    BookingState::AssignedElsewhere,
                    None,
                    None,
                );
            }
        }
        ResponseOutcome::Rejected => {
            attempt.outcome = AttemptOutcome::Rejected(RejectReason::DriverDeclined);
            engaged.0.remove(&response.driver_id);
            telemetry.attempts_rejected += 1;
            clock.schedule_at(
                now,
                EventKind::ProposalDispatch,
                Some(EventSubject::Booking(entity)),
            );
        }
    }
}
