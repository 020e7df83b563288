use bevy_ecs::prelude::{Query, Res, ResMut};

use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::ecs::{AssignmentAttempt, AttemptOutcome, Booking, BookingState, EngagedDrivers};
use crate::telemetry::DispatchTelemetry;

/// Fires at a proposal's deadline. If the attempt is still unanswered it is
/// marked expired, the driver is released, and the booking advances to the
/// next ranked candidate. Attempts already settled (answered, cancelled,
/// dispatch-failed) ignore their leftover timer.
pub fn proposal_expired_system(
    mut clock: ResMut<DispatchClock>,
    event: Res<CurrentEvent>,
    mut engaged: ResMut<EngagedDrivers>,
    mut telemetry: ResMut<DispatchTelemetry>,
    bookings: Query<&Booking>,
    mut attempts: Query<&mut AssignmentAttempt>,
) {
    if event.0.kind != EventKind::ProposalExpired {
        return;
    }
    let Some(EventSubject::Attempt(attempt_entity)) = event.0.subject.clone() else {
        return;
    };
    let Ok(mut attempt) = attempts.get_mut(attempt_entity) else {
        return;
    };
    if attempt.outcome != AttemptOutcome::Proposed {
        return;
    }

    attempt.outcome = AttemptOutcome::Expired;
    engaged.0.remove(&attempt.driver_id);
    telemetry.attempts_expired += 1;

    let Ok(booking) = bookings.get(attempt.booking) else {
        return;
    };
    if booking.state != BookingState::Proposing || booking.current_attempt != Some(attempt_entity)
    {
        return;
    }
    let now = clock.now();
    clock.schedule_at(
        now,
        EventKind::ProposalDispatch,
        Some(EventSubject::Booking(attempt.booking)),
    );
}
