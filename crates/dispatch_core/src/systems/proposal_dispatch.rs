use bevy_ecs::prelude::{Commands, Query, Res, ResMut};

use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject, ONE_SEC_MS};
use crate::config::SearchPolicy;
use crate::ecs::{
    AssignmentAttempt, AttemptOutcome, Booking, BookingState, BookingStateCommands, EngagedDrivers,
    RejectReason,
};
use crate::providers::NotificationSinkResource;
use crate::systems::finish_booking;
use crate::telemetry::DispatchTelemetry;
use crate::types::FailureReason;

/// Proposes the booking to the next ranked candidate: spawns the
/// [AssignmentAttempt], notifies the sink and arms the expiry timer.
///
/// A sink dispatch failure settles the attempt as `Rejected(DispatchFailed)`
/// on the spot and moves on to the following candidate, so one pass of this
/// system always ends with either a live proposal or an exhausted booking.
/// Proposals within one booking are strictly sequential: a new attempt is
/// only created here, after the previous one reached a terminal outcome.
pub fn proposal_dispatch_system(
    mut clock: ResMut<DispatchClock>,
    event: Res<CurrentEvent>,
    policy: Res<SearchPolicy>,
    mut sink: ResMut<NotificationSinkResource>,
    mut engaged: ResMut<EngagedDrivers>,
    mut telemetry: ResMut<DispatchTelemetry>,
    mut commands: Commands,
    mut bookings: Query<&mut Booking>,
    attempts: Query<&AssignmentAttempt>,
) {
    if event.0.kind != EventKind::ProposalDispatch {
        return;
    }
    let Some(EventSubject::Booking(entity)) = event.0.subject.clone() else {
        return;
    };
    let Ok(mut booking) = bookings.get_mut(entity) else {
        return;
    };
    if booking.is_terminal() {
        return;
    }
    debug_assert!(
        booking
            .current_attempt
            .map_or(true, |attempt| attempts
                .get(attempt)
                .map_or(true, |attempt| attempt.outcome.is_terminal())),
        "a booking may never hold two live attempts"
    );

    let now = clock.now();
    loop {
        let Some(entry) = booking.ranked.get(booking.next_candidate).cloned() else {
            telemetry.bookings_exhausted += 1;
            finish_booking(
                &mut commands,
                &mut telemetry,
                entity,
                &mut booking,
                now,
                BookingState::Exhausted,
                Some(FailureReason::AllCandidatesExhausted),
                None,
            );
            return;
        };
        booking.next_candidate += 1;
        booking.attempt_count += 1;

        let expires_at = now + policy.proposal_timeout_secs * ONE_SEC_MS;
        let mut attempt = AssignmentAttempt {
            booking: entity,
            booking_id: booking.request.id.clone(),
            driver_id: entry.driver_id.clone(),
            proposed_at: now,
            expires_at,
            responded_at: None,
            outcome: AttemptOutcome::Proposed,
        };

        match sink.propose_assignment(&booking.request.id, &entry.driver_id, expires_at) {
            Ok(()) => {
                let attempt_entity = commands.spawn(attempt).id();
                booking.current_attempt = Some(attempt_entity);
                if booking.state != BookingState::Proposing {
                    booking.state = BookingState::Proposing;
                    commands.entity(entity).set_booking_state_proposing();
                }
                engaged.0.insert(entry.driver_id);
                telemetry.proposals_sent += 1;
                clock.schedule_at(
                    expires_at,
                    EventKind::ProposalExpired,
                    Some(EventSubject::Attempt(attempt_entity)),
                );
                return;
            }
            Err(_) => {
                // The driver never saw this; settle the attempt and keep going.
                attempt.responded_at = Some(now);
                attempt.outcome = AttemptOutcome::Rejected(RejectReason::DispatchFailed);
                let attempt_entity = commands.spawn(attempt).id();
                booking.current_attempt = Some(attempt_entity);
                telemetry.dispatch_failures += 1;
            }
        }
    }
}
