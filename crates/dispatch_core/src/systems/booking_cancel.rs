use bevy_ecs::prelude::{Commands, Query, Res, ResMut};

use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::ecs::{
    AssignmentAttempt, AttemptOutcome, Booking, BookingState, EngagedDrivers, RejectReason,
};
use crate::systems::finish_booking;
use crate::telemetry::DispatchTelemetry;
use crate::types::FailureReason;

/// Caller-initiated cancellation. Terminates the match wherever it stands:
/// a live proposal is settled as `Rejected(BookingCancelled)` and its driver
/// released, and no further proposals are emitted for this booking.
/// Cancelling an already-terminal booking is a no-op.
pub fn booking_cancel_system(
    clock: Res<DispatchClock>,
    event: Res<CurrentEvent>,
    mut engaged: ResMut<EngagedDrivers>,
    mut telemetry: ResMut<DispatchTelemetry>,
    mut commands: Commands,
    mut bookings: Query<&mut Booking>,
    mut attempts: Query<&mut AssignmentAttempt>,
) {
    if event.0.kind != EventKind::BookingCancel {
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

    let now = clock.now();
    if let Some(attempt_entity) = booking.current_attempt {
        if let Ok(mut attempt) = attempts.get_mut(attempt_entity) {
            if attempt.outcome == AttemptOutcome::Proposed {
                attempt.outcome = AttemptOutcome::Rejected(RejectReason::BookingCancelled);
                attempt.responded_at = Some(now);
                engaged.0.remove(&attempt.driver_id);
            }
        }
    }

    telemetry.bookings_cancelled += 1;
    finish_booking(
        &mut commands,
        &mut telemetry,
        entity,
        &mut booking,
        now,
        BookingState::Cancelled,
        Some(FailureReason::Cancelled),
        None,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::prelude::{Entity, Schedule, World};
    use bevy_ecs::schedule::apply_deferred;

    use crate::clock::Event;
    use crate::test_helpers::booking;
    use crate::types::{BookingId, DriverId};

    fn cancel(world: &mut World, entity: Entity) {
        world.resource_mut::<DispatchClock>().schedule(Event {
            timestamp: 30_000,
            kind: EventKind::BookingCancel,
            subject: Some(EventSubject::Booking(entity)),
        });
        let event = world
            .resource_mut::<DispatchClock>()
            .pop_next()
            .expect("cancel event");
        world.insert_resource(CurrentEvent(event));
        let mut schedule = Schedule::default();
        schedule.add_systems((booking_cancel_system, apply_deferred));
        schedule.run(world);
    }

    #[test]
    fn cancel_during_proposing_settles_the_attempt() {
        let mut world = World::new();
        world.insert_resource(DispatchClock::default());
        world.insert_resource(DispatchTelemetry::default());
        world.insert_resource(EngagedDrivers::default());

        let mut component = Booking::new(booking("bk-1"), 0, 5.0);
        component.state = BookingState::Proposing;
        let entity = world.spawn(component).id();
        let attempt_entity = world
            .spawn(AssignmentAttempt {
                booking: entity,
                booking_id: BookingId::new("bk-1"),
                driver_id: DriverId::new("a"),
                proposed_at: 0,
                expires_at: 120_000,
                responded_at: None,
                outcome: AttemptOutcome::Proposed,
            })
            .id();
        world
            .entity_mut(entity)
            .get_mut::<Booking>()
            .expect("booking")
            .current_attempt = Some(attempt_entity);
        world
            .resource_mut::<EngagedDrivers>()
            .0
            .insert(DriverId::new("a"));

        cancel(&mut world, entity);

        let booking = world.entity(entity).get::<Booking>().expect("booking");
        assert_eq!(booking.state, BookingState::Cancelled);
        assert_eq!(booking.failure, Some(FailureReason::Cancelled));
        let attempt = world
            .entity(attempt_entity)
            .get::<AssignmentAttempt>()
            .expect("attempt");
        assert_eq!(
            attempt.outcome,
            AttemptOutcome::Rejected(RejectReason::BookingCancelled)
        );
        assert!(!world
            .resource::<EngagedDrivers>()
            .0
            .contains(&DriverId::new("a")));
        assert!(world.resource::<DispatchClock>().is_empty());
        assert_eq!(world.resource::<DispatchTelemetry>().bookings_cancelled, 1);
    }

    #[test]
    fn cancelling_a_terminal_booking_is_a_no_op() {
        let mut world = World::new();
        world.insert_resource(DispatchClock::default());
        world.insert_resource(DispatchTelemetry::default());
        world.insert_resource(EngagedDrivers::default());

        let mut component = Booking::new(booking("bk-1"), 0, 5.0);
        component.state = BookingState::Assigned;
        component.resolved_at = Some(10_000);
        let entity = world.spawn(component).id();

        cancel(&mut world, entity);

        let booking = world.entity(entity).get::<Booking>().expect("booking");
        assert_eq!(booking.state, BookingState::Assigned);
        assert_eq!(booking.resolved_at, Some(10_000));
        assert_eq!(world.resource::<DispatchTelemetry>().bookings_cancelled, 0);
    }
}
