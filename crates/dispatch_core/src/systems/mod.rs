pub mod booking_cancel;
pub mod booking_inbound;
pub mod candidate_search;
pub mod driver_response;
pub mod proposal_dispatch;
pub mod proposal_expired;

use bevy_ecs::prelude::{Commands, Entity};

use crate::ecs::{Booking, BookingState, BookingStateCommands};
use crate::telemetry::DispatchTelemetry;
use crate::types::FailureReason;

/// Move a booking to a terminal state: fields, state marker, match record.
/// State counters stay with the callers.
pub(crate) fn finish_booking(
    commands: &mut Commands,
    telemetry: &mut DispatchTelemetry,
    entity: Entity,
    booking: &mut Booking,
    now: u64,
    state: BookingState,
    failure: Option<FailureReason>,
    cause: Option<String>,
) {
    debug_assert!(state.is_terminal());
    booking.state = state;
    booking.resolved_at = Some(now);
    booking.failure = failure;
    booking.failure_cause = cause;
    match state {
        BookingState::Assigned => {
            commands.entity(entity).set_booking_state_assigned();
        }
        BookingState::AssignedElsewhere => {
            commands.entity(entity).set_booking_state_assigned_elsewhere();
        }
        BookingState::Exhausted => {
            commands.entity(entity).set_booking_state_exhausted();
        }
        BookingState::Cancelled => {
            commands.entity(entity).set_booking_state_cancelled();
        }
        BookingState::Searching | BookingState::Proposing => {}
    }
    telemetry.push_record(booking, now);
}

#[cfg(test)]
mod end_to_end_tests {
    use crate::clock::ONE_SEC_MS;
    use crate::config::SearchPolicy;
    use crate::ecs::BookingState;
    use crate::error::SubmitError;
    use crate::geo::VehicleType;
    use crate::runner::MatchCoordinator;
    use crate::test_helpers::{
        booking, candidate, InMemoryAssignmentStore, RecordingSink, StaticProvider,
    };
    use crate::types::{
        BookingId, DriverId, DriverResponse, FailureReason, MatchOutcome, ResponseOutcome,
        SelectionPriority,
    };

    fn accepted(booking_id: &str, driver_id: &str) -> DriverResponse {
        DriverResponse {
            booking_id: BookingId::new(booking_id),
            driver_id: DriverId::new(driver_id),
            outcome: ResponseOutcome::Accepted,
        }
    }

    fn rejected(booking_id: &str, driver_id: &str) -> DriverResponse {
        DriverResponse {
            booking_id: BookingId::new(booking_id),
            driver_id: DriverId::new(driver_id),
            outcome: ResponseOutcome::Rejected,
        }
    }

    #[test]
    fn matches_one_booking_end_to_end() {
        let provider = StaticProvider::new(vec![candidate("near", 1.0), candidate("far", 3.0)]);
        let (sink, proposals) = RecordingSink::new();
        let (store, assignments) = InMemoryAssignmentStore::new();
        let mut coordinator = MatchCoordinator::new(
            SearchPolicy::default(),
            Box::new(provider),
            Box::new(sink),
            Box::new(store),
        );

        coordinator.submit(booking("bk-1")).expect("submit");
        // The nearest driver accepts 20 s after the proposal goes out.
        coordinator.schedule_response_at(20 * ONE_SEC_MS, accepted("bk-1", "near"));
        coordinator.run_until_idle();

        assert_eq!(
            coordinator.state_of(&BookingId::new("bk-1")),
            Some(BookingState::Assigned)
        );
        let outcome = coordinator.outcome(&BookingId::new("bk-1")).expect("outcome");
        let MatchOutcome::Assigned {
            driver_id,
            alternatives,
        } = outcome
        else {
            panic!("expected assignment, got {outcome:?}");
        };
        assert_eq!(driver_id, DriverId::new("near"));
        assert_eq!(alternatives.len(), 1);
        assert_eq!(alternatives[0].driver_id, DriverId::new("far"));
        assert_eq!(proposals.len(), 1);
        assert_eq!(
            assignments.get(&BookingId::new("bk-1")),
            Some(DriverId::new("near"))
        );
        assert_eq!(coordinator.telemetry().bookings_assigned, 1);
    }

    #[test]
    fn all_rejections_exhaust_after_exactly_two_attempts() {
        let provider = StaticProvider::new(vec![candidate("a", 1.0), candidate("b", 2.0)]);
        let (sink, proposals) = RecordingSink::new();
        let (store, _) = InMemoryAssignmentStore::new();
        let mut coordinator = MatchCoordinator::new(
            SearchPolicy::default(),
            Box::new(provider),
            Box::new(sink),
            Box::new(store),
        );

        coordinator.submit(booking("bk-1")).expect("submit");
        coordinator.schedule_response_at(10 * ONE_SEC_MS, rejected("bk-1", "a"));
        coordinator.schedule_response_at(30 * ONE_SEC_MS, rejected("bk-1", "b"));
        coordinator.run_until_idle();

        let outcome = coordinator.outcome(&BookingId::new("bk-1")).expect("outcome");
        let MatchOutcome::Failed {
            reason, attempted, ..
        } = outcome
        else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(reason, FailureReason::AllCandidatesExhausted);
        assert_eq!(attempted.len(), 2);
        assert_eq!(proposals.len(), 2);
        assert_eq!(coordinator.telemetry().attempts_rejected, 2);
        assert_eq!(coordinator.telemetry().proposals_sent, 2);
    }

    #[test]
    fn timeout_advances_to_the_next_candidate_without_intervention() {
        let provider = StaticProvider::new(vec![candidate("silent", 1.0), candidate("backup", 2.0)]);
        let (sink, proposals) = RecordingSink::new();
        let (store, _) = InMemoryAssignmentStore::new();
        let mut coordinator = MatchCoordinator::new(
            SearchPolicy::default(),
            Box::new(provider),
            Box::new(sink),
            Box::new(store),
        );

        coordinator.submit(booking("bk-1")).expect("submit");
        // "silent" never answers; "backup" accepts shortly after being asked.
        coordinator.schedule_response_at(150 * ONE_SEC_MS, accepted("bk-1", "backup"));
        coordinator.run_until_idle();

        let dispatched: Vec<_> = proposals
            .all()
            .into_iter()
            .map(|record| record.driver_id.0)
            .collect();
        assert_eq!(dispatched, ["silent", "backup"]);
        // The second proposal went out exactly when the first expired.
        assert_eq!(proposals.all()[1].expires_at_ms, 240 * ONE_SEC_MS);
        assert_eq!(coordinator.telemetry().attempts_expired, 1);
        assert_eq!(
            coordinator.state_of(&BookingId::new("bk-1")),
            Some(BookingState::Assigned)
        );
    }

    #[test]
    fn widens_the_radius_once_and_matches() {
        // 8 km out: invisible at the 5 km initial radius, found at 15 km.
        let provider = StaticProvider::new(vec![candidate("edge", 8.0)]);
        let (sink, _) = RecordingSink::new();
        let (store, _) = InMemoryAssignmentStore::new();
        let mut coordinator = MatchCoordinator::new(
            SearchPolicy::default(),
            Box::new(provider),
            Box::new(sink),
            Box::new(store),
        );

        coordinator.submit(booking("bk-1")).expect("submit");
        coordinator.schedule_response_at(5 * ONE_SEC_MS, accepted("bk-1", "edge"));
        coordinator.run_until_idle();

        assert_eq!(coordinator.telemetry().radius_widenings, 1);
        assert_eq!(
            coordinator.state_of(&BookingId::new("bk-1")),
            Some(BookingState::Assigned)
        );
    }

    #[test]
    fn empty_pool_exhausts_with_no_drivers_found() {
        let provider = StaticProvider::new(vec![candidate("beyond", 40.0)]);
        let (sink, proposals) = RecordingSink::new();
        let (store, _) = InMemoryAssignmentStore::new();
        let mut coordinator = MatchCoordinator::new(
            SearchPolicy::default(),
            Box::new(provider),
            Box::new(sink),
            Box::new(store),
        );

        coordinator.submit(booking("bk-1")).expect("submit");
        coordinator.run_until_idle();

        let outcome = coordinator.outcome(&BookingId::new("bk-1")).expect("outcome");
        assert_eq!(
            outcome,
            MatchOutcome::Failed {
                reason: FailureReason::NoDriversFound,
                attempted: Vec::new(),
                cause: None,
            }
        );
        assert!(proposals.is_empty());
        // One widening was still tried before giving up.
        assert_eq!(coordinator.telemetry().radius_widenings, 1);
    }

    #[test]
    fn cancellation_during_proposing_stops_everything() {
        let provider = StaticProvider::new(vec![candidate("a", 1.0), candidate("b", 2.0)]);
        let (sink, proposals) = RecordingSink::new();
        let (store, assignments) = InMemoryAssignmentStore::new();
        let mut coordinator = MatchCoordinator::new(
            SearchPolicy::default(),
            Box::new(provider),
            Box::new(sink),
            Box::new(store),
        );

        coordinator.submit(booking("bk-1")).expect("submit");
        // Let the first proposal go out, then cancel before anyone answers.
        coordinator.advance_to(10 * ONE_SEC_MS);
        assert_eq!(proposals.len(), 1);
        coordinator.cancel(&BookingId::new("bk-1"));
        coordinator.run_until_idle();

        assert_eq!(
            coordinator.state_of(&BookingId::new("bk-1")),
            Some(BookingState::Cancelled)
        );
        let outcome = coordinator.outcome(&BookingId::new("bk-1")).expect("outcome");
        let MatchOutcome::Failed { reason, .. } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(reason, FailureReason::Cancelled);
        // No further proposals after the cancel, and nothing was assigned.
        assert_eq!(proposals.len(), 1);
        assert!(assignments.is_empty());
    }

    #[test]
    fn losing_the_assignment_race_resolves_quietly() {
        let provider = StaticProvider::new(vec![candidate("a", 1.0)]);
        let (sink, _) = RecordingSink::new();
        let (store, assignments) = InMemoryAssignmentStore::new();
        let mut coordinator = MatchCoordinator::new(
            SearchPolicy::default(),
            Box::new(provider),
            Box::new(sink),
            Box::new(store),
        );

        // Another process assigns the booking while our proposal is pending.
        assignments.preassign(BookingId::new("bk-1"), DriverId::new("other"));
        coordinator.submit(booking("bk-1")).expect("submit");
        coordinator.schedule_response_at(15 * ONE_SEC_MS, accepted("bk-1", "a"));
        coordinator.run_until_idle();

        assert_eq!(
            coordinator.state_of(&BookingId::new("bk-1")),
            Some(BookingState::AssignedElsewhere)
        );
        assert_eq!(
            coordinator.outcome(&BookingId::new("bk-1")),
            Some(MatchOutcome::AssignedElsewhere)
        );
        assert_eq!(coordinator.telemetry().races_lost, 1);
        assert_eq!(assignments.get(&BookingId::new("bk-1")), Some(DriverId::new("other")));
    }

    #[test]
    fn dispatch_failure_advances_to_the_next_candidate() {
        let provider = StaticProvider::new(vec![candidate("broken", 1.0), candidate("ok", 2.0)]);
        let (sink, proposals) = RecordingSink::failing_for(vec![DriverId::new("broken")]);
        let (store, _) = InMemoryAssignmentStore::new();
        let mut coordinator = MatchCoordinator::new(
            SearchPolicy::default(),
            Box::new(provider),
            Box::new(sink),
            Box::new(store),
        );

        coordinator.submit(booking("bk-1")).expect("submit");
        coordinator.schedule_response_at(5 * ONE_SEC_MS, accepted("bk-1", "ok"));
        coordinator.run_until_idle();

        // Only the reachable driver ever saw a proposal.
        let dispatched: Vec<_> = proposals
            .all()
            .into_iter()
            .map(|record| record.driver_id.0)
            .collect();
        assert_eq!(dispatched, ["ok"]);
        assert_eq!(coordinator.telemetry().dispatch_failures, 1);
        assert_eq!(
            coordinator.state_of(&BookingId::new("bk-1")),
            Some(BookingState::Assigned)
        );
    }

    #[test]
    fn provider_failure_surfaces_the_cause() {
        let provider = StaticProvider::failing("location store timeout");
        let (sink, _) = RecordingSink::new();
        let (store, _) = InMemoryAssignmentStore::new();
        let mut coordinator = MatchCoordinator::new(
            SearchPolicy::default(),
            Box::new(provider),
            Box::new(sink),
            Box::new(store),
        );

        coordinator.submit(booking("bk-1")).expect("submit");
        coordinator.run_until_idle();

        let outcome = coordinator.outcome(&BookingId::new("bk-1")).expect("outcome");
        let MatchOutcome::Failed { reason, cause, .. } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(reason, FailureReason::NoDriversFound);
        assert!(cause.unwrap_or_default().contains("location store timeout"));
    }

    #[test]
    fn resubmitting_an_in_flight_booking_is_refused() {
        let provider = StaticProvider::new(vec![candidate("a", 1.0)]);
        let (sink, proposals) = RecordingSink::new();
        let (store, _) = InMemoryAssignmentStore::new();
        let mut coordinator = MatchCoordinator::new(
            SearchPolicy::default(),
            Box::new(provider),
            Box::new(sink),
            Box::new(store),
        );

        coordinator.submit(booking("bk-1")).expect("submit");
        coordinator.advance_to(ONE_SEC_MS);
        assert_eq!(
            coordinator.submit(booking("bk-1")),
            Err(SubmitError::AlreadyInFlight)
        );
        // A resolved booking may be matched again.
        coordinator.schedule_response_at(10 * ONE_SEC_MS, rejected("bk-1", "a"));
        coordinator.run_until_idle();
        assert_eq!(
            coordinator.state_of(&BookingId::new("bk-1")),
            Some(BookingState::Exhausted)
        );
        coordinator.submit(booking("bk-1")).expect("resubmit after terminal");
        coordinator.schedule_response_at(
            coordinator.now() + 10 * ONE_SEC_MS,
            accepted("bk-1", "a"),
        );
        coordinator.run_until_idle();
        assert_eq!(
            coordinator.state_of(&BookingId::new("bk-1")),
            Some(BookingState::Assigned)
        );
        assert_eq!(proposals.len(), 2);
    }

    #[test]
    fn late_response_after_expiry_is_ignored() {
        let provider = StaticProvider::new(vec![candidate("slow", 1.0)]);
        let (sink, _) = RecordingSink::new();
        let (store, assignments) = InMemoryAssignmentStore::new();
        let mut coordinator = MatchCoordinator::new(
            SearchPolicy::default(),
            Box::new(provider),
            Box::new(sink),
            Box::new(store),
        );

        coordinator.submit(booking("bk-1")).expect("submit");
        // Acceptance arrives after the 120 s proposal window has closed.
        coordinator.schedule_response_at(300 * ONE_SEC_MS, accepted("bk-1", "slow"));
        coordinator.run_until_idle();

        assert_eq!(
            coordinator.state_of(&BookingId::new("bk-1")),
            Some(BookingState::Exhausted)
        );
        assert!(assignments.is_empty());
        assert_eq!(coordinator.telemetry().stale_responses, 1);
        assert_eq!(coordinator.telemetry().attempts_expired, 1);
    }

    #[test]
    fn at_most_one_live_attempt_exists_per_booking() {
        let provider = StaticProvider::new(vec![candidate("a", 1.0), candidate("b", 2.0)]);
        let (sink, _) = RecordingSink::new();
        let (store, _) = InMemoryAssignmentStore::new();
        let mut coordinator = MatchCoordinator::new(
            SearchPolicy::default(),
            Box::new(provider),
            Box::new(sink),
            Box::new(store),
        );

        coordinator.submit(booking("bk-1")).expect("submit");
        // Let the first proposal expire so the second is in flight.
        coordinator.advance_to(130 * ONE_SEC_MS);

        let world = coordinator.world_mut();
        let mut query = world.query::<&crate::ecs::AssignmentAttempt>();
        let attempts: Vec<_> = query.iter(world).cloned().collect();
        assert_eq!(attempts.len(), 2);
        let live = attempts
            .iter()
            .filter(|attempt| !attempt.outcome.is_terminal())
            .count();
        assert_eq!(live, 1);
        // The second attempt only started once the first was terminal.
        let first = attempts
            .iter()
            .find(|attempt| attempt.driver_id == DriverId::new("a"))
            .expect("first attempt");
        let second = attempts
            .iter()
            .find(|attempt| attempt.driver_id == DriverId::new("b"))
            .expect("second attempt");
        assert!(first.outcome.is_terminal());
        assert!(second.proposed_at >= first.expires_at);
    }

    #[test]
    fn heavy_package_only_matches_four_wheelers() {
        let mut van = candidate("van", 2.0);
        van.vehicle_type = VehicleType::FourWheeler;
        let provider = StaticProvider::new(vec![candidate("moto", 1.0), van]);
        let (sink, proposals) = RecordingSink::new();
        let (store, _) = InMemoryAssignmentStore::new();
        let mut coordinator = MatchCoordinator::new(
            SearchPolicy::default(),
            Box::new(provider),
            Box::new(sink),
            Box::new(store),
        );

        let mut request = booking("bk-1");
        request.package_weight_kg = 18.0;
        request.priority = SelectionPriority::Closest;
        coordinator.submit(request).expect("submit");
        coordinator.schedule_response_at(5 * ONE_SEC_MS, accepted("bk-1", "van"));
        coordinator.run_until_idle();

        let dispatched: Vec<_> = proposals
            .all()
            .into_iter()
            .map(|record| record.driver_id.0)
            .collect();
        assert_eq!(dispatched, ["van"]);
    }
}
