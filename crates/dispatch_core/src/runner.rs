//! Dispatch runner: advances the clock and routes events into the ECS.
//!
//! Clock progression and event routing happen here, outside systems. Each
//! step pops the next event from [DispatchClock], inserts it as
//! [CurrentEvent], then runs the schedule. [MatchCoordinator] wraps a world
//! plus schedule into the caller-facing surface.

use bevy_ecs::prelude::{Res, Schedule, World};
use bevy_ecs::schedule::{apply_deferred, IntoSystemConfigs};

use crate::clock::{CurrentEvent, DispatchClock, EventKind, EventSubject};
use crate::config::SearchPolicy;
use crate::ecs::{Booking, BookingIndex, BookingState, EngagedDrivers, Searching};
use crate::error::SubmitError;
use crate::providers::{
    AssignmentStore, AssignmentStoreResource, CandidateProvider, CandidateProviderResource,
    NotificationSink, NotificationSinkResource,
};
use crate::systems::{
    booking_cancel::booking_cancel_system, booking_inbound::booking_inbound_system,
    candidate_search::candidate_search_system, driver_response::driver_response_system,
    proposal_dispatch::proposal_dispatch_system, proposal_expired::proposal_expired_system,
};
use crate::telemetry::DispatchTelemetry;
use crate::types::{
    BookingId, BookingRequest, DriverResponse, FailureReason, MatchOutcome, SelectionPriority,
};

/// Backstop against runaway event loops.
const MAX_STEPS: usize = 1_000_000;

// Condition functions for each event kind.
fn is_booking_inbound(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::BookingInbound)
        .unwrap_or(false)
}

fn is_booking_cancel(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::BookingCancel)
        .unwrap_or(false)
}

fn is_candidate_search(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::CandidateSearch)
        .unwrap_or(false)
}

fn is_proposal_dispatch(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::ProposalDispatch)
        .unwrap_or(false)
}

fn is_driver_response(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::DriverResponse)
        .unwrap_or(false)
}

fn is_proposal_expired(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::ProposalExpired)
        .unwrap_or(false)
}

/// Build the schedule wiring every event kind to its system.
pub fn dispatch_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems(
        (
            booking_inbound_system.run_if(is_booking_inbound),
            booking_cancel_system.run_if(is_booking_cancel),
            candidate_search_system.run_if(is_candidate_search),
            proposal_dispatch_system.run_if(is_proposal_dispatch),
            driver_response_system.run_if(is_driver_response),
            proposal_expired_system.run_if(is_proposal_expired),
            apply_deferred,
        )
            .chain(),
    );
    schedule
}

/// Process one event. Returns false when the queue is empty.
pub fn step(world: &mut World, schedule: &mut Schedule) -> bool {
    let Some(event) = world.resource_mut::<DispatchClock>().pop_next() else {
        return false;
    };
    world.insert_resource(CurrentEvent(event));
    schedule.run(world);
    true
}

/// Process one event only if it is due at or before `deadline_ms`. The clock
/// is left untouched otherwise.
pub fn step_before(world: &mut World, schedule: &mut Schedule, deadline_ms: u64) -> bool {
    let Some(event) = world
        .resource_mut::<DispatchClock>()
        .pop_next_before(deadline_ms)
    else {
        return false;
    };
    world.insert_resource(CurrentEvent(event));
    schedule.run(world);
    true
}

/// Drain the event queue. Returns the number of events processed.
pub fn run_until_empty(world: &mut World, schedule: &mut Schedule, max_steps: usize) -> usize {
    let mut steps = 0;
    while steps < max_steps && step(world, schedule) {
        steps += 1;
    }
    steps
}

/// Process every event due at or before `end_time_ms`, then move the clock
/// there. Later events stay queued.
pub fn run_until(
    world: &mut World,
    schedule: &mut Schedule,
    end_time_ms: u64,
    max_steps: usize,
) -> usize {
    let mut steps = 0;
    while steps < max_steps {
        let Some(event) = world
            .resource_mut::<DispatchClock>()
            .pop_next_before(end_time_ms)
        else {
            break;
        };
        world.insert_resource(CurrentEvent(event));
        schedule.run(world);
        steps += 1;
    }
    world
        .resource_mut::<DispatchClock>()
        .fast_forward(end_time_ms);
    steps
}

/// Caller-facing surface of the matching kernel.
///
/// Owns the ECS world and schedule; one coordinator serves any number of
/// concurrently matching bookings, interleaved on the shared event queue.
pub struct MatchCoordinator {
    world: World,
    schedule: Schedule,
}

impl MatchCoordinator {
    pub fn new(
        policy: SearchPolicy,
        provider: Box<dyn CandidateProvider>,
        sink: Box<dyn NotificationSink>,
        store: Box<dyn AssignmentStore>,
    ) -> Self {
        let mut world = World::new();
        world.insert_resource(DispatchClock::default());
        world.insert_resource(policy);
        world.insert_resource(BookingIndex::default());
        world.insert_resource(EngagedDrivers::default());
        world.insert_resource(DispatchTelemetry::default());
        world.insert_resource(CandidateProviderResource(provider));
        world.insert_resource(NotificationSinkResource(sink));
        world.insert_resource(AssignmentStoreResource(store));
        Self {
            world,
            schedule: dispatch_schedule(),
        }
    }

    /// Validate and enqueue a booking for matching. Rejects malformed
    /// requests and bookings that already have a non-terminal match running;
    /// a booking that resolved may be submitted again.
    pub fn submit(&mut self, request: BookingRequest) -> Result<(), SubmitError> {
        request.validate()?;
        if let Some(&existing) = self.world.resource::<BookingIndex>().0.get(&request.id) {
            let in_flight = self
                .world
                .get::<Booking>(existing)
                .is_some_and(|booking| !booking.is_terminal());
            if in_flight {
                return Err(SubmitError::AlreadyInFlight);
            }
        }

        let id = request.id.clone();
        let now = self.world.resource::<DispatchClock>().now();
        let radius = self.world.resource::<SearchPolicy>().initial_radius_km;
        let entity = self
            .world
            .spawn((Booking::new(request, now, radius), Searching))
            .id();
        self.world.resource_mut::<BookingIndex>().0.insert(id, entity);
        self.world.resource_mut::<DispatchClock>().schedule_at(
            now,
            EventKind::BookingInbound,
            Some(EventSubject::Booking(entity)),
        );
        Ok(())
    }

    /// Submit with the caller's priority override applied.
    pub fn submit_with_priority(
        &mut self,
        mut request: BookingRequest,
        priority: SelectionPriority,
    ) -> Result<(), SubmitError> {
        request.priority = priority;
        self.submit(request)
    }

    /// Deliver a driver reply at the current instant. Replies for unknown
    /// bookings are counted as stale and dropped.
    pub fn deliver_response(&mut self, response: DriverResponse) {
        let now = self.now();
        self.schedule_response_at(now, response);
    }

    /// Enqueue a driver reply at a specific clock time (harness surface; a
    /// timestamp in the past is clamped to now).
    pub fn schedule_response_at(&mut self, at_ms: u64, response: DriverResponse) {
        let Some(&entity) = self
            .world
            .resource::<BookingIndex>()
            .0
            .get(&response.booking_id)
        else {
            self.world.resource_mut::<DispatchTelemetry>().stale_responses += 1;
            return;
        };
        self.world.resource_mut::<DispatchClock>().schedule_at(
            at_ms,
            EventKind::DriverResponse,
            Some(EventSubject::Response(entity, response)),
        );
    }

    /// Cancel an in-flight match. Unknown booking ids are a no-op.
    pub fn cancel(&mut self, booking_id: &BookingId) {
        let Some(&entity) = self.world.resource::<BookingIndex>().0.get(booking_id) else {
            return;
        };
        let now = self.now();
        self.world.resource_mut::<DispatchClock>().schedule_at(
            now,
            EventKind::BookingCancel,
            Some(EventSubject::Booking(entity)),
        );
    }

    pub fn now(&self) -> u64 {
        self.world.resource::<DispatchClock>().now()
    }

    /// Process one event. Returns false when the queue is empty.
    pub fn step(&mut self) -> bool {
        step(&mut self.world, &mut self.schedule)
    }

    /// Process one event due at or before `deadline_ms`, if there is one.
    pub fn step_before(&mut self, deadline_ms: u64) -> bool {
        step_before(&mut self.world, &mut self.schedule, deadline_ms)
    }

    /// Drain the event queue; the clock ends at the last event processed.
    pub fn run_until_idle(&mut self) -> usize {
        run_until_empty(&mut self.world, &mut self.schedule, MAX_STEPS)
    }

    /// Process everything due up to `now_ms` and move the clock there.
    pub fn advance_to(&mut self, now_ms: u64) -> usize {
        run_until(&mut self.world, &mut self.schedule, now_ms, MAX_STEPS)
    }

    pub fn state_of(&self, booking_id: &BookingId) -> Option<BookingState> {
        let &entity = self.world.resource::<BookingIndex>().0.get(booking_id)?;
        self.world.get::<Booking>(entity).map(|booking| booking.state)
    }

    /// The result of a resolved booking; `None` while matching is still in
    /// flight (or the id is unknown).
    pub fn outcome(&self, booking_id: &BookingId) -> Option<MatchOutcome> {
        let &entity = self.world.resource::<BookingIndex>().0.get(booking_id)?;
        let booking = self.world.get::<Booking>(entity)?;
        match booking.state {
            BookingState::Searching | BookingState::Proposing => None,
            BookingState::Assigned => {
                let driver_id = booking.current_ranked().map(|entry| entry.driver_id.clone())?;
                Some(MatchOutcome::Assigned {
                    driver_id,
                    alternatives: booking.alternatives(),
                })
            }
            BookingState::AssignedElsewhere => Some(MatchOutcome::AssignedElsewhere),
            BookingState::Exhausted => Some(MatchOutcome::Failed {
                reason: booking.failure.unwrap_or(FailureReason::AllCandidatesExhausted),
                attempted: booking.attempted().to_vec(),
                cause: booking.failure_cause.clone(),
            }),
            BookingState::Cancelled => Some(MatchOutcome::Failed {
                reason: FailureReason::Cancelled,
                attempted: booking.attempted().to_vec(),
                cause: None,
            }),
        }
    }

    pub fn telemetry(&self) -> &DispatchTelemetry {
        self.world.resource::<DispatchTelemetry>()
    }

    /// Escape hatch for harnesses that need direct world access.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}
