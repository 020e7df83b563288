//! ECS components and shared resources of the assignment state machine.
//!
//! Each booking under matching is an entity carrying a [Booking] component
//! plus one state marker; each proposal to a driver is its own
//! [AssignmentAttempt] entity. Markers let systems and diagnostics filter by
//! state without scanning component fields.

use std::collections::{HashMap, HashSet};

use bevy_ecs::prelude::{Component, Entity, Resource};
use bevy_ecs::system::EntityCommands;
use serde::{Deserialize, Serialize};

use crate::types::{BookingId, BookingRequest, DriverId, FailureReason, RankedCandidate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingState {
    Searching,
    Proposing,
    Assigned,
    /// Another path won the conditional write; resolved without error.
    AssignedElsewhere,
    Exhausted,
    Cancelled,
}

impl BookingState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BookingState::Searching | BookingState::Proposing)
    }
}

/// A booking being matched. Owns the ranked candidate list and the pointer to
/// the attempt currently in flight; at most one non-terminal attempt exists
/// per booking at any time.
#[derive(Debug, Clone, Component)]
pub struct Booking {
    pub request: BookingRequest,
    pub state: BookingState,
    pub requested_at: u64,
    pub resolved_at: Option<u64>,
    pub search_radius_km: f64,
    pub radius_widened: bool,
    pub ranked: Vec<RankedCandidate>,
    /// Index into `ranked` of the next candidate to propose to.
    pub next_candidate: usize,
    pub current_attempt: Option<Entity>,
    pub attempt_count: u32,
    pub failure: Option<FailureReason>,
    pub failure_cause: Option<String>,
}

impl Booking {
    pub fn new(request: BookingRequest, requested_at: u64, initial_radius_km: f64) -> Self {
        Self {
            request,
            state: BookingState::Searching,
            requested_at,
            resolved_at: None,
            search_radius_km: initial_radius_km,
            radius_widened: false,
            ranked: Vec::new(),
            next_candidate: 0,
            current_attempt: None,
            attempt_count: 0,
            failure: None,
            failure_cause: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The ranked entry the current (or most recent) attempt proposed to.
    pub fn current_ranked(&self) -> Option<&RankedCandidate> {
        self.next_candidate
            .checked_sub(1)
            .and_then(|index| self.ranked.get(index))
    }

    /// Ranked candidates other than the current winner.
    pub fn alternatives(&self) -> Vec<RankedCandidate> {
        let winner = self.current_ranked().map(|entry| entry.driver_id.clone());
        self.ranked
            .iter()
            .filter(|entry| Some(&entry.driver_id) != winner.as_ref())
            .cloned()
            .collect()
    }

    /// The candidates that were actually proposed to, in proposal order.
    pub fn attempted(&self) -> &[RankedCandidate] {
        &self.ranked[..self.next_candidate.min(self.ranked.len())]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Proposed,
    Accepted,
    Rejected(RejectReason),
    Expired,
}

impl AttemptOutcome {
    pub fn is_terminal(self) -> bool {
        self != AttemptOutcome::Proposed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    DriverDeclined,
    BookingCancelled,
    /// The notification sink failed; the driver never saw the proposal.
    DispatchFailed,
}

/// One proposal of a booking to one driver. Terminal outcomes are immutable;
/// advancing to the next candidate spawns a fresh attempt entity.
#[derive(Debug, Clone, Component)]
pub struct AssignmentAttempt {
    pub booking: Entity,
    pub booking_id: BookingId,
    pub driver_id: DriverId,
    pub proposed_at: u64,
    pub expires_at: u64,
    pub responded_at: Option<u64>,
    pub outcome: AttemptOutcome,
}

// State markers, one per booking entity.
#[derive(Debug, Clone, Copy, Component)]
pub struct Searching;
#[derive(Debug, Clone, Copy, Component)]
pub struct Proposing;
#[derive(Debug, Clone, Copy, Component)]
pub struct Assigned;
#[derive(Debug, Clone, Copy, Component)]
pub struct AssignedElsewhere;
#[derive(Debug, Clone, Copy, Component)]
pub struct Exhausted;
#[derive(Debug, Clone, Copy, Component)]
pub struct Cancelled;

type StateMarkers = (
    Searching,
    Proposing,
    Assigned,
    AssignedElsewhere,
    Exhausted,
    Cancelled,
);

/// Exclusive state-marker transitions for booking entities.
pub trait BookingStateCommands {
    fn set_booking_state_searching(&mut self) -> &mut Self;
    fn set_booking_state_proposing(&mut self) -> &mut Self;
    fn set_booking_state_assigned(&mut self) -> &mut Self;
    fn set_booking_state_assigned_elsewhere(&mut self) -> &mut Self;
    fn set_booking_state_exhausted(&mut self) -> &mut Self;
    fn set_booking_state_cancelled(&mut self) -> &mut Self;
}

impl BookingStateCommands for EntityCommands<'_> {
    fn set_booking_state_searching(&mut self) -> &mut Self {
        self.remove::<StateMarkers>().insert(Searching)
    }

    fn set_booking_state_proposing(&mut self) -> &mut Self {
        self.remove::<StateMarkers>().insert(Proposing)
    }

    fn set_booking_state_assigned(&mut self) -> &mut Self {
        self.remove::<StateMarkers>().insert(Assigned)
    }

    fn set_booking_state_assigned_elsewhere(&mut self) -> &mut Self {
        self.remove::<StateMarkers>().insert(AssignedElsewhere)
    }

    fn set_booking_state_exhausted(&mut self) -> &mut Self {
        self.remove::<StateMarkers>().insert(Exhausted)
    }

    fn set_booking_state_cancelled(&mut self) -> &mut Self {
        self.remove::<StateMarkers>().insert(Cancelled)
    }
}

/// Booking id to entity lookup for the caller-facing surface.
#[derive(Debug, Default, Resource)]
pub struct BookingIndex(pub HashMap<BookingId, Entity>);

/// Drivers this coordinator currently has a proposal out to, or has assigned
/// to an active delivery. Excluded from candidate searches.
#[derive(Debug, Default, Resource)]
pub struct EngagedDrivers(pub HashSet<DriverId>);
