//! Dispatch clock: a min-heap of timed events in simulated milliseconds.
//!
//! Every state transition in the kernel is driven by popping the next event
//! and running the system schedule against it. Proposal timeouts are
//! pre-scheduled [EventKind::ProposalExpired] events, so a timeout fires even
//! if the driver response channel never delivers.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bevy_ecs::prelude::{Entity, Resource};

use crate::types::DriverResponse;

pub const ONE_SEC_MS: u64 = 1_000;

/// Declared in drain order: same-instant events pop smallest kind first, so a
/// cancel lands before a response and a response before the expiry it races.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventKind {
    BookingInbound,
    BookingCancel,
    CandidateSearch,
    ProposalDispatch,
    DriverResponse,
    ProposalExpired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSubject {
    Booking(Entity),
    Attempt(Entity),
    /// Booking entity plus the driver reply being delivered.
    Response(Entity, DriverResponse),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub timestamp: u64,
    pub kind: EventKind,
    pub subject: Option<EventSubject>,
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering to make BinaryHeap a min-heap by timestamp, then
        // by kind; subjects do not participate in ordering.
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.kind.cmp(&self.kind))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The event currently being processed, installed by the runner before each
/// schedule pass.
#[derive(Debug, Clone, Resource)]
pub struct CurrentEvent(pub Event);

#[derive(Debug, Default, Resource)]
pub struct DispatchClock {
    now: u64,
    events: BinaryHeap<Event>,
}

impl DispatchClock {
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn schedule(&mut self, event: Event) {
        debug_assert!(
            event.timestamp >= self.now,
            "event timestamp must be >= current time"
        );
        self.events.push(event);
    }

    pub fn schedule_at(&mut self, timestamp: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule(Event {
            timestamp: timestamp.max(self.now),
            kind,
            subject,
        });
    }

    pub fn schedule_in_secs(&mut self, secs: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_at(self.now + secs * ONE_SEC_MS, kind, subject);
    }

    pub fn pop_next(&mut self) -> Option<Event> {
        let event = self.events.pop()?;
        self.now = event.timestamp;
        Some(event)
    }

    /// Pop the next event only if it is due at or before `deadline_ms`.
    pub fn pop_next_before(&mut self, deadline_ms: u64) -> Option<Event> {
        if self.next_timestamp()? > deadline_ms {
            return None;
        }
        self.pop_next()
    }

    pub fn next_timestamp(&self) -> Option<u64> {
        self.events.peek().map(|event| event.timestamp)
    }

    /// Advance the clock without processing anything (no pending event may be
    /// earlier than the target).
    pub fn fast_forward(&mut self, now_ms: u64) {
        debug_assert!(self.next_timestamp().map_or(true, |next| next >= now_ms));
        self.now = self.now.max(now_ms);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
