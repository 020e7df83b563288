//! Scripted driver behavior: a notification sink whose drivers accept,
//! decline or ignore proposals stochastically but reproducibly.
//!
//! Each proposal gets its own RNG seeded from the scenario seed plus a stable
//! hash of (booking, driver), so a decision depends only on the pairing and
//! the seed, never on arrival order.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use dispatch_core::clock::ONE_SEC_MS;
use dispatch_core::error::SinkError;
use dispatch_core::providers::NotificationSink;
use dispatch_core::types::{BookingId, DriverId, DriverResponse, ResponseOutcome};

/// How scripted drivers answer proposals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DriverScript {
    /// Probability of accepting, given the driver answers at all.
    pub accept_probability: f64,
    /// Probability of never answering (the proposal times out).
    pub ignore_probability: f64,
    pub min_response_delay_secs: u64,
    pub max_response_delay_secs: u64,
    /// Seed for RNG (for reproducibility).
    pub seed: u64,
}

impl Default for DriverScript {
    fn default() -> Self {
        Self {
            accept_probability: 0.7,
            ignore_probability: 0.05,
            min_response_delay_secs: 5,
            max_response_delay_secs: 45,
            seed: 0,
        }
    }
}

/// A reply waiting to be fed back into the coordinator at `at_ms`.
pub type PendingResponse = (u64, DriverResponse);

/// Shared view of the replies a [ScriptedDriverPool] has queued. The harness
/// drains this after every coordinator step and schedules each reply at its
/// timestamp.
#[derive(Debug, Clone, Default)]
pub struct ResponseFeed(Arc<Mutex<VecDeque<PendingResponse>>>);

impl ResponseFeed {
    pub fn drain(&self) -> Vec<PendingResponse> {
        self.0
            .lock()
            .map(|mut pending| pending.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().map(|pending| pending.is_empty()).unwrap_or(true)
    }
}

/// Notification sink that plays the drivers' side of the protocol.
#[derive(Debug)]
pub struct ScriptedDriverPool {
    script: DriverScript,
    /// Matches the coordinator's proposal window; used to recover the
    /// proposal time from `expires_at_ms`.
    proposal_timeout_ms: u64,
    feed: ResponseFeed,
}

impl ScriptedDriverPool {
    pub fn new(script: DriverScript, proposal_timeout_secs: u64) -> (Self, ResponseFeed) {
        let feed = ResponseFeed::default();
        (
            Self {
                script,
                proposal_timeout_ms: proposal_timeout_secs * ONE_SEC_MS,
                feed: feed.clone(),
            },
            feed,
        )
    }

    fn decision_rng(&self, booking_id: &BookingId, driver_id: &DriverId) -> StdRng {
        let mut hasher = DefaultHasher::new();
        booking_id.hash(&mut hasher);
        driver_id.hash(&mut hasher);
        StdRng::seed_from_u64(self.script.seed.wrapping_add(hasher.finish()))
    }
}

impl NotificationSink for ScriptedDriverPool {
    fn propose_assignment(
        &mut self,
        booking_id: &BookingId,
        driver_id: &DriverId,
        expires_at_ms: u64,
    ) -> Result<(), SinkError> {
        let mut rng = self.decision_rng(booking_id, driver_id);
        if rng.gen::<f64>() < self.script.ignore_probability {
            return Ok(());
        }
        let outcome = if rng.gen::<f64>() < self.script.accept_probability {
            ResponseOutcome::Accepted
        } else {
            ResponseOutcome::Rejected
        };
        let delay_secs = rng
            .gen_range(self.script.min_response_delay_secs..=self.script.max_response_delay_secs);
        let proposed_at = expires_at_ms.saturating_sub(self.proposal_timeout_ms);
        let respond_at = proposed_at + delay_secs * ONE_SEC_MS;
        if let Ok(mut pending) = self.feed.0.lock() {
            pending.push_back((
                respond_at,
                DriverResponse {
                    booking_id: booking_id.clone(),
                    driver_id: driver_id.clone(),
                    outcome,
                },
            ));
        }
        Ok(())
    }
}
