//! Scenario execution, single runs and parallel sweeps using rayon.
//!
//! A run wires a generated fleet and scripted drivers into a
//! [MatchCoordinator] and pumps the loop one event at a time: after every
//! step the scripted replies queued by the sink are scheduled back into the
//! clock, so a reply always lands at its intended timestamp relative to the
//! proposal it answers.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use dispatch_core::runner::MatchCoordinator;
use dispatch_core::telemetry::MatchRecord;
use dispatch_core::test_helpers::InMemoryAssignmentStore;

use crate::metrics::{extract_metrics, ScenarioMetrics};
use crate::parameters::ParameterSet;
use crate::scenario::{build_bookings, build_provider, ScenarioParams};
use crate::scripted::ScriptedDriverPool;

/// Backstop against runaway scenarios.
const MAX_EVENTS: usize = 5_000_000;

#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub metrics: ScenarioMetrics,
    pub records: Vec<MatchRecord>,
}

/// Run one scenario to completion and extract its KPIs.
pub fn run_scenario(params: &ScenarioParams) -> ScenarioOutcome {
    let provider = build_provider(params);
    let (pool, feed) = ScriptedDriverPool::new(params.script, params.policy.proposal_timeout_secs);
    let (store, _) = InMemoryAssignmentStore::new();
    let mut coordinator = MatchCoordinator::new(
        params.policy,
        Box::new(provider),
        Box::new(pool),
        Box::new(store),
    );

    let mut bookings = build_bookings(params).into_iter().peekable();
    let mut events = 0;
    while events < MAX_EVENTS {
        while bookings
            .peek()
            .is_some_and(|(at_ms, _)| *at_ms <= coordinator.now())
        {
            let (_, request) = bookings.next().expect("peeked booking");
            // Duplicate ids cannot occur in a generated stream.
            let _ = coordinator.submit(request);
        }
        for (at_ms, response) in feed.drain() {
            coordinator.schedule_response_at(at_ms, response);
        }
        // Never step past the next booking arrival: the clock may only reach
        // it with the booking submitted.
        match bookings.peek() {
            Some(&(at_ms, _)) => {
                if coordinator.step_before(at_ms) {
                    events += 1;
                } else {
                    coordinator.advance_to(at_ms);
                }
            }
            None => {
                if coordinator.step() {
                    events += 1;
                } else {
                    break;
                }
            }
        }
    }

    let telemetry = coordinator.telemetry();
    ScenarioOutcome {
        metrics: extract_metrics(telemetry),
        records: telemetry.resolved.clone(),
    }
}

#[derive(Debug, Clone)]
pub struct SweepRow {
    pub set: ParameterSet,
    pub metrics: ScenarioMetrics,
}

/// Run every parameter set in parallel, with a progress bar.
pub fn run_sweep(sets: Vec<ParameterSet>) -> Vec<SweepRow> {
    let bar = ProgressBar::new(sets.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} scenarios ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let mut rows: Vec<SweepRow> = sets
        .into_par_iter()
        .map(|set| {
            let outcome = run_scenario(&set.params);
            bar.inc(1);
            SweepRow {
                set,
                metrics: outcome.metrics,
            }
        })
        .collect();
    bar.finish();
    rows.sort_by_key(|row| row.set.run_id);
    rows
}
