//! Driver performance scoring from historical stats.

use crate::types::DriverCandidate;

pub const COMPLETION_WEIGHT: f64 = 0.40;
pub const RESPONSIVENESS_WEIGHT: f64 = 0.30;
pub const RELIABILITY_WEIGHT: f64 = 0.30;

/// Completion-rate term for a driver with no track record: neither penalized
/// nor boosted.
pub const NEUTRAL_COMPLETION_RATE: f64 = 0.5;

/// Responses at or under this many seconds score full marks.
pub const FAST_RESPONSE_SECS: f64 = 30.0;

/// Composite performance score in [0, 100].
///
/// Weighted sum of completion rate, responsiveness (capped reciprocal of the
/// average response time) and reliability (inverse cancellation rate).
pub fn performance_score(candidate: &DriverCandidate) -> f64 {
    let score = 100.0
        * (COMPLETION_WEIGHT * completion_rate(candidate)
            + RESPONSIVENESS_WEIGHT * responsiveness(candidate.avg_response_time_secs)
            + RELIABILITY_WEIGHT * reliability(candidate.cancellation_rate));
    score.clamp(0.0, 100.0)
}

fn completion_rate(candidate: &DriverCandidate) -> f64 {
    if candidate.total_trips == 0 {
        return NEUTRAL_COMPLETION_RATE;
    }
    (candidate.completed_trips as f64 / candidate.total_trips as f64).clamp(0.0, 1.0)
}

/// 1.0 at or under [FAST_RESPONSE_SECS], decaying as 30/t beyond it.
fn responsiveness(avg_response_time_secs: f64) -> f64 {
    FAST_RESPONSE_SECS / avg_response_time_secs.max(FAST_RESPONSE_SECS)
}

fn reliability(cancellation_rate: f64) -> f64 {
    (1.0 - cancellation_rate).clamp(0.0, 1.0)
}
