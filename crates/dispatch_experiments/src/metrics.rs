//! KPI extraction from the coordinator's telemetry.

use serde::Serialize;

use dispatch_core::clock::ONE_SEC_MS;
use dispatch_core::telemetry::DispatchTelemetry;

/// Aggregated results of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioMetrics {
    pub bookings_submitted: u64,
    pub bookings_assigned: u64,
    pub bookings_exhausted: u64,
    pub bookings_cancelled: u64,
    pub races_lost: u64,
    pub proposals_sent: u64,
    pub attempts_rejected: u64,
    pub attempts_expired: u64,
    pub radius_widenings: u64,
    /// Assigned bookings over submitted bookings.
    pub assignment_rate: f64,
    /// Proposals per assigned booking.
    pub mean_proposals_per_assignment: f64,
    /// Submission-to-assignment time, averaged over assigned bookings.
    pub mean_time_to_assign_secs: f64,
}

pub fn extract_metrics(telemetry: &DispatchTelemetry) -> ScenarioMetrics {
    let assigned: Vec<_> = telemetry
        .resolved
        .iter()
        .filter(|record| record.was_assigned())
        .collect();
    let assignment_rate = if telemetry.bookings_submitted == 0 {
        0.0
    } else {
        assigned.len() as f64 / telemetry.bookings_submitted as f64
    };
    let mean_proposals_per_assignment = if assigned.is_empty() {
        0.0
    } else {
        assigned.iter().map(|record| record.proposals as f64).sum::<f64>() / assigned.len() as f64
    };
    let mean_time_to_assign_secs = if assigned.is_empty() {
        0.0
    } else {
        assigned
            .iter()
            .map(|record| record.time_to_resolve_ms() as f64 / ONE_SEC_MS as f64)
            .sum::<f64>()
            / assigned.len() as f64
    };
    ScenarioMetrics {
        bookings_submitted: telemetry.bookings_submitted,
        bookings_assigned: telemetry.bookings_assigned,
        bookings_exhausted: telemetry.bookings_exhausted,
        bookings_cancelled: telemetry.bookings_cancelled,
        races_lost: telemetry.races_lost,
        proposals_sent: telemetry.proposals_sent,
        attempts_rejected: telemetry.attempts_rejected,
        attempts_expired: telemetry.attempts_expired,
        radius_widenings: telemetry.radius_widenings,
        assignment_rate,
        mean_proposals_per_assignment,
        mean_time_to_assign_secs,
    }
}
