//! Result export: per-booking match records and sweep summaries to CSV, and
//! sweep summaries to JSON for downstream analysis.

use std::path::Path;

use serde::Serialize;

use dispatch_core::telemetry::MatchRecord;

use crate::runner::SweepRow;

/// One flattened CSV row of a sweep: the varied parameters next to the KPIs.
#[derive(Debug, Clone, Serialize)]
struct SweepCsvRow {
    run_id: usize,
    seed: u64,
    num_drivers: usize,
    num_bookings: usize,
    accept_probability: f64,
    initial_radius_km: f64,
    proposal_timeout_secs: u64,
    bookings_assigned: u64,
    bookings_exhausted: u64,
    proposals_sent: u64,
    attempts_expired: u64,
    radius_widenings: u64,
    assignment_rate: f64,
    mean_proposals_per_assignment: f64,
    mean_time_to_assign_secs: f64,
}

impl From<&SweepRow> for SweepCsvRow {
    fn from(row: &SweepRow) -> Self {
        Self {
            run_id: row.set.run_id,
            seed: row.set.params.seed,
            num_drivers: row.set.params.num_drivers,
            num_bookings: row.set.params.num_bookings,
            accept_probability: row.set.params.script.accept_probability,
            initial_radius_km: row.set.params.policy.initial_radius_km,
            proposal_timeout_secs: row.set.params.policy.proposal_timeout_secs,
            bookings_assigned: row.metrics.bookings_assigned,
            bookings_exhausted: row.metrics.bookings_exhausted,
            proposals_sent: row.metrics.proposals_sent,
            attempts_expired: row.metrics.attempts_expired,
            radius_widenings: row.metrics.radius_widenings,
            assignment_rate: row.metrics.assignment_rate,
            mean_proposals_per_assignment: row.metrics.mean_proposals_per_assignment,
            mean_time_to_assign_secs: row.metrics.mean_time_to_assign_secs,
        }
    }
}

/// Export one scenario's per-booking match records to CSV.
pub fn export_records_csv(
    records: &[MatchRecord],
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Export sweep results to CSV, one row per parameter set.
pub fn export_sweep_csv(
    rows: &[SweepRow],
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(SweepCsvRow::from(row))?;
    }
    writer.flush()?;
    Ok(())
}

/// Export sweep results to JSON (parameters and KPIs per run).
pub fn export_sweep_json(
    rows: &[SweepRow],
    path: impl AsRef<Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    #[derive(Serialize)]
    struct JsonRow<'a> {
        set: &'a crate::parameters::ParameterSet,
        metrics: &'a crate::metrics::ScenarioMetrics,
    }
    let file = std::fs::File::create(path)?;
    let rows: Vec<_> = rows
        .iter()
        .map(|row| JsonRow {
            set: &row.set,
            metrics: &row.metrics,
        })
        .collect();
    serde_json::to_writer_pretty(file, &rows)?;
    Ok(())
}
