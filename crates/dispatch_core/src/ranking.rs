//! Candidate ranking: distance, ETA, rating and performance folded into one
//! deterministic ordering per selection priority.

use std::cmp::Ordering;

use crate::geo::{estimate_eta_minutes, haversine_distance_km, Coordinate};
use crate::scoring::performance_score;
use crate::types::{DriverCandidate, RankedCandidate, SelectionPriority};

pub const DISTANCE_WEIGHT: f64 = 0.30;
pub const ETA_WEIGHT: f64 = 0.20;
pub const RATING_WEIGHT: f64 = 0.25;
pub const PERFORMANCE_WEIGHT: f64 = 0.25;

pub const MAX_RATING: f64 = 5.0;

/// Primary-metric ties within this tolerance fall through to the tie-break
/// chain (rating descending, then driver id ascending).
pub const SCORE_EPSILON: f64 = 1e-9;

/// Rank candidates for a pickup, best first.
///
/// The balanced composite is computed for every candidate regardless of
/// priority; the priority only selects which key drives the ordering. Given
/// the same candidates and priority the output ordering is identical on
/// every call.
pub fn rank(
    candidates: &[DriverCandidate],
    pickup: Coordinate,
    priority: SelectionPriority,
) -> Vec<RankedCandidate> {
    let mut ranked = evaluate(candidates, pickup);
    fill_balanced_composite(&mut ranked);
    ranked.sort_by(|a, b| compare(priority, a, b));
    ranked
}

/// Distance, ETA and performance per candidate. Composite is filled by
/// [fill_balanced_composite] once the whole set is known.
fn evaluate(candidates: &[DriverCandidate], pickup: Coordinate) -> Vec<RankedCandidate> {
    candidates
        .iter()
        .map(|candidate| {
            let distance_km = haversine_distance_km(pickup, candidate.location);
            RankedCandidate {
                driver_id: candidate.driver_id.clone(),
                vehicle_type: candidate.vehicle_type,
                distance_km,
                eta_minutes: estimate_eta_minutes(distance_km, candidate.vehicle_type),
                rating: candidate.rating,
                performance_score: performance_score(candidate),
                composite_score: 0.0,
            }
        })
        .collect()
}

/// Weighted composite over min-max normalized terms. Distance and ETA are
/// normalized inversely (closer/faster scores higher) within the candidate
/// set; rating and performance against their fixed scales.
fn fill_balanced_composite(ranked: &mut [RankedCandidate]) {
    let distance_span = span(ranked.iter().map(|r| r.distance_km));
    let eta_span = span(ranked.iter().map(|r| r.eta_minutes));
    for entry in ranked.iter_mut() {
        let distance_term = inverse_norm(entry.distance_km, distance_span);
        let eta_term = inverse_norm(entry.eta_minutes, eta_span);
        entry.composite_score = DISTANCE_WEIGHT * distance_term
            + ETA_WEIGHT * eta_term
            + RATING_WEIGHT * (entry.rating / MAX_RATING).clamp(0.0, 1.0)
            + PERFORMANCE_WEIGHT * (entry.performance_score / 100.0).clamp(0.0, 1.0);
    }
}

fn span(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for value in values {
        min = min.min(value);
        max = max.max(value);
    }
    (min, max)
}

/// 1.0 at the set minimum, 0.0 at the maximum; 1.0 when the set is flat.
fn inverse_norm(value: f64, (min, max): (f64, f64)) -> f64 {
    if max - min < SCORE_EPSILON {
        return 1.0;
    }
    1.0 - (value - min) / (max - min)
}

/// Higher is better under every priority.
fn primary_desirability(priority: SelectionPriority, entry: &RankedCandidate) -> f64 {
    match priority {
        SelectionPriority::Closest => -entry.distance_km,
        SelectionPriority::Fastest => -entry.eta_minutes,
        SelectionPriority::BestRated => entry.rating,
        SelectionPriority::Balanced => entry.composite_score,
    }
}

fn compare(priority: SelectionPriority, a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    let pa = primary_desirability(priority, a);
    let pb = primary_desirability(priority, b);
    if (pa - pb).abs() > SCORE_EPSILON {
        return pb.partial_cmp(&pa).unwrap_or(Ordering::Equal);
    }
    if priority == SelectionPriority::BestRated
        && (a.performance_score - b.performance_score).abs() > SCORE_EPSILON
    {
        return b
            .performance_score
            .partial_cmp(&a.performance_score)
            .unwrap_or(Ordering::Equal);
    }
    if (a.rating - b.rating).abs() > SCORE_EPSILON {
        return b.rating.partial_cmp(&a.rating).unwrap_or(Ordering::Equal);
    }
    a.driver_id.cmp(&b.driver_id)
}
