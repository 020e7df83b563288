//! Parameter grids for dispatch sweeps.
//!
//! A [ParameterSpace] lists the variations to explore on top of a base
//! scenario; empty lists fall back to the base value. The grid is the cross
//! product of all variations, one [ParameterSet] per combination.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::scenario::ScenarioParams;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterSpace {
    #[serde(default)]
    pub base: Option<ScenarioParams>,
    #[serde(default)]
    pub num_drivers: Vec<usize>,
    #[serde(default)]
    pub num_bookings: Vec<usize>,
    #[serde(default)]
    pub accept_probabilities: Vec<f64>,
    #[serde(default)]
    pub initial_radii_km: Vec<f64>,
    #[serde(default)]
    pub seeds: Vec<u64>,
}

/// One fully resolved combination, tagged with its position in the grid.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterSet {
    pub run_id: usize,
    pub params: ScenarioParams,
}

impl ParameterSpace {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }

    /// Expand the space into the full grid of parameter sets.
    pub fn generate(&self) -> Vec<ParameterSet> {
        let base = self.base.clone().unwrap_or_default();
        let num_drivers = or_base(&self.num_drivers, base.num_drivers);
        let num_bookings = or_base(&self.num_bookings, base.num_bookings);
        let accept_probabilities =
            or_base(&self.accept_probabilities, base.script.accept_probability);
        let initial_radii_km = or_base(&self.initial_radii_km, base.policy.initial_radius_km);
        let seeds = or_base(&self.seeds, base.seed);

        let mut sets = Vec::new();
        for &drivers in &num_drivers {
            for &bookings in &num_bookings {
                for &accept in &accept_probabilities {
                    for &radius in &initial_radii_km {
                        for &seed in &seeds {
                            let mut params = base.clone().with_seed(seed);
                            params.num_drivers = drivers;
                            params.num_bookings = bookings;
                            params.script.accept_probability = accept;
                            params.policy.initial_radius_km =
                                radius.min(params.policy.max_radius_km);
                            sets.push(ParameterSet {
                                run_id: sets.len(),
                                params,
                            });
                        }
                    }
                }
            }
        }
        sets
    }
}

fn or_base<T: Copy>(variations: &[T], base: T) -> Vec<T> {
    if variations.is_empty() {
        vec![base]
    } else {
        variations.to_vec()
    }
}
