//! In-memory candidate provider over an H3 spatial index.
//!
//! Drivers are bucketed by H3 cell at resolution 8 (~460 m edge). A radius
//! query walks the grid disk around the pickup cell, prefilters buckets by
//! cached cell-to-cell distance and refines with the exact haversine distance
//! to each driver's reported position.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, OnceLock};

use h3o::{CellIndex, LatLng, Resolution};
use lru::LruCache;

use dispatch_core::error::ProviderError;
use dispatch_core::geo::{haversine_distance_km, Coordinate, VehicleType};
use dispatch_core::providers::CandidateProvider;
use dispatch_core::types::DriverCandidate;

const INDEX_RESOLUTION: Resolution = Resolution::Eight;

/// Average hex edge length at resolution 8, used to size the grid disk.
const AVG_EDGE_KM: f64 = 0.46;

/// Uncached distance between cell centers.
fn distance_km_between_cells_uncached(a: CellIndex, b: CellIndex) -> f64 {
    let a = LatLng::from(a);
    let b = LatLng::from(b);
    haversine_distance_km(
        Coordinate::new(a.lat(), a.lng()),
        Coordinate::new(b.lat(), b.lng()),
    )
}

/// Global cell-distance cache (50,000 entries).
fn get_distance_cache() -> &'static Mutex<LruCache<(CellIndex, CellIndex), f64>> {
    static CACHE: OnceLock<Mutex<LruCache<(CellIndex, CellIndex), f64>>> = OnceLock::new();
    CACHE.get_or_init(|| {
        Mutex::new(LruCache::new(
            NonZeroUsize::new(50_000).expect("cache size must be non-zero"),
        ))
    })
}

/// Distance between cell centers, cached; the key is order-normalized since
/// the metric is symmetric.
pub fn distance_km_between_cells(a: CellIndex, b: CellIndex) -> f64 {
    let key = if a < b { (a, b) } else { (b, a) };
    let mut cache = match get_distance_cache().lock() {
        Ok(guard) => guard,
        Err(_) => return distance_km_between_cells_uncached(a, b),
    };
    *cache.get_or_insert(key, || distance_km_between_cells_uncached(a, b))
}

/// Candidate provider backed by a cell-bucketed driver registry.
#[derive(Debug, Default)]
pub struct GridCandidateProvider {
    drivers_by_cell: HashMap<CellIndex, Vec<DriverCandidate>>,
    len: usize,
}

impl GridCandidateProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a driver by its reported position. Returns false (and skips the
    /// driver) when the position cannot be indexed.
    pub fn insert(&mut self, candidate: DriverCandidate) -> bool {
        let Ok(latlng) = LatLng::new(candidate.location.latitude, candidate.location.longitude)
        else {
            return false;
        };
        let cell = latlng.to_cell(INDEX_RESOLUTION);
        self.drivers_by_cell.entry(cell).or_default().push(candidate);
        self.len += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl CandidateProvider for GridCandidateProvider {
    fn find_available(
        &self,
        pickup: Coordinate,
        radius_km: f64,
        vehicle_type: Option<VehicleType>,
    ) -> Result<Vec<DriverCandidate>, ProviderError> {
        let origin = LatLng::new(pickup.latitude, pickup.longitude)
            .map_err(|err| ProviderError::Unavailable(format!("pickup not indexable: {err}")))?
            .to_cell(INDEX_RESOLUTION);

        let k = (radius_km / AVG_EDGE_KM).ceil() as u32 + 1;
        let mut found = Vec::new();
        for cell in origin.grid_disk::<Vec<_>>(k) {
            let Some(bucket) = self.drivers_by_cell.get(&cell) else {
                continue;
            };
            // Cell centers can sit up to ~2 edges away from a driver in the
            // same cell; the exact check below settles the boundary cases.
            if distance_km_between_cells(origin, cell) > radius_km + 2.0 * AVG_EDGE_KM {
                continue;
            }
            for candidate in bucket {
                if haversine_distance_km(pickup, candidate.location) > radius_km {
                    continue;
                }
                if vehicle_type.is_some_and(|vt| candidate.vehicle_type != vt) {
                    continue;
                }
                found.push(candidate.clone());
            }
        }
        Ok(found)
    }
}
