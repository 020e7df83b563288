//! Dispatch experiments: synthetic fleets, scripted driver behavior and
//! parameter sweeps over the `dispatch_core` matching kernel.

pub mod export;
pub mod grid_provider;
pub mod metrics;
pub mod parameters;
pub mod runner;
pub mod scenario;
pub mod scripted;
