pub mod clock;
pub mod config;
pub mod ecs;
pub mod error;
pub mod geo;
pub mod providers;
pub mod ranking;
pub mod runner;
pub mod scoring;
pub mod systems;
pub mod telemetry;
pub mod types;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
