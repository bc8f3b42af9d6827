//! Synthetic GPS tracks: a bounded random walk that emits one location
//! sample per tick, with speed and heading derived from great-circle geometry.

pub mod chart;
pub mod cli;
pub mod constants;
pub mod error;
pub mod geo;
pub mod logging;
pub mod sample;
pub mod simulator;
pub mod sink;
pub mod tail;

pub use error::TrackError;
pub use geo::{bearing_degrees, distance_meters, BoundaryPolicy, Coordinate};
pub use sample::Sample;
pub use simulator::{SimulatorConfig, SinkFailurePolicy, TrackGenerator};
pub use sink::SampleSink;
