//! Test harness utilities for the supervisor suites.

mod dispatcher;
mod process;
mod reporter;
mod services;
mod world;

pub use dispatcher::{DISPATCH_ADDRESS, MockDispatcher};
pub use process::{ImmediateShutdown, RecordingMetricsSink};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use services::RecordingFactory;
pub use world::{TestWorld, module, supervisor_config, world};
