//! Pulse headless harness
//!
//! Drives the demo engine against a manually stepped wall clock so a whole
//! scenario plays in microseconds and replays identically for a seed.
//!
//! # Usage
//!
//! ```ignore
//! use pulse_sim::ScenarioRunner;
//! use pulse_core::ScenarioId;
//!
//! let result = ScenarioRunner::new(42)
//!     .with_acceleration(10.0)
//!     .run(ScenarioId::NewPatientOnboarding);
//! assert!(result.passed);
//! ```

mod exporter;
mod runner;

pub use exporter::{ExportedEvent, RunExport, SimError};
pub use runner::{ScenarioResult, ScenarioRunner};
