//! Envelope CLI - command line front end for progressive envelope refinement.
//!
//! Provides the analytic demonstration aircraft behind the `envelope`
//! binary and the JSON report it prints for each published level.

pub mod report;
pub mod sim;

pub use report::{LevelReport, PathReport};
pub use sim::{AnalyticAircraft, Preset, Scenario};
