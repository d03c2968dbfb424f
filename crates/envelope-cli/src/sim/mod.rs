//! Demonstration aircraft models.

pub mod aircraft;
pub mod atmosphere;
pub mod scenarios;

pub use aircraft::{AnalyticAircraft, AnalyticEvaluator};
pub use scenarios::{Preset, Scenario};
