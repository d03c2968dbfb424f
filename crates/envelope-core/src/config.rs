//! Numeric tunables for sampling and ascent solving.

use serde::{Deserialize, Serialize};

use crate::ascent::AscentOptions;
use crate::cache::Quantization;
use crate::cost_field::SolverLimits;
use crate::models::{AxisBounds, FlightCondition, Resolution};
use crate::path_tracer::TracerSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    pub speed: AxisBounds,
    pub altitude: AxisBounds,
    /// Progressive refinement schedule, coarsest first
    pub resolutions: Vec<Resolution>,
    pub quantization: Quantization,
    pub solver: SolverLimits,
    pub tracer: TracerSettings,
    pub target: Option<FlightCondition>,
    pub start: Option<FlightCondition>,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            speed: AxisBounds::new(50.0, 350.0),
            altitude: AxisBounds::new(0.0, 15_000.0),
            resolutions: vec![
                Resolution::new(16, 16),
                Resolution::new(48, 48),
                Resolution::new(128, 128),
            ],
            quantization: Quantization::default(),
            solver: SolverLimits::default(),
            tracer: TracerSettings::default(),
            target: None,
            start: None,
        }
    }
}

impl EnvelopeConfig {
    pub fn ascent_options(&self) -> AscentOptions {
        AscentOptions {
            target: self.target,
            start: self.start,
            solver: self.solver,
            tracer: self.tracer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let config: EnvelopeConfig = serde_json::from_str(
            r#"{"speed": {"lower": 80.0, "upper": 260.0}, "target": {"speed_mps": 240.0, "altitude_m": 9000.0}}"#,
        )
        .unwrap();
        assert_eq!(config.speed, AxisBounds::new(80.0, 260.0));
        assert_eq!(config.altitude, EnvelopeConfig::default().altitude);
        assert_eq!(config.resolutions.len(), 3);
        assert_eq!(
            config.ascent_options().target,
            Some(FlightCondition::new(240.0, 9_000.0))
        );
    }
}
