//! Pre-defined aircraft and the envelope bounds that suit them.

use clap::ValueEnum;
use serde::Serialize;

use envelope_core::{AxisBounds, EnvelopeConfig};

use super::aircraft::AnalyticAircraft;

/// A named aircraft with the speed/altitude window worth sampling for it.
#[derive(Debug, Clone, Serialize)]
pub struct Scenario {
    pub name: String,
    pub aircraft: AnalyticAircraft,
    pub speed: AxisBounds,
    pub altitude: AxisBounds,
}

impl Scenario {
    /// Apply the scenario bounds to a configuration.
    pub fn configure(&self, config: &mut EnvelopeConfig) {
        config.speed = self.speed;
        config.altitude = self.altitude;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// Light piston trainer
    Trainer,
    /// Narrow-body twin jet
    Airliner,
    /// Single-seat jet fighter
    Fighter,
}

impl Preset {
    pub fn scenario(self) -> Scenario {
        match self {
            Preset::Trainer => create_trainer_scenario(),
            Preset::Airliner => create_airliner_scenario(),
            Preset::Fighter => create_fighter_scenario(),
        }
    }
}

pub fn create_trainer_scenario() -> Scenario {
    Scenario {
        name: "trainer".to_string(),
        aircraft: AnalyticAircraft {
            mass_kg: 2_500.0,
            wing_area_m2: 16.0,
            aspect_ratio: 7.0,
            oswald_efficiency: 0.8,
            cd0: 0.025,
            cl_max: 1.5,
            lift_slope: 5.0,
            sea_level_thrust_n: 10_000.0,
            thrust_lapse: 0.7,
            tsfc_kg_per_ns: 3.0e-5,
            critical_mach: 0.6,
        },
        speed: AxisBounds::new(35.0, 160.0),
        altitude: AxisBounds::new(0.0, 9_000.0),
    }
}

pub fn create_airliner_scenario() -> Scenario {
    Scenario {
        name: "airliner".to_string(),
        aircraft: AnalyticAircraft {
            mass_kg: 65_000.0,
            wing_area_m2: 122.0,
            aspect_ratio: 9.5,
            oswald_efficiency: 0.8,
            cd0: 0.02,
            cl_max: 1.6,
            lift_slope: 5.5,
            sea_level_thrust_n: 240_000.0,
            thrust_lapse: 0.75,
            tsfc_kg_per_ns: 1.6e-5,
            critical_mach: 0.78,
        },
        speed: AxisBounds::new(70.0, 270.0),
        altitude: AxisBounds::new(0.0, 13_000.0),
    }
}

pub fn create_fighter_scenario() -> Scenario {
    Scenario {
        name: "fighter".to_string(),
        aircraft: AnalyticAircraft {
            mass_kg: 12_000.0,
            wing_area_m2: 30.0,
            aspect_ratio: 3.5,
            oswald_efficiency: 0.8,
            cd0: 0.02,
            cl_max: 1.4,
            lift_slope: 3.5,
            sea_level_thrust_n: 120_000.0,
            thrust_lapse: 0.8,
            tsfc_kg_per_ns: 2.5e-5,
            critical_mach: 0.85,
        },
        speed: AxisBounds::new(60.0, 420.0),
        altitude: AxisBounds::new(0.0, 16_000.0),
    }
}
