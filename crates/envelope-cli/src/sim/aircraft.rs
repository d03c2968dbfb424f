//! Analytic demonstration aircraft.
//!
//! Point-mass model over the ISA atmosphere: parabolic drag polar with a
//! quartic wave-drag rise above the critical Mach number, lift capped at
//! `cl_max`, and full-throttle thrust lapsing with density ratio. When the
//! wing cannot carry the weight at maximum lift, the shortfall is added to
//! the thrust required so the envelope degrades smoothly past the stall.

use serde::{Deserialize, Serialize};

use envelope_core::{AeroEvaluator, AeroModel, AeroState, EvaluationError, G0};

use super::atmosphere::{isa, Atmosphere};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyticAircraft {
    pub mass_kg: f64,
    pub wing_area_m2: f64,
    pub aspect_ratio: f64,
    pub oswald_efficiency: f64,
    /// Zero-lift drag coefficient
    pub cd0: f64,
    pub cl_max: f64,
    /// dCL/dalpha (per radian)
    pub lift_slope: f64,
    pub sea_level_thrust_n: f64,
    /// Exponent of the density ratio in the thrust lapse
    pub thrust_lapse: f64,
    /// Thrust specific fuel consumption (kg/(N·s))
    pub tsfc_kg_per_ns: f64,
    pub critical_mach: f64,
}

impl AnalyticAircraft {
    /// Induced drag factor `k` of `CD = CD0 + k CL^2`.
    pub fn induced_drag_factor(&self) -> f64 {
        1.0 / (std::f64::consts::PI * self.oswald_efficiency * self.aspect_ratio)
    }

    pub fn wave_drag(&self, mach: f64) -> f64 {
        let excess = mach - self.critical_mach;
        if excess > 0.0 {
            20.0 * excess.powi(4)
        } else {
            0.0
        }
    }

    /// Level-flight state at a known atmosphere.
    pub fn state(&self, atmosphere: &Atmosphere, speed_mps: f64) -> AeroState {
        let weight = self.mass_kg * G0;
        let q = 0.5 * atmosphere.density * speed_mps * speed_mps;
        let qs = q * self.wing_area_m2;
        let mach = speed_mps / atmosphere.sound_speed;

        let cl_required = weight / qs;
        let cl = cl_required.min(self.cl_max);
        let cd = self.cd0 + self.induced_drag_factor() * cl * cl + self.wave_drag(mach);
        let lift = qs * cl;
        let drag = qs * cd;
        let thrust_available = self.sea_level_thrust_n * atmosphere.sigma().powf(self.thrust_lapse);

        AeroState {
            mach,
            dynamic_pressure_pa: q,
            aoa_level_rad: cl_required / self.lift_slope,
            aoa_max_lift_rad: self.cl_max / self.lift_slope,
            lift_n: lift,
            drag_n: drag,
            thrust_available_n: thrust_available,
            thrust_required_n: drag + (weight - lift).max(0.0),
            pitch_trim: (cl_required / self.cl_max).min(1.0),
            fuel_burn_kg_s: thrust_available * self.tsfc_kg_per_ns,
            lift_slope: self.lift_slope,
        }
    }
}

impl AeroModel for AnalyticAircraft {
    type Evaluator = AnalyticEvaluator;

    fn mass_kg(&self) -> f64 {
        self.mass_kg
    }

    fn reference_area_m2(&self) -> f64 {
        self.wing_area_m2
    }

    fn clone_for_thread(&self) -> AnalyticEvaluator {
        AnalyticEvaluator {
            aircraft: *self,
            atmosphere: None,
        }
    }
}

/// Per-worker evaluator. Remembers the atmosphere of the last altitude,
/// since a column of cells shares it.
pub struct AnalyticEvaluator {
    aircraft: AnalyticAircraft,
    atmosphere: Option<(f64, Atmosphere)>,
}

impl AnalyticEvaluator {
    fn atmosphere(&mut self, altitude_m: f64, speed_mps: f64) -> Result<Atmosphere, EvaluationError> {
        if let Some((cached_altitude, atmosphere)) = self.atmosphere {
            if cached_altitude == altitude_m {
                return Ok(atmosphere);
            }
        }
        let atmosphere = isa(altitude_m).ok_or_else(|| {
            EvaluationError::new(speed_mps, altitude_m, "altitude outside the standard atmosphere")
        })?;
        self.atmosphere = Some((altitude_m, atmosphere));
        Ok(atmosphere)
    }
}

impl AeroEvaluator for AnalyticEvaluator {
    fn evaluate(&mut self, altitude_m: f64, speed_mps: f64) -> Result<AeroState, EvaluationError> {
        if !speed_mps.is_finite() || speed_mps <= 0.0 {
            return Err(EvaluationError::new(speed_mps, altitude_m, "speed must be positive"));
        }
        let atmosphere = self.atmosphere(altitude_m, speed_mps)?;
        Ok(self.aircraft.state(&atmosphere, speed_mps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::scenarios::Preset;

    fn excess_thrust(state: &AeroState) -> f64 {
        state.thrust_available_n - state.thrust_required_n
    }

    #[test]
    fn level_flight_balances_weight_above_stall() {
        let aircraft = Preset::Trainer.scenario().aircraft;
        let mut evaluator = aircraft.clone_for_thread();
        let state = evaluator.evaluate(1_000.0, 60.0).unwrap();
        assert!((state.lift_n - aircraft.mass_kg * G0).abs() < 1e-6);
        assert!(state.pitch_trim < 1.0);
        assert!(excess_thrust(&state) > 0.0);
    }

    #[test]
    fn stall_adds_weight_shortfall_to_thrust_required() {
        let aircraft = Preset::Trainer.scenario().aircraft;
        let mut evaluator = aircraft.clone_for_thread();
        let slow = evaluator.evaluate(0.0, 15.0).unwrap();
        assert_eq!(slow.pitch_trim, 1.0);
        assert!(slow.thrust_required_n > slow.drag_n);
        assert!(excess_thrust(&slow) < 0.0);
    }

    #[test]
    fn thrust_lapses_with_altitude() {
        let aircraft = Preset::Airliner.scenario().aircraft;
        let mut evaluator = aircraft.clone_for_thread();
        let low = evaluator.evaluate(0.0, 200.0).unwrap();
        let high = evaluator.evaluate(11_000.0, 200.0).unwrap();
        assert!((low.thrust_available_n - aircraft.sea_level_thrust_n).abs() < 1.0);
        assert!(high.thrust_available_n < 0.5 * low.thrust_available_n);
        assert!(high.fuel_burn_kg_s < low.fuel_burn_kg_s);
    }

    #[test]
    fn wave_drag_starts_at_critical_mach() {
        let aircraft = Preset::Fighter.scenario().aircraft;
        assert_eq!(aircraft.wave_drag(aircraft.critical_mach - 0.1), 0.0);
        assert!(aircraft.wave_drag(aircraft.critical_mach + 0.2) > 0.0);
    }

    #[test]
    fn invalid_conditions_fail_evaluation() {
        let mut evaluator = Preset::Fighter.scenario().aircraft.clone_for_thread();
        assert!(evaluator.evaluate(1_000.0, 0.0).is_err());
        let error = evaluator.evaluate(50_000.0, 200.0).unwrap_err();
        assert_eq!(error.altitude_m, 50_000.0);
    }

    #[test]
    fn repeated_altitude_matches_fresh_evaluator() {
        let aircraft = Preset::Fighter.scenario().aircraft;
        let mut warm = aircraft.clone_for_thread();
        warm.evaluate(4_000.0, 150.0).unwrap();
        let reused = warm.evaluate(4_000.0, 220.0).unwrap();
        let fresh = aircraft.clone_for_thread().evaluate(4_000.0, 220.0).unwrap();
        assert_eq!(reused, fresh);
    }
}
