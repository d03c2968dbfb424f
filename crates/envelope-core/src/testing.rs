//! Instrumented aerodynamic models for tests.
//!
//! [`SpyModel`] is a smooth synthetic vehicle (exponential atmosphere,
//! parabolic drag polar, density-lapsed thrust) that counts evaluations and
//! live evaluators, and can inject faults, panics, delays or cancellation.

use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::aero::{AeroEvaluator, AeroModel, AeroState};
use crate::error::EvaluationError;
use crate::models::G0;

const SEA_LEVEL_DENSITY: f64 = 1.225;
const SCALE_HEIGHT_M: f64 = 8_500.0;

#[derive(Debug, Clone, Default)]
enum Fault {
    #[default]
    None,
    FailAbove(f64),
    PanicAbove(f64),
}

#[derive(Debug, Default)]
struct Counters {
    evaluations: AtomicUsize,
    live: AtomicIsize,
    clones: AtomicUsize,
}

#[derive(Debug, Clone)]
pub struct SpyModel {
    pub mass_kg: f64,
    pub reference_area_m2: f64,
    pub sea_level_thrust_n: f64,
    pub tsfc_kg_per_ns: f64,
    fault: Fault,
    delay: Option<Duration>,
    cancel_after: Option<(usize, CancellationToken)>,
    counters: Arc<Counters>,
}

impl Default for SpyModel {
    fn default() -> Self {
        Self {
            mass_kg: 10_000.0,
            reference_area_m2: 30.0,
            sea_level_thrust_n: 60_000.0,
            tsfc_kg_per_ns: 2.0e-5,
            fault: Fault::None,
            delay: None,
            cancel_after: None,
            counters: Arc::new(Counters::default()),
        }
    }
}

impl SpyModel {
    pub fn failing_above(altitude_m: f64) -> Self {
        Self {
            fault: Fault::FailAbove(altitude_m),
            ..Self::default()
        }
    }

    pub fn panicking_above(altitude_m: f64) -> Self {
        Self {
            fault: Fault::PanicAbove(altitude_m),
            ..Self::default()
        }
    }

    /// Cancel `token` once `evaluations` evaluations have run.
    pub fn cancelling_after(evaluations: usize, token: CancellationToken) -> Self {
        Self {
            cancel_after: Some((evaluations, token)),
            ..Self::default()
        }
    }

    pub fn with_mass(mut self, mass_kg: f64) -> Self {
        self.mass_kg = mass_kg;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn evaluations(&self) -> usize {
        self.counters.evaluations.load(Ordering::SeqCst)
    }

    pub fn evaluator_clones(&self) -> usize {
        self.counters.clones.load(Ordering::SeqCst)
    }

    /// Evaluators handed out and not yet released.
    pub fn live_evaluators(&self) -> isize {
        self.counters.live.load(Ordering::SeqCst)
    }

    /// Closed-form state used by the evaluator, exposed for assertions.
    pub fn state_at(&self, altitude_m: f64, speed_mps: f64) -> AeroState {
        let density = SEA_LEVEL_DENSITY * (-altitude_m.max(0.0) / SCALE_HEIGHT_M).exp();
        let q = 0.5 * density * speed_mps * speed_mps;
        let weight = self.mass_kg * G0;
        let cl = if q > 0.0 {
            weight / (q * self.reference_area_m2)
        } else {
            f64::MAX
        };
        let cd = 0.02 + 0.05 * cl * cl;
        let drag = q * self.reference_area_m2 * cd;
        let thrust = self.sea_level_thrust_n * (density / SEA_LEVEL_DENSITY).powf(0.7);
        let lift_slope = 2.0 * std::f64::consts::PI;
        AeroState {
            mach: speed_mps / 340.0,
            dynamic_pressure_pa: q,
            aoa_level_rad: cl / lift_slope,
            aoa_max_lift_rad: 1.4 / lift_slope,
            lift_n: weight,
            drag_n: drag,
            thrust_available_n: thrust,
            thrust_required_n: drag,
            pitch_trim: (cl / 1.4).min(1.0),
            fuel_burn_kg_s: thrust * self.tsfc_kg_per_ns,
            lift_slope,
        }
    }
}

pub struct SpyEvaluator {
    model: SpyModel,
}

impl AeroEvaluator for SpyEvaluator {
    fn evaluate(&mut self, altitude_m: f64, speed_mps: f64) -> Result<AeroState, EvaluationError> {
        let count = self.model.counters.evaluations.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.model.cancel_after {
            if count >= *limit {
                token.cancel();
            }
        }
        if let Some(delay) = self.model.delay {
            std::thread::sleep(delay);
        }
        match self.model.fault {
            Fault::FailAbove(limit) if altitude_m > limit => {
                return Err(EvaluationError::new(speed_mps, altitude_m, "injected fault"));
            }
            Fault::PanicAbove(limit) if altitude_m > limit => {
                panic!("injected panic at {} m", altitude_m);
            }
            _ => {}
        }
        Ok(self.model.state_at(altitude_m, speed_mps))
    }
}

impl AeroModel for SpyModel {
    type Evaluator = SpyEvaluator;

    fn mass_kg(&self) -> f64 {
        self.mass_kg
    }

    fn reference_area_m2(&self) -> f64 {
        self.reference_area_m2
    }

    fn clone_for_thread(&self) -> SpyEvaluator {
        self.counters.clones.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        SpyEvaluator {
            model: self.clone(),
        }
    }

    fn release(&self, _evaluator: SpyEvaluator) {
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}
