//! Interface to the external aerodynamic model.
//!
//! The model itself (lift/drag/trim solving) lives outside this crate. A
//! prototype implementing [`AeroModel`] is shared read-only between workers;
//! every worker evaluates through its own private [`AeroEvaluator`] obtained
//! from [`AeroModel::clone_for_thread`], because evaluator instances carry
//! mutable solver state and must never be used from two threads at once.

use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;

/// Raw result of evaluating the model at one flight condition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AeroState {
    pub mach: f64,
    pub dynamic_pressure_pa: f64,
    pub aoa_level_rad: f64,
    pub aoa_max_lift_rad: f64,
    pub lift_n: f64,
    pub drag_n: f64,
    pub thrust_available_n: f64,
    pub thrust_required_n: f64,
    pub pitch_trim: f64,
    pub fuel_burn_kg_s: f64,
    pub lift_slope: f64,
}

/// Vehicle-level prototype of the aerodynamic model.
pub trait AeroModel: Send + Sync {
    type Evaluator: AeroEvaluator;

    fn mass_kg(&self) -> f64;

    fn reference_area_m2(&self) -> f64;

    /// Create a private, stateful evaluator for the calling worker.
    fn clone_for_thread(&self) -> Self::Evaluator;

    /// Return an evaluator created by [`clone_for_thread`](Self::clone_for_thread).
    /// Models without pooled resources simply drop it.
    fn release(&self, evaluator: Self::Evaluator) {
        drop(evaluator);
    }
}

/// Per-worker evaluator. Pure for fixed inputs, but not shareable.
pub trait AeroEvaluator: Send {
    fn evaluate(&mut self, altitude_m: f64, speed_mps: f64) -> Result<AeroState, EvaluationError>;
}
