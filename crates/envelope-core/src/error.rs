//! Error types shared by the sampling, solving and tracing stages.

use thiserror::Error;

use crate::models::{Cell, Resolution};

/// A single evaluation of the aerodynamic model failed.
#[derive(Debug, Clone, Error)]
#[error("model evaluation failed at {speed_mps:.1} m/s, {altitude_m:.0} m: {message}")]
pub struct EvaluationError {
    pub speed_mps: f64,
    pub altitude_m: f64,
    pub message: String,
}

impl EvaluationError {
    pub fn new(speed_mps: f64, altitude_m: f64, message: impl Into<String>) -> Self {
        Self {
            speed_mps,
            altitude_m,
            message: message.into(),
        }
    }
}

/// Fault recorded for one grid cell during a sampling pass.
#[derive(Debug, Clone)]
pub struct CellFault {
    pub cell: Cell,
    pub error: EvaluationError,
}

#[derive(Debug, Clone, Error)]
pub enum SampleError {
    #[error("sampling cancelled")]
    Cancelled,
    #[error("{count} cell evaluation(s) failed, first: {}", first_fault(.faults))]
    Faults { count: usize, faults: Vec<CellFault> },
    #[error("invalid resolution {0:?}: both axes need at least one segment")]
    InvalidResolution(Resolution),
    #[error("invalid bounds: {0}")]
    InvalidBounds(String),
}

fn first_fault(faults: &[CellFault]) -> String {
    faults
        .first()
        .map(|fault| fault.error.to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Error)]
pub enum SolverError {
    #[error("cost field solve cancelled")]
    Cancelled,
    #[error("sink {0:?} lies outside the grid")]
    SinkOutOfGrid(Cell),
    #[error("sink {0:?} fails the reachability predicate")]
    SinkUnreachable(Cell),
    #[error("non-finite edge cost between {from:?} and {to:?} after {relaxations} relaxations")]
    NonFiniteCost {
        from: Cell,
        to: Cell,
        relaxations: usize,
    },
    #[error("cost field did not converge within {relaxations} relaxations")]
    DidNotConverge { relaxations: usize },
}

#[derive(Debug, Clone, Error)]
pub enum TraceError {
    #[error("path trace cancelled")]
    Cancelled,
    #[error("start ({speed_index:.2}, {altitude_index:.2}) has no finite cost to the target")]
    StartUnreachable {
        speed_index: f64,
        altitude_index: f64,
    },
    #[error("iteration {iteration}: coordinate ({speed_index:.3}, {altitude_index:.3}) left the grid")]
    OutOfBounds {
        iteration: usize,
        speed_index: f64,
        altitude_index: f64,
    },
    #[error("iteration {iteration}: non-finite gradient at ({speed_index:.3}, {altitude_index:.3})")]
    NonFiniteGradient {
        iteration: usize,
        speed_index: f64,
        altitude_index: f64,
    },
    #[error("path did not reach the target within {iterations} iterations")]
    IterationLimit { iterations: usize },
}

#[derive(Debug, Clone, Error)]
pub enum AscentError {
    #[error("no cell of the grid sustains level flight")]
    NoSustainableTarget,
    #[error("requested coordinate ({speed_mps:.1} m/s, {altitude_m:.0} m) lies outside the grid")]
    CoordinateOutOfGrid { speed_mps: f64, altitude_m: f64 },
    #[error("{objective} cost field: {source}")]
    Solver {
        objective: &'static str,
        #[source]
        source: SolverError,
    },
    #[error("{objective} path: {source}")]
    Trace {
        objective: &'static str,
        #[source]
        source: TraceError,
    },
}

impl AscentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            AscentError::Solver {
                source: SolverError::Cancelled,
                ..
            } | AscentError::Trace {
                source: TraceError::Cancelled,
                ..
            }
        )
    }
}
