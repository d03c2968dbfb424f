pub mod aero;
pub mod ascent;
pub mod cache;
pub mod config;
pub mod cost_field;
pub mod error;
pub mod grid;
pub mod models;
pub mod path_tracer;
pub mod pool;
pub mod progress;
pub mod sampler;
pub mod summary;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use aero::{AeroEvaluator, AeroModel, AeroState};
pub use ascent::{
    fuel_cost, solve_ascent, time_cost, AscentOptions, AscentSolution, AscentSolver, Objective,
};
pub use cache::{CacheKey, CacheStats, PointCache, Quantization};
pub use config::EnvelopeConfig;
pub use cost_field::{CostField, CostFieldSolver, SolverLimits, UNREACHABLE};
pub use error::{AscentError, CellFault, EvaluationError, SampleError, SolverError, TraceError};
pub use grid::{EnvelopeField, EnvelopeGrid, GridDims};
pub use models::{
    AscentPathPoint, AxisBounds, Cell, FlightCondition, Resolution, SamplePoint, G0,
};
pub use path_tracer::{
    AscentPath, GradientField, GridCoordinate, PathTracer, TraceOutcome, TracerSettings,
};
pub use pool::{ModelLease, ModelPool};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use sampler::{build_worker_pool, GridSampler};
pub use summary::{max_energy_cell, min_energy_cell, ClimbPoint, ColumnCeiling, EnvelopeSummary};
