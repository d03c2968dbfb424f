//! Fuel- and time-optimal ascent paths across a sampled envelope.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cost_field::{CostFieldSolver, SolverLimits};
use crate::error::AscentError;
use crate::grid::EnvelopeGrid;
use crate::models::{Cell, FlightCondition, SamplePoint};
use crate::path_tracer::{AscentPath, GridCoordinate, PathTracer, TracerSettings};
use crate::summary::{max_energy_cell, min_energy_cell};

/// Quantity an ascent path minimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Fuel,
    Time,
}

impl Objective {
    pub const ALL: [Objective; 2] = [Objective::Fuel, Objective::Time];

    pub fn name(&self) -> &'static str {
        match self {
            Objective::Fuel => "fuel",
            Objective::Time => "time",
        }
    }

    pub fn cost(&self, from: &SamplePoint, to: &SamplePoint) -> f64 {
        match self {
            Objective::Fuel => fuel_cost(from, to),
            Objective::Time => time_cost(from, to),
        }
    }
}

/// Seconds to change specific energy between two points, climbing at the
/// mean excess specific power. Infinite where the pair cannot climb.
pub fn time_cost(from: &SamplePoint, to: &SamplePoint) -> f64 {
    let climb_power = 0.5 * (from.excess_specific_power() + to.excess_specific_power());
    if !climb_power.is_finite() || climb_power <= 0.0 {
        return f64::INFINITY;
    }
    (to.energy_height() - from.energy_height()).abs() / climb_power
}

/// Kilograms of fuel burned over [`time_cost`] at the mean burn rate.
pub fn fuel_cost(from: &SamplePoint, to: &SamplePoint) -> f64 {
    let time = time_cost(from, to);
    if !time.is_finite() {
        return f64::INFINITY;
    }
    0.5 * (from.fuel_burn_kg_s + to.fuel_burn_kg_s) * time
}

/// Where to start and end, and how hard to search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AscentOptions {
    /// Defaults to the sustainable point of greatest energy height
    pub target: Option<FlightCondition>,
    /// Defaults to the sustainable point of least energy height
    pub start: Option<FlightCondition>,
    pub solver: SolverLimits,
    pub tracer: TracerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AscentSolution {
    pub target: FlightCondition,
    pub start: FlightCondition,
    pub fuel: AscentPath,
    pub time: AscentPath,
}

impl AscentSolution {
    pub fn path(&self, objective: Objective) -> &AscentPath {
        match objective {
            Objective::Fuel => &self.fuel,
            Objective::Time => &self.time,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AscentSolver {
    solver: CostFieldSolver,
    tracer: PathTracer,
}

impl AscentSolver {
    pub fn new(limits: SolverLimits, settings: TracerSettings) -> Self {
        Self {
            solver: CostFieldSolver::new(limits),
            tracer: PathTracer::new(settings),
        }
    }

    /// Cost field toward `target` under `objective`, then descent from `start`.
    pub fn solve_objective(
        &self,
        grid: &EnvelopeGrid,
        objective: Objective,
        target: Cell,
        start: GridCoordinate,
        cancel: &CancellationToken,
    ) -> Result<AscentPath, AscentError> {
        let field = self
            .solver
            .solve_grid(
                grid,
                SamplePoint::is_sustainable,
                |from, to| objective.cost(from, to),
                target,
                cancel,
            )
            .map_err(|source| AscentError::Solver {
                objective: objective.name(),
                source,
            })?;

        self.tracer
            .trace(
                &field,
                grid,
                start,
                |from, to| objective.cost(from, to),
                time_cost,
                cancel,
            )
            .map_err(|source| AscentError::Trace {
                objective: objective.name(),
                source,
            })
    }

    pub fn solve(
        &self,
        grid: &EnvelopeGrid,
        target: Option<FlightCondition>,
        start: Option<FlightCondition>,
        cancel: &CancellationToken,
    ) -> Result<AscentSolution, AscentError> {
        let target_cell = match target {
            Some(condition) => grid
                .nearest_cell(condition.speed_mps, condition.altitude_m)
                .ok_or(AscentError::CoordinateOutOfGrid {
                    speed_mps: condition.speed_mps,
                    altitude_m: condition.altitude_m,
                })?,
            None => max_energy_cell(grid).ok_or(AscentError::NoSustainableTarget)?,
        };

        let start_coordinate = match start {
            Some(condition) => {
                if !grid.contains(condition.speed_mps, condition.altitude_m) {
                    return Err(AscentError::CoordinateOutOfGrid {
                        speed_mps: condition.speed_mps,
                        altitude_m: condition.altitude_m,
                    });
                }
                let (speed, altitude) = grid.index_of(condition.speed_mps, condition.altitude_m);
                GridCoordinate::new(speed, altitude)
            }
            None => GridCoordinate::from(
                min_energy_cell(grid).ok_or(AscentError::NoSustainableTarget)?,
            ),
        };

        let fuel = self.solve_objective(grid, Objective::Fuel, target_cell, start_coordinate, cancel)?;
        let time = self.solve_objective(grid, Objective::Time, target_cell, start_coordinate, cancel)?;

        let start_point = FlightCondition::new(
            grid.speed_at(start_coordinate.speed),
            grid.altitude_at(start_coordinate.altitude),
        );

        tracing::info!(
            target_speed_mps = grid[target_cell].speed_mps,
            target_altitude_m = grid[target_cell].altitude_m,
            fuel_kg = fuel.total_cost(),
            time_s = time.total_time_s(),
            "Ascent paths solved"
        );

        Ok(AscentSolution {
            target: FlightCondition::from(&grid[target_cell]),
            start: start_point,
            fuel,
            time,
        })
    }
}

/// Solve both ascent objectives on `grid` with the given options.
pub fn solve_ascent(
    grid: &EnvelopeGrid,
    options: &AscentOptions,
    cancel: &CancellationToken,
) -> Result<AscentSolution, AscentError> {
    AscentSolver::new(options.solver, options.tracer).solve(grid, options.target, options.start, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SolverError, TraceError};
    use crate::grid::tests::flat_point;
    use crate::models::{AxisBounds, Resolution};
    use crate::path_tracer::TraceOutcome;

    fn point(speed: f64, altitude: f64, excess: f64, burn: f64) -> SamplePoint {
        SamplePoint {
            fuel_burn_kg_s: burn,
            ..flat_point(speed, altitude, excess)
        }
    }

    /// Envelope whose excess thrust shrinks with altitude and vanishes above
    /// 8 km at low speed.
    fn envelope() -> EnvelopeGrid {
        let resolution = Resolution::new(10, 10);
        let mut points = Vec::new();
        for i in 0..=10 {
            for j in 0..=10 {
                let speed = 100.0 + 20.0 * i as f64;
                let altitude = 1_000.0 * j as f64;
                let mut excess = 60.0 + 0.1 * (speed - 100.0) - altitude / 100.0;
                if speed < 140.0 {
                    excess -= 20.0;
                }
                points.push(point(speed, altitude, excess, 1.0 + altitude / 10_000.0));
            }
        }
        EnvelopeGrid::new(
            AxisBounds::new(100.0, 300.0),
            AxisBounds::new(0.0, 10_000.0),
            resolution,
            points,
        )
        .unwrap()
    }

    #[test]
    fn time_cost_is_symmetric_and_infinite_without_climb_power() {
        let low = point(100.0, 0.0, 50.0, 1.0);
        let high = point(100.0, 1_000.0, 50.0, 1.0);
        let forward = time_cost(&low, &high);
        assert!(forward.is_finite() && forward > 0.0);
        assert_eq!(forward, time_cost(&high, &low));

        let stalled = point(100.0, 1_000.0, -50.0, 1.0);
        assert_eq!(time_cost(&low, &stalled), f64::INFINITY);
        assert_eq!(fuel_cost(&low, &stalled), f64::INFINITY);
    }

    #[test]
    fn fuel_cost_scales_time_by_mean_burn() {
        let a = point(100.0, 0.0, 50.0, 2.0);
        let b = point(100.0, 500.0, 50.0, 4.0);
        let expected = 3.0 * time_cost(&a, &b);
        assert!((fuel_cost(&a, &b) - expected).abs() < 1e-12);
    }

    #[test]
    fn default_target_is_max_energy() {
        let grid = envelope();
        let solution = AscentSolver::default()
            .solve(&grid, None, None, &CancellationToken::new())
            .unwrap();
        let expected = max_energy_cell(&grid).unwrap();
        assert_eq!(solution.target, FlightCondition::from(&grid[expected]));
        for objective in Objective::ALL {
            let path = solution.path(objective);
            assert_eq!(path.points[0].cost, 0.0);
            assert_eq!(path.outcome, TraceOutcome::ReachedTarget, "{:?}", objective);
            let last = path.points.last().unwrap();
            assert!((last.speed_mps - solution.target.speed_mps).abs() <= 20.0);
            assert!((last.altitude_m - solution.target.altitude_m).abs() <= 1_000.0);
        }
    }

    #[test]
    fn explicit_target_outside_grid_is_rejected() {
        let grid = envelope();
        let result = AscentSolver::default().solve(
            &grid,
            Some(FlightCondition::new(500.0, 1_000.0)),
            None,
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(AscentError::CoordinateOutOfGrid { .. })));
    }

    #[test]
    fn unsustainable_target_is_a_solver_error() {
        let grid = envelope();
        // 100 m/s at 10 km: 60 - 100 - 20 < 0
        let result = AscentSolver::default().solve(
            &grid,
            Some(FlightCondition::new(100.0, 10_000.0)),
            None,
            &CancellationToken::new(),
        );
        assert!(matches!(
            result,
            Err(AscentError::Solver {
                source: SolverError::SinkUnreachable(_),
                ..
            })
        ));
    }

    #[test]
    fn unsustainable_start_is_reported() {
        let grid = envelope();
        let result = AscentSolver::default().solve(
            &grid,
            None,
            Some(FlightCondition::new(100.0, 9_000.0)),
            &CancellationToken::new(),
        );
        assert!(matches!(
            result,
            Err(AscentError::Trace {
                source: TraceError::StartUnreachable { .. },
                ..
            })
        ));
    }

    #[test]
    fn cancellation_is_recognised() {
        let grid = envelope();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let error = solve_ascent(&grid, &AscentOptions::default(), &cancel).unwrap_err();
        assert!(error.is_cancelled());
    }
}
