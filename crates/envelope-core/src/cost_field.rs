//! Minimum cost-to-sink fields over a sampled grid.
//!
//! Label-correcting relaxation on the 8-connected grid: a cell may be
//! revisited whenever a neighbor's cost drops, because physically derived
//! edge costs can make a later-discovered route cheaper. A per-cell
//! relaxation budget bounds the work on pathological inputs.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::SolverError;
use crate::grid::{EnvelopeGrid, GridDims};
use crate::models::{Cell, SamplePoint};

/// Cost of cells with no route to the sink.
pub const UNREACHABLE: f64 = f64::INFINITY;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverLimits {
    /// Relaxation budget, multiplied by the cell count
    pub max_relaxations_per_cell: usize,
    /// Pops between cancellation checks
    pub cancel_check_interval: usize,
}

impl Default for SolverLimits {
    fn default() -> Self {
        Self {
            max_relaxations_per_cell: 64,
            cancel_check_interval: 256,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CostField {
    dims: GridDims,
    sink: Cell,
    costs: Vec<f64>,
    relaxations: usize,
}

impl CostField {
    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn sink(&self) -> Cell {
        self.sink
    }

    /// Cost at `cell`; [`UNREACHABLE`] outside the grid.
    pub fn cost(&self, cell: Cell) -> f64 {
        if !self.dims.contains(cell) {
            return UNREACHABLE;
        }
        self.costs[self.dims.offset(cell)]
    }

    pub fn is_reachable(&self, cell: Cell) -> bool {
        self.cost(cell).is_finite()
    }

    /// Speed-major cost values.
    pub fn values(&self) -> &[f64] {
        &self.costs
    }

    pub fn relaxations(&self) -> usize {
        self.relaxations
    }

    pub fn reachable_count(&self) -> usize {
        self.costs.iter().filter(|cost| cost.is_finite()).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CostFieldSolver {
    limits: SolverLimits,
}

impl CostFieldSolver {
    pub fn new(limits: SolverLimits) -> Self {
        Self { limits }
    }

    /// Solve over a sampled grid with point-level predicate and edge cost.
    pub fn solve_grid<R, E>(
        &self,
        grid: &EnvelopeGrid,
        reachable: R,
        edge_cost: E,
        sink: Cell,
        cancel: &CancellationToken,
    ) -> Result<CostField, SolverError>
    where
        R: Fn(&SamplePoint) -> bool,
        E: Fn(&SamplePoint, &SamplePoint) -> f64,
    {
        self.solve(
            grid.dims(),
            |cell| reachable(&grid[cell]),
            |from, to| edge_cost(&grid[from], &grid[to]),
            sink,
            cancel,
        )
    }

    /// `edge_cost(from, to)` is the cost of moving from `from` to the
    /// adjacent cell `to` on the way to the sink. Infinite costs mark
    /// impassable edges; NaN is a divergence.
    pub fn solve<R, E>(
        &self,
        dims: GridDims,
        reachable: R,
        edge_cost: E,
        sink: Cell,
        cancel: &CancellationToken,
    ) -> Result<CostField, SolverError>
    where
        R: Fn(Cell) -> bool,
        E: Fn(Cell, Cell) -> f64,
    {
        if !dims.contains(sink) {
            return Err(SolverError::SinkOutOfGrid(sink));
        }
        if !reachable(sink) {
            return Err(SolverError::SinkUnreachable(sink));
        }
        if cancel.is_cancelled() {
            return Err(SolverError::Cancelled);
        }

        let passable: Vec<bool> = dims.cells().map(&reachable).collect();
        let mut costs = vec![UNREACHABLE; dims.len()];
        costs[dims.offset(sink)] = 0.0;

        let mut queue: VecDeque<Cell> = VecDeque::new();
        let mut queued = vec![false; dims.len()];
        for neighbor in dims.neighbors(sink) {
            let offset = dims.offset(neighbor);
            if passable[offset] {
                queued[offset] = true;
                queue.push_back(neighbor);
            }
        }

        let budget = dims
            .len()
            .saturating_mul(self.limits.max_relaxations_per_cell);
        let check_interval = self.limits.cancel_check_interval.max(1);
        let mut relaxations = 0usize;

        while let Some(cell) = queue.pop_front() {
            let offset = dims.offset(cell);
            queued[offset] = false;
            relaxations += 1;
            if relaxations > budget {
                tracing::warn!(relaxations, cells = dims.len(), "Cost field relaxation budget exhausted");
                return Err(SolverError::DidNotConverge { relaxations: budget });
            }
            if relaxations % check_interval == 0 && cancel.is_cancelled() {
                return Err(SolverError::Cancelled);
            }

            let mut best = costs[offset];
            for neighbor in dims.neighbors(cell) {
                let neighbor_cost = costs[dims.offset(neighbor)];
                if !passable[dims.offset(neighbor)] || !neighbor_cost.is_finite() {
                    continue;
                }
                let edge = edge_cost(cell, neighbor);
                if edge.is_nan() {
                    tracing::warn!(?cell, ?neighbor, relaxations, "NaN edge cost in cost field");
                    return Err(SolverError::NonFiniteCost {
                        from: cell,
                        to: neighbor,
                        relaxations,
                    });
                }
                let candidate = neighbor_cost + edge;
                if candidate < best {
                    best = candidate;
                }
            }

            if best >= costs[offset] {
                continue;
            }
            costs[offset] = best;

            for neighbor in dims.neighbors(cell) {
                let neighbor_offset = dims.offset(neighbor);
                if neighbor == sink || !passable[neighbor_offset] || queued[neighbor_offset] {
                    continue;
                }
                let edge = edge_cost(neighbor, cell);
                if edge.is_nan() {
                    tracing::warn!(?neighbor, ?cell, relaxations, "NaN edge cost in cost field");
                    return Err(SolverError::NonFiniteCost {
                        from: neighbor,
                        to: cell,
                        relaxations,
                    });
                }
                // Skip neighbors that this improvement cannot lower.
                if best + edge < costs[neighbor_offset] {
                    queued[neighbor_offset] = true;
                    queue.push_back(neighbor);
                }
            }
        }

        tracing::debug!(
            relaxations,
            cells = dims.len(),
            ?sink,
            "Cost field converged"
        );

        Ok(CostField {
            dims,
            sink,
            costs,
            relaxations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn is_diagonal(a: Cell, b: Cell) -> bool {
        a.speed != b.speed && a.altitude != b.altitude
    }

    fn value_grid<'a>(values: &'a [&'a [f64]]) -> (GridDims, impl Fn(Cell) -> f64 + 'a) {
        let dims = GridDims::new(values.len(), values[0].len());
        (dims, move |cell: Cell| values[cell.speed][cell.altitude])
    }

    #[test]
    fn unreachable_corner_is_excluded() {
        let values: [&[f64]; 2] = [&[-1.0, 2.0], &[3.0, 4.0]];
        let (dims, value) = value_grid(&values);
        let edge = |a: Cell, b: Cell| (value(a) - value(b)).abs() + 1.0;
        let field = CostFieldSolver::default()
            .solve(dims, |c| value(c) >= 0.0, edge, Cell::new(1, 1), &CancellationToken::new())
            .unwrap();

        assert_eq!(field.cost(Cell::new(1, 1)), 0.0);
        assert_eq!(field.cost(Cell::new(0, 1)), 3.0);
        assert_eq!(field.cost(Cell::new(1, 0)), 2.0);
        assert_eq!(field.cost(Cell::new(0, 0)), UNREACHABLE);
        assert_eq!(field.reachable_count(), 3);
    }

    #[test]
    fn corner_takes_cheapest_indirect_route() {
        let values: [&[f64]; 2] = [&[1.0, 2.0], &[3.0, 4.0]];
        let (dims, value) = value_grid(&values);
        let edge = |a: Cell, b: Cell| {
            (value(a) - value(b)).abs() + 1.0 + if is_diagonal(a, b) { 10.0 } else { 0.0 }
        };
        let field = CostFieldSolver::default()
            .solve(dims, |c| value(c) >= 0.0, edge, Cell::new(1, 1), &CancellationToken::new())
            .unwrap();

        let via_upper = edge(Cell::new(0, 0), Cell::new(0, 1)) + field.cost(Cell::new(0, 1));
        let via_right = edge(Cell::new(0, 0), Cell::new(1, 0)) + field.cost(Cell::new(1, 0));
        assert_eq!(field.cost(Cell::new(0, 0)), via_upper.min(via_right));
        assert_eq!(field.cost(Cell::new(0, 0)), 5.0);
    }

    #[test]
    fn relaxation_invariant_holds_on_random_fields() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let dims = GridDims::new(17, 13);
        let weights: Vec<f64> = (0..dims.len()).map(|_| rng.random_range(0.1..5.0)).collect();
        let blocked: Vec<bool> = (0..dims.len()).map(|_| rng.random_bool(0.15)).collect();
        let sink = Cell::new(8, 6);
        let reachable = |c: Cell| c == sink || !blocked[dims.offset(c)];
        let edge = |a: Cell, b: Cell| {
            let scale = if is_diagonal(a, b) { std::f64::consts::SQRT_2 } else { 1.0 };
            scale * (weights[dims.offset(a)] + weights[dims.offset(b)]) * 0.5
        };

        let field = CostFieldSolver::default()
            .solve(dims, reachable, edge, sink, &CancellationToken::new())
            .unwrap();

        assert_eq!(field.cost(sink), 0.0);
        for cell in dims.cells() {
            if !reachable(cell) {
                assert_eq!(field.cost(cell), UNREACHABLE);
                continue;
            }
            for neighbor in dims.neighbors(cell) {
                if !reachable(neighbor) {
                    continue;
                }
                let bound = field.cost(neighbor) + edge(cell, neighbor);
                assert!(
                    field.cost(cell) <= bound + 1e-9,
                    "{:?} -> {:?}: {} > {}",
                    cell,
                    neighbor,
                    field.cost(cell),
                    bound
                );
            }
        }
    }

    #[test]
    fn disconnected_island_stays_unreachable() {
        let dims = GridDims::new(5, 1);
        // Column 2 is a wall between the sink and cells 3..4.
        let field = CostFieldSolver::default()
            .solve(
                dims,
                |c| c.speed != 2,
                |_, _| 1.0,
                Cell::new(0, 0),
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(field.cost(Cell::new(1, 0)), 1.0);
        assert!(!field.is_reachable(Cell::new(3, 0)));
        assert!(!field.is_reachable(Cell::new(4, 0)));
    }

    #[test]
    fn infinite_edges_are_impassable() {
        let dims = GridDims::new(3, 1);
        let field = CostFieldSolver::default()
            .solve(
                dims,
                |_| true,
                |a, _| if a.speed == 2 { f64::INFINITY } else { 1.0 },
                Cell::new(0, 0),
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(field.cost(Cell::new(1, 0)), 1.0);
        assert_eq!(field.cost(Cell::new(2, 0)), UNREACHABLE);
    }

    #[test]
    fn nan_edge_is_divergence() {
        let dims = GridDims::new(3, 3);
        let result = CostFieldSolver::default().solve(
            dims,
            |_| true,
            |_, _| f64::NAN,
            Cell::new(1, 1),
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(SolverError::NonFiniteCost { .. })));
    }

    #[test]
    fn nan_edge_toward_improved_cell_is_divergence() {
        // The only NaN edge leads from the far cell into the first one improved.
        let result = CostFieldSolver::default().solve(
            GridDims::new(3, 1),
            |_| true,
            |a: Cell, b: Cell| if a.speed == 2 && b.speed == 1 { f64::NAN } else { 1.0 },
            Cell::new(0, 0),
            &CancellationToken::new(),
        );
        match result {
            Err(SolverError::NonFiniteCost { from, to, relaxations }) => {
                assert_eq!(from, Cell::new(2, 0));
                assert_eq!(to, Cell::new(1, 0));
                assert_eq!(relaxations, 1);
            }
            other => panic!("expected divergence, got {:?}", other.map(|field| field.relaxations())),
        }
    }

    #[test]
    fn exhausted_budget_reports_non_convergence() {
        let solver = CostFieldSolver::new(SolverLimits {
            max_relaxations_per_cell: 0,
            cancel_check_interval: 1,
        });
        let result = solver.solve(
            GridDims::new(4, 4),
            |_| true,
            |_, _| 1.0,
            Cell::new(0, 0),
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(SolverError::DidNotConverge { .. })));
    }

    #[test]
    fn sink_must_be_inside_and_reachable() {
        let solver = CostFieldSolver::default();
        let cancel = CancellationToken::new();
        assert!(matches!(
            solver.solve(GridDims::new(2, 2), |_| true, |_, _| 1.0, Cell::new(5, 0), &cancel),
            Err(SolverError::SinkOutOfGrid(_))
        ));
        assert!(matches!(
            solver.solve(GridDims::new(2, 2), |_| false, |_, _| 1.0, Cell::new(0, 0), &cancel),
            Err(SolverError::SinkUnreachable(_))
        ));
    }

    #[test]
    fn cancelled_token_aborts() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = CostFieldSolver::default().solve(
            GridDims::new(8, 8),
            |_| true,
            |_, _| 1.0,
            Cell::new(0, 0),
            &cancel,
        );
        assert!(matches!(result, Err(SolverError::Cancelled)));
    }
}
