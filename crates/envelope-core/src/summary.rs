//! Scalar characteristics of a sampled envelope.

use serde::{Deserialize, Serialize};

use crate::grid::EnvelopeGrid;
use crate::models::{Cell, FlightCondition, SamplePoint};

/// Level-flight ceiling of one speed column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnCeiling {
    pub speed_mps: f64,
    /// `None` when no altitude of the column sustains level flight
    pub ceiling_m: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimbPoint {
    pub condition: FlightCondition,
    pub climb_rate_mps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeSummary {
    pub ceilings: Vec<ColumnCeiling>,
    pub absolute_ceiling: Option<FlightCondition>,
    pub max_level_speed: Option<FlightCondition>,
    pub best_climb: Option<ClimbPoint>,
    /// Sustainable point of greatest energy height, the default ascent target
    pub max_energy: Option<FlightCondition>,
    pub sustainable_cells: usize,
}

impl EnvelopeSummary {
    pub fn from_grid(grid: &EnvelopeGrid) -> Self {
        let dims = grid.dims();
        let mut ceilings = Vec::with_capacity(dims.speed_count);
        for speed in 0..dims.speed_count {
            ceilings.push(ColumnCeiling {
                speed_mps: grid[Cell::new(speed, 0)].speed_mps,
                ceiling_m: column_ceiling(grid, speed),
            });
        }

        let absolute_ceiling = ceilings
            .iter()
            .filter_map(|column| {
                column
                    .ceiling_m
                    .map(|ceiling| FlightCondition::new(column.speed_mps, ceiling))
            })
            .max_by(|a, b| a.altitude_m.total_cmp(&b.altitude_m));

        let sustainable = || grid.points().iter().filter(|point| point.is_sustainable());

        let max_level_speed = sustainable()
            .max_by(|a, b| a.speed_mps.total_cmp(&b.speed_mps))
            .map(FlightCondition::from);

        let best_climb = sustainable()
            .max_by(|a, b| {
                a.excess_specific_power()
                    .total_cmp(&b.excess_specific_power())
            })
            .map(|point| ClimbPoint {
                condition: FlightCondition::from(point),
                climb_rate_mps: point.excess_specific_power(),
            });

        let max_energy = max_energy_cell(grid).map(|cell| FlightCondition::from(&grid[cell]));

        Self {
            ceilings,
            absolute_ceiling,
            max_level_speed,
            best_climb,
            max_energy,
            sustainable_cells: sustainable().count(),
        }
    }
}

/// Highest sustainable altitude of a speed column, refined by linear
/// interpolation of excess thrust toward the first unsustainable row above.
fn column_ceiling(grid: &EnvelopeGrid, speed: usize) -> Option<f64> {
    let rows = grid.dims().altitude_count;
    let top = (0..rows)
        .rev()
        .find(|&altitude| grid[Cell::new(speed, altitude)].is_sustainable())?;
    let below = &grid[Cell::new(speed, top)];
    if top + 1 == rows {
        return Some(below.altitude_m);
    }
    let above = &grid[Cell::new(speed, top + 1)];
    let (low, high) = (below.excess_thrust(), above.excess_thrust());
    if !(low - high).is_finite() || low - high <= 0.0 {
        return Some(below.altitude_m);
    }
    let fraction = (low / (low - high)).clamp(0.0, 1.0);
    Some(below.altitude_m + fraction * (above.altitude_m - below.altitude_m))
}

/// Sustainable cell with the greatest energy height.
pub fn max_energy_cell(grid: &EnvelopeGrid) -> Option<Cell> {
    extreme_energy_cell(grid, |candidate, best| candidate > best)
}

/// Sustainable cell with the least energy height.
pub fn min_energy_cell(grid: &EnvelopeGrid) -> Option<Cell> {
    extreme_energy_cell(grid, |candidate, best| candidate < best)
}

fn extreme_energy_cell(grid: &EnvelopeGrid, better: impl Fn(f64, f64) -> bool) -> Option<Cell> {
    let dims = grid.dims();
    let mut best: Option<(Cell, f64)> = None;
    for cell in dims.cells() {
        let point: &SamplePoint = &grid[cell];
        if !point.is_sustainable() {
            continue;
        }
        let energy = point.energy_height();
        match best {
            Some((_, current)) if !better(energy, current) => {}
            _ => best = Some((cell, energy)),
        }
    }
    best.map(|(cell, _)| cell)
}
