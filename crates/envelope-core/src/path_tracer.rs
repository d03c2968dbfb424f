//! Gradient descent over a cost field, producing ascent paths.
//!
//! The tracer works in continuous index space: `(1.5, 2.0)` lies halfway
//! between speed columns 1 and 2 on altitude row 2. Physical values along the
//! path come from bilinear interpolation of the sampled grid.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cost_field::CostField;
use crate::error::TraceError;
use crate::grid::{EnvelopeGrid, GridDims};
use crate::models::{AscentPathPoint, Cell, SamplePoint};

/// Continuous (speed, altitude) index coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCoordinate {
    pub speed: f64,
    pub altitude: f64,
}

impl GridCoordinate {
    pub fn new(speed: f64, altitude: f64) -> Self {
        Self { speed, altitude }
    }

    pub fn distance(&self, other: GridCoordinate) -> f64 {
        (self.speed - other.speed).hypot(self.altitude - other.altitude)
    }

    pub fn nearest_cell(&self) -> Cell {
        Cell::new(
            self.speed.round().max(0.0) as usize,
            self.altitude.round().max(0.0) as usize,
        )
    }
}

impl From<Cell> for GridCoordinate {
    fn from(cell: Cell) -> Self {
        Self::new(cell.speed as f64, cell.altitude as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TracerSettings {
    /// Base step length in cells, shortened where the gradient is steep
    pub step_cells: f64,
    /// Distance to the sink, in cells, that counts as arrival
    pub tolerance_cells: f64,
    /// Iterations between recorded path points
    pub record_interval: usize,
    pub max_iterations: usize,
    /// Gradient magnitudes below this fraction of the mean count as zero
    pub stall_ratio: f64,
    /// Iterations without lowering the interpolated cost before giving up
    pub stall_window: usize,
}

impl Default for TracerSettings {
    fn default() -> Self {
        Self {
            step_cells: 0.25,
            tolerance_cells: 0.5,
            record_interval: 4,
            max_iterations: 20_000,
            stall_ratio: 1e-9,
            stall_window: 64,
        }
    }
}

/// How a successful trace ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceOutcome {
    ReachedTarget,
    /// The gradient vanished before the sink; the path cannot progress.
    Stalled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AscentPath {
    pub points: Vec<AscentPathPoint>,
    pub outcome: TraceOutcome,
    pub iterations: usize,
}

impl AscentPath {
    pub fn total_cost(&self) -> f64 {
        self.points.last().map(|point| point.cost).unwrap_or(0.0)
    }

    pub fn total_time_s(&self) -> f64 {
        self.points.last().map(|point| point.time_s).unwrap_or(0.0)
    }
}

/// Per-cell cost gradient in index units. Unreachable cells hold NaN.
#[derive(Debug, Clone)]
pub struct GradientField {
    dims: GridDims,
    speed: Vec<f64>,
    altitude: Vec<f64>,
    mean_magnitude: f64,
}

impl GradientField {
    /// Central differences between adjacent cells, falling back to one-sided
    /// differences next to the grid edge or an unreachable neighbor.
    pub fn from_cost_field(field: &CostField) -> Self {
        let dims = field.dims();
        let mut speed = vec![f64::NAN; dims.len()];
        let mut altitude = vec![f64::NAN; dims.len()];
        let mut magnitude_sum = 0.0;
        let mut magnitude_count = 0usize;

        for cell in dims.cells() {
            let here = field.cost(cell);
            if !here.is_finite() {
                continue;
            }
            let offset = dims.offset(cell);
            let lower_speed = cell
                .speed
                .checked_sub(1)
                .map(|s| field.cost(Cell::new(s, cell.altitude)));
            let upper_speed = field.cost(Cell::new(cell.speed + 1, cell.altitude));
            let lower_altitude = cell
                .altitude
                .checked_sub(1)
                .map(|a| field.cost(Cell::new(cell.speed, a)));
            let upper_altitude = field.cost(Cell::new(cell.speed, cell.altitude + 1));

            speed[offset] = difference(here, lower_speed, upper_speed);
            altitude[offset] = difference(here, lower_altitude, upper_altitude);

            let magnitude = speed[offset].hypot(altitude[offset]);
            if magnitude > 0.0 {
                magnitude_sum += magnitude;
                magnitude_count += 1;
            }
        }

        let mean_magnitude = if magnitude_count == 0 {
            0.0
        } else {
            magnitude_sum / magnitude_count as f64
        };

        Self {
            dims,
            speed,
            altitude,
            mean_magnitude,
        }
    }

    pub fn mean_magnitude(&self) -> f64 {
        self.mean_magnitude
    }

    pub fn at(&self, cell: Cell) -> Option<(f64, f64)> {
        if !self.dims.contains(cell) {
            return None;
        }
        let offset = self.dims.offset(cell);
        Some((self.speed[offset], self.altitude[offset]))
    }

    /// Bilinear blend of the surrounding cell gradients. Unreachable corners
    /// are skipped and the remaining weights renormalized; `None` if no
    /// corner with weight contributes.
    pub fn sample(&self, at: GridCoordinate) -> Option<(f64, f64)> {
        let max_x = (self.dims.speed_count - 1) as f64;
        let max_y = (self.dims.altitude_count - 1) as f64;
        if !(0.0..=max_x).contains(&at.speed) || !(0.0..=max_y).contains(&at.altitude) {
            return None;
        }
        let x0 = at.speed.floor() as usize;
        let y0 = at.altitude.floor() as usize;
        let dx = at.speed - x0 as f64;
        let dy = at.altitude - y0 as f64;

        let corners = [
            (Cell::new(x0, y0), (1.0 - dx) * (1.0 - dy)),
            (Cell::new(x0 + 1, y0), dx * (1.0 - dy)),
            (Cell::new(x0, y0 + 1), (1.0 - dx) * dy),
            (Cell::new(x0 + 1, y0 + 1), dx * dy),
        ];

        let mut weight_sum = 0.0;
        let mut gx = 0.0;
        let mut gy = 0.0;
        for (cell, weight) in corners {
            if weight <= 0.0 {
                continue;
            }
            let Some((sx, sy)) = self.at(cell) else {
                continue;
            };
            if !sx.is_finite() || !sy.is_finite() {
                continue;
            }
            weight_sum += weight;
            gx += weight * sx;
            gy += weight * sy;
        }

        if weight_sum <= 0.0 {
            return None;
        }
        Some((gx / weight_sum, gy / weight_sum))
    }
}

/// Bilinear cost at a continuous coordinate over the finite corners.
fn interpolated_cost(field: &CostField, at: GridCoordinate) -> f64 {
    let x0 = at.speed.floor().max(0.0) as usize;
    let y0 = at.altitude.floor().max(0.0) as usize;
    let dx = at.speed - x0 as f64;
    let dy = at.altitude - y0 as f64;
    let corners = [
        (Cell::new(x0, y0), (1.0 - dx) * (1.0 - dy)),
        (Cell::new(x0 + 1, y0), dx * (1.0 - dy)),
        (Cell::new(x0, y0 + 1), (1.0 - dx) * dy),
        (Cell::new(x0 + 1, y0 + 1), dx * dy),
    ];
    let mut weight_sum = 0.0;
    let mut total = 0.0;
    for (cell, weight) in corners {
        let cost = field.cost(cell);
        if weight > 0.0 && cost.is_finite() {
            weight_sum += weight;
            total += weight * cost;
        }
    }
    if weight_sum <= 0.0 {
        return f64::INFINITY;
    }
    total / weight_sum
}

fn difference(here: f64, lower: Option<f64>, upper: f64) -> f64 {
    let lower = lower.filter(|value| value.is_finite());
    let upper = upper.is_finite().then_some(upper);
    match (lower, upper) {
        (Some(lower), Some(upper)) => (upper - lower) * 0.5,
        (Some(lower), None) => here - lower,
        (None, Some(upper)) => upper - here,
        (None, None) => 0.0,
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathTracer {
    settings: TracerSettings,
}

struct Recorder<'a, E, T> {
    grid: &'a EnvelopeGrid,
    edge_cost: E,
    time_cost: T,
    previous: SamplePoint,
    cost: f64,
    time_s: f64,
    points: Vec<AscentPathPoint>,
}

impl<E, T> Recorder<'_, E, T>
where
    E: Fn(&SamplePoint, &SamplePoint) -> f64,
    T: Fn(&SamplePoint, &SamplePoint) -> f64,
{
    fn record(&mut self, at: GridCoordinate, iteration: usize) -> Result<(), TraceError> {
        let current = self
            .grid
            .interpolate(at.speed, at.altitude)
            .ok_or(TraceError::OutOfBounds {
                iteration,
                speed_index: at.speed,
                altitude_index: at.altitude,
            })?;
        let step_time = (self.time_cost)(&self.previous, &current);
        self.cost += (self.edge_cost)(&self.previous, &current);
        self.time_s += step_time;

        let climb_rate = if step_time.is_finite() && step_time > 0.0 {
            (current.altitude_m - self.previous.altitude_m) / step_time
        } else {
            current.excess_specific_power()
        };
        self.points.push(AscentPathPoint::new(
            current.speed_mps,
            current.altitude_m,
            self.cost,
            climb_rate,
            self.time_s,
        ));
        self.previous = current;
        Ok(())
    }
}

impl PathTracer {
    pub fn new(settings: TracerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TracerSettings {
        &self.settings
    }

    /// Descend `field` from `start` toward its sink.
    ///
    /// `edge_cost` and `time_cost` are evaluated between consecutive recorded
    /// points and accumulated into each [`AscentPathPoint`]. The start itself
    /// is recorded with zero cost and time.
    pub fn trace<E, T>(
        &self,
        field: &CostField,
        grid: &EnvelopeGrid,
        start: GridCoordinate,
        edge_cost: E,
        time_cost: T,
        cancel: &CancellationToken,
    ) -> Result<AscentPath, TraceError>
    where
        E: Fn(&SamplePoint, &SamplePoint) -> f64,
        T: Fn(&SamplePoint, &SamplePoint) -> f64,
    {
        let settings = &self.settings;
        let sink = GridCoordinate::from(field.sink());
        let dims = field.dims();
        let max_x = (dims.speed_count - 1) as f64;
        let max_y = (dims.altitude_count - 1) as f64;

        let first = grid
            .interpolate(start.speed, start.altitude)
            .ok_or(TraceError::OutOfBounds {
                iteration: 0,
                speed_index: start.speed,
                altitude_index: start.altitude,
            })?;
        if !field.is_reachable(start.nearest_cell()) {
            return Err(TraceError::StartUnreachable {
                speed_index: start.speed,
                altitude_index: start.altitude,
            });
        }

        let gradient = GradientField::from_cost_field(field);
        let mean = gradient.mean_magnitude();
        let record_interval = settings.record_interval.max(1);

        let mut recorder = Recorder {
            grid,
            edge_cost,
            time_cost,
            previous: first,
            cost: 0.0,
            time_s: 0.0,
            points: vec![AscentPathPoint::new(
                first.speed_mps,
                first.altitude_m,
                0.0,
                first.excess_specific_power(),
                0.0,
            )],
        };

        let mut position = start;
        let mut moved_since_record = false;
        let mut best_cost = interpolated_cost(field, start);
        let mut since_improvement = 0usize;
        let stall_window = settings.stall_window.max(1);

        for iteration in 1..=settings.max_iterations {
            if cancel.is_cancelled() {
                return Err(TraceError::Cancelled);
            }

            let remaining = position.distance(sink);
            if remaining <= settings.tolerance_cells {
                if moved_since_record {
                    recorder.record(position, iteration)?;
                }
                return Ok(self.finish(recorder.points, TraceOutcome::ReachedTarget, iteration));
            }

            let (gx, gy) = gradient
                .sample(position)
                .ok_or(TraceError::NonFiniteGradient {
                    iteration,
                    speed_index: position.speed,
                    altitude_index: position.altitude,
                })?;
            let magnitude = gx.hypot(gy);
            if !magnitude.is_finite() {
                tracing::warn!(iteration, ?position, "Non-finite cost gradient");
                return Err(TraceError::NonFiniteGradient {
                    iteration,
                    speed_index: position.speed,
                    altitude_index: position.altitude,
                });
            }
            if mean <= 0.0 || magnitude <= settings.stall_ratio * mean {
                if moved_since_record {
                    recorder.record(position, iteration)?;
                }
                tracing::debug!(iteration, ?position, "Ascent path stalled on a flat cost gradient");
                return Ok(self.finish(recorder.points, TraceOutcome::Stalled, iteration));
            }

            let step = (settings.step_cells / (magnitude / mean).max(1.0)).min(remaining);
            let direction = (-gx / magnitude, -gy / magnitude);
            // Slide along the grid edge or the envelope boundary rather than
            // stepping off either; give up only when no component can move.
            let candidates = [direction, (direction.0, 0.0), (0.0, direction.1)];
            let next = candidates.into_iter().find_map(|(ux, uy)| {
                if ux == 0.0 && uy == 0.0 {
                    return None;
                }
                let candidate = GridCoordinate::new(
                    (position.speed + ux * step).clamp(0.0, max_x),
                    (position.altitude + uy * step).clamp(0.0, max_y),
                );
                let moved = candidate.distance(position) > 0.0;
                (moved && field.is_reachable(candidate.nearest_cell())).then_some(candidate)
            });
            let Some(next) = next else {
                if moved_since_record {
                    recorder.record(position, iteration)?;
                }
                tracing::debug!(iteration, ?position, "Ascent path pinned against the envelope boundary");
                return Ok(self.finish(recorder.points, TraceOutcome::Stalled, iteration));
            };
            position = next;
            moved_since_record = true;

            let cost = interpolated_cost(field, position);
            if cost < best_cost {
                best_cost = cost;
                since_improvement = 0;
            } else {
                since_improvement += 1;
                if since_improvement >= stall_window {
                    recorder.record(position, iteration)?;
                    tracing::debug!(iteration, ?position, best_cost, "Ascent path stopped improving");
                    return Ok(self.finish(recorder.points, TraceOutcome::Stalled, iteration));
                }
            }

            if iteration % record_interval == 0 {
                recorder.record(position, iteration)?;
                moved_since_record = false;
            }
        }

        tracing::warn!(
            iterations = settings.max_iterations,
            "Ascent path did not reach the target"
        );
        Err(TraceError::IterationLimit {
            iterations: settings.max_iterations,
        })
    }

    fn finish(
        &self,
        points: Vec<AscentPathPoint>,
        outcome: TraceOutcome,
        iterations: usize,
    ) -> AscentPath {
        tracing::debug!(points = points.len(), iterations, ?outcome, "Ascent path traced");
        AscentPath {
            points,
            outcome,
            iterations,
        }
    }
}
