//! Sampled (speed, altitude) grids and dense field extraction.

use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::error::SampleError;
use crate::models::{AxisBounds, Cell, Resolution, SamplePoint};

/// Extents of a 2-D grid in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridDims {
    pub speed_count: usize,
    pub altitude_count: usize,
}

impl GridDims {
    pub const fn new(speed_count: usize, altitude_count: usize) -> Self {
        Self {
            speed_count,
            altitude_count,
        }
    }

    pub fn len(&self) -> usize {
        self.speed_count * self.altitude_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.speed < self.speed_count && cell.altitude < self.altitude_count
    }

    /// Row-major offset, speed-major: all altitudes of speed 0 come first.
    pub fn offset(&self, cell: Cell) -> usize {
        cell.speed * self.altitude_count + cell.altitude
    }

    pub fn cell_at(&self, offset: usize) -> Cell {
        Cell::new(offset / self.altitude_count, offset % self.altitude_count)
    }

    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.len()).map(move |offset| self.cell_at(offset))
    }

    /// The up to eight cells surrounding `cell`.
    pub fn neighbors(&self, cell: Cell) -> impl Iterator<Item = Cell> + '_ {
        static OFFSETS: [(isize, isize); 8] = [
            (-1, -1),
            (-1, 0),
            (-1, 1),
            (0, -1),
            (0, 1),
            (1, -1),
            (1, 0),
            (1, 1),
        ];
        OFFSETS.iter().filter_map(move |(ds, da)| {
            let speed = cell.speed.checked_add_signed(*ds)?;
            let altitude = cell.altitude.checked_add_signed(*da)?;
            let next = Cell::new(speed, altitude);
            self.contains(next).then_some(next)
        })
    }
}

/// Named per-point quantity for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeField {
    ExcessThrust,
    ExcessSpecificPower,
    EnergyHeight,
    LevelAoa,
    MaxLiftAoa,
    LiftToDrag,
    ThrustAvailable,
    ThrustRequired,
    FuelBurn,
    PitchTrim,
    SpecificRange,
    Mach,
    DynamicPressure,
}

impl EnvelopeField {
    pub const ALL: [EnvelopeField; 13] = [
        EnvelopeField::ExcessThrust,
        EnvelopeField::ExcessSpecificPower,
        EnvelopeField::EnergyHeight,
        EnvelopeField::LevelAoa,
        EnvelopeField::MaxLiftAoa,
        EnvelopeField::LiftToDrag,
        EnvelopeField::ThrustAvailable,
        EnvelopeField::ThrustRequired,
        EnvelopeField::FuelBurn,
        EnvelopeField::PitchTrim,
        EnvelopeField::SpecificRange,
        EnvelopeField::Mach,
        EnvelopeField::DynamicPressure,
    ];

    pub fn value(&self, point: &SamplePoint) -> f64 {
        match self {
            EnvelopeField::ExcessThrust => point.excess_thrust(),
            EnvelopeField::ExcessSpecificPower => point.excess_specific_power(),
            EnvelopeField::EnergyHeight => point.energy_height(),
            EnvelopeField::LevelAoa => point.aoa_level_rad,
            EnvelopeField::MaxLiftAoa => point.aoa_max_lift_rad,
            EnvelopeField::LiftToDrag => point.lift_to_drag(),
            EnvelopeField::ThrustAvailable => point.thrust_available_n,
            EnvelopeField::ThrustRequired => point.thrust_required_n,
            EnvelopeField::FuelBurn => point.fuel_burn_kg_s,
            EnvelopeField::PitchTrim => point.pitch_trim,
            EnvelopeField::SpecificRange => point.specific_range(),
            EnvelopeField::Mach => point.mach,
            EnvelopeField::DynamicPressure => point.dynamic_pressure_pa,
        }
    }
}

/// A fully computed grid of sample points.
///
/// Grids are only ever built complete; there is no way to observe a
/// partially written one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeGrid {
    speed: AxisBounds,
    altitude: AxisBounds,
    resolution: Resolution,
    points: Vec<SamplePoint>,
}

impl EnvelopeGrid {
    pub fn new(
        speed: AxisBounds,
        altitude: AxisBounds,
        resolution: Resolution,
        points: Vec<SamplePoint>,
    ) -> Result<Self, SampleError> {
        validate_layout(speed, altitude, resolution)?;
        if points.len() != resolution.cell_count() {
            return Err(SampleError::InvalidBounds(format!(
                "expected {} points for {:?}, got {}",
                resolution.cell_count(),
                resolution,
                points.len()
            )));
        }
        Ok(Self {
            speed,
            altitude,
            resolution,
            points,
        })
    }

    pub fn speed_bounds(&self) -> AxisBounds {
        self.speed
    }

    pub fn altitude_bounds(&self) -> AxisBounds {
        self.altitude
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn dims(&self) -> GridDims {
        GridDims::new(
            self.resolution.speed_segments + 1,
            self.resolution.altitude_segments + 1,
        )
    }

    pub fn speed_step(&self) -> f64 {
        self.speed.span() / self.resolution.speed_segments as f64
    }

    pub fn altitude_step(&self) -> f64 {
        self.altitude.span() / self.resolution.altitude_segments as f64
    }

    pub fn speed_at(&self, index: f64) -> f64 {
        self.speed.lower + index * self.speed_step()
    }

    pub fn altitude_at(&self, index: f64) -> f64 {
        self.altitude.lower + index * self.altitude_step()
    }

    /// Continuous (speed, altitude) index coordinate of a physical point.
    pub fn index_of(&self, speed_mps: f64, altitude_m: f64) -> (f64, f64) {
        (
            (speed_mps - self.speed.lower) / self.speed_step(),
            (altitude_m - self.altitude.lower) / self.altitude_step(),
        )
    }

    pub fn contains(&self, speed_mps: f64, altitude_m: f64) -> bool {
        self.speed.contains(speed_mps) && self.altitude.contains(altitude_m)
    }

    pub fn nearest_cell(&self, speed_mps: f64, altitude_m: f64) -> Option<Cell> {
        if !self.contains(speed_mps, altitude_m) {
            return None;
        }
        let (fx, fy) = self.index_of(speed_mps, altitude_m);
        let dims = self.dims();
        let cell = Cell::new(fx.round() as usize, fy.round() as usize);
        dims.contains(cell).then_some(cell)
    }

    pub fn get(&self, cell: Cell) -> Option<&SamplePoint> {
        let dims = self.dims();
        if !dims.contains(cell) {
            return None;
        }
        self.points.get(dims.offset(cell))
    }

    pub fn points(&self) -> &[SamplePoint] {
        &self.points
    }

    /// Bilinear blend of the four points around a continuous index coordinate.
    pub fn interpolate(&self, speed_index: f64, altitude_index: f64) -> Option<SamplePoint> {
        let dims = self.dims();
        let max_x = (dims.speed_count - 1) as f64;
        let max_y = (dims.altitude_count - 1) as f64;
        if !(0.0..=max_x).contains(&speed_index) || !(0.0..=max_y).contains(&altitude_index) {
            return None;
        }
        let x0 = speed_index.floor() as usize;
        let y0 = altitude_index.floor() as usize;
        let x1 = (x0 + 1).min(dims.speed_count - 1);
        let y1 = (y0 + 1).min(dims.altitude_count - 1);
        let dx = speed_index - x0 as f64;
        let dy = altitude_index - y0 as f64;

        let p00 = self.get(Cell::new(x0, y0))?;
        let p10 = self.get(Cell::new(x1, y0))?;
        let p01 = self.get(Cell::new(x0, y1))?;
        let p11 = self.get(Cell::new(x1, y1))?;

        let low = p00.lerp(p10, dx);
        let high = p01.lerp(p11, dx);
        Some(low.lerp(&high, dy))
    }

    pub fn interpolate_at(&self, speed_mps: f64, altitude_m: f64) -> Option<SamplePoint> {
        let (fx, fy) = self.index_of(speed_mps, altitude_m);
        self.interpolate(fx, fy)
    }

    /// Dense, speed-major values of one field.
    pub fn field(&self, field: EnvelopeField) -> Vec<f64> {
        self.points.iter().map(|point| field.value(point)).collect()
    }
}

impl Index<Cell> for EnvelopeGrid {
    type Output = SamplePoint;

    fn index(&self, cell: Cell) -> &SamplePoint {
        &self.points[self.dims().offset(cell)]
    }
}

pub(crate) fn validate_layout(
    speed: AxisBounds,
    altitude: AxisBounds,
    resolution: Resolution,
) -> Result<(), SampleError> {
    if !resolution.is_valid() {
        return Err(SampleError::InvalidResolution(resolution));
    }
    if !speed.is_valid() {
        return Err(SampleError::InvalidBounds(format!(
            "speed bounds {:?} are empty or non-finite",
            speed
        )));
    }
    if !altitude.is_valid() {
        return Err(SampleError::InvalidBounds(format!(
            "altitude bounds {:?} are empty or non-finite",
            altitude
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn flat_point(speed_mps: f64, altitude_m: f64, excess: f64) -> SamplePoint {
        SamplePoint {
            altitude_m,
            speed_mps,
            mach: speed_mps / 340.0,
            dynamic_pressure_pa: 1_000.0,
            aoa_level_rad: 0.0,
            aoa_max_lift_rad: 0.3,
            lift_n: 1_000.0,
            drag_n: 100.0,
            thrust_available_n: 100.0 + excess,
            thrust_required_n: 100.0,
            pitch_trim: 0.0,
            fuel_burn_kg_s: 1.0,
            lift_slope: 5.0,
            mass_kg: 100.0,
            reference_area_m2: 1.0,
        }
    }

    fn linear_grid() -> EnvelopeGrid {
        let speed = AxisBounds::new(100.0, 200.0);
        let altitude = AxisBounds::new(0.0, 1_000.0);
        let resolution = Resolution::new(2, 4);
        let mut points = Vec::new();
        for i in 0..3 {
            for j in 0..5 {
                let v = 100.0 + 50.0 * i as f64;
                let h = 250.0 * j as f64;
                points.push(flat_point(v, h, v + h));
            }
        }
        EnvelopeGrid::new(speed, altitude, resolution, points).unwrap()
    }

    #[test]
    fn steps_follow_bounds_and_segments() {
        let grid = linear_grid();
        assert_eq!(grid.dims(), GridDims::new(3, 5));
        assert_eq!(grid.speed_step(), 50.0);
        assert_eq!(grid.altitude_step(), 250.0);
        assert_eq!(grid.speed_at(2.0), 200.0);
        assert_eq!(grid[Cell::new(1, 2)].altitude_m, 500.0);
    }

    #[test]
    fn rejects_inconsistent_point_count() {
        let result = EnvelopeGrid::new(
            AxisBounds::new(0.0, 1.0),
            AxisBounds::new(0.0, 1.0),
            Resolution::new(1, 1),
            vec![flat_point(0.0, 0.0, 0.0)],
        );
        assert!(matches!(result, Err(SampleError::InvalidBounds(_))));
    }

    #[test]
    fn interpolation_is_exact_for_linear_fields() {
        let grid = linear_grid();
        let point = grid.interpolate_at(130.0, 600.0).unwrap();
        assert!((point.excess_thrust() - 730.0).abs() < 1e-9);
        assert!(grid.interpolate_at(250.0, 600.0).is_none());
        assert!(grid.interpolate(2.0, 4.0).is_some());
    }

    #[test]
    fn neighbors_are_clipped_at_edges() {
        let dims = GridDims::new(3, 3);
        assert_eq!(dims.neighbors(Cell::new(0, 0)).count(), 3);
        assert_eq!(dims.neighbors(Cell::new(1, 0)).count(), 5);
        assert_eq!(dims.neighbors(Cell::new(1, 1)).count(), 8);
        assert_eq!(dims.cell_at(dims.offset(Cell::new(2, 1))), Cell::new(2, 1));
    }

    #[test]
    fn field_extraction_is_speed_major() {
        let grid = linear_grid();
        let values = grid.field(EnvelopeField::ExcessThrust);
        assert_eq!(values.len(), 15);
        assert_eq!(values[1], 100.0 + 250.0);
        assert_eq!(values[5], 150.0);
    }
}
