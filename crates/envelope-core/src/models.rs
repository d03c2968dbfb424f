//! Core data models for the flight envelope.

use serde::{Deserialize, Serialize};

use crate::aero::AeroState;

/// Standard gravity, m/s^2.
pub const G0: f64 = 9.806_65;

/// One evaluated grid cell.
///
/// Values are immutable once built. Derived quantities are computed on
/// demand from the stored fields and never cached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub altitude_m: f64,
    pub speed_mps: f64,
    pub mach: f64,
    pub dynamic_pressure_pa: f64,
    /// Trimmed angle of attack for level flight (radians)
    pub aoa_level_rad: f64,
    /// Angle of attack at maximum lift (radians)
    pub aoa_max_lift_rad: f64,
    pub lift_n: f64,
    pub drag_n: f64,
    pub thrust_available_n: f64,
    pub thrust_required_n: f64,
    /// Fraction of pitch control authority used to hold trim
    pub pitch_trim: f64,
    pub fuel_burn_kg_s: f64,
    /// dCL/dalpha at trim (per radian)
    pub lift_slope: f64,
    pub mass_kg: f64,
    pub reference_area_m2: f64,
}

impl SamplePoint {
    /// Build a point from a raw model evaluation.
    pub fn from_state(
        speed_mps: f64,
        altitude_m: f64,
        state: &AeroState,
        mass_kg: f64,
        reference_area_m2: f64,
    ) -> Self {
        Self {
            altitude_m,
            speed_mps,
            mach: state.mach,
            dynamic_pressure_pa: state.dynamic_pressure_pa,
            aoa_level_rad: state.aoa_level_rad,
            aoa_max_lift_rad: state.aoa_max_lift_rad,
            lift_n: state.lift_n,
            drag_n: state.drag_n,
            thrust_available_n: state.thrust_available_n,
            thrust_required_n: state.thrust_required_n,
            pitch_trim: state.pitch_trim,
            fuel_burn_kg_s: state.fuel_burn_kg_s,
            lift_slope: state.lift_slope,
            mass_kg,
            reference_area_m2,
        }
    }

    pub fn excess_thrust(&self) -> f64 {
        self.thrust_available_n - self.thrust_required_n
    }

    /// Rate of climb available from excess thrust at constant speed (m/s).
    pub fn excess_specific_power(&self) -> f64 {
        if self.mass_kg <= 0.0 {
            return 0.0;
        }
        self.excess_thrust() * self.speed_mps / (self.mass_kg * G0)
    }

    pub fn energy_height(&self) -> f64 {
        self.altitude_m + self.speed_mps * self.speed_mps / (2.0 * G0)
    }

    pub fn lift_coefficient(&self) -> f64 {
        let denom = self.dynamic_pressure_pa * self.reference_area_m2;
        if denom <= 0.0 {
            return 0.0;
        }
        self.lift_n / denom
    }

    pub fn drag_coefficient(&self) -> f64 {
        let denom = self.dynamic_pressure_pa * self.reference_area_m2;
        if denom <= 0.0 {
            return 0.0;
        }
        self.drag_n / denom
    }

    pub fn lift_to_drag(&self) -> f64 {
        if self.drag_n <= 0.0 {
            return 0.0;
        }
        self.lift_n / self.drag_n
    }

    /// Distance flown per kilogram of fuel (m/kg); zero when no fuel is burned.
    pub fn specific_range(&self) -> f64 {
        if self.fuel_burn_kg_s <= 0.0 {
            return 0.0;
        }
        self.speed_mps / self.fuel_burn_kg_s
    }

    /// Level flight can be held here (non-negative, finite excess thrust).
    pub fn is_sustainable(&self) -> bool {
        let excess = self.excess_thrust();
        excess.is_finite() && excess >= 0.0
    }

    /// Component-wise linear blend, `t = 0` returns `self`.
    pub fn lerp(&self, other: &SamplePoint, t: f64) -> SamplePoint {
        let mix = |a: f64, b: f64| a + (b - a) * t;
        SamplePoint {
            altitude_m: mix(self.altitude_m, other.altitude_m),
            speed_mps: mix(self.speed_mps, other.speed_mps),
            mach: mix(self.mach, other.mach),
            dynamic_pressure_pa: mix(self.dynamic_pressure_pa, other.dynamic_pressure_pa),
            aoa_level_rad: mix(self.aoa_level_rad, other.aoa_level_rad),
            aoa_max_lift_rad: mix(self.aoa_max_lift_rad, other.aoa_max_lift_rad),
            lift_n: mix(self.lift_n, other.lift_n),
            drag_n: mix(self.drag_n, other.drag_n),
            thrust_available_n: mix(self.thrust_available_n, other.thrust_available_n),
            thrust_required_n: mix(self.thrust_required_n, other.thrust_required_n),
            pitch_trim: mix(self.pitch_trim, other.pitch_trim),
            fuel_burn_kg_s: mix(self.fuel_burn_kg_s, other.fuel_burn_kg_s),
            lift_slope: mix(self.lift_slope, other.lift_slope),
            mass_kg: mix(self.mass_kg, other.mass_kg),
            reference_area_m2: mix(self.reference_area_m2, other.reference_area_m2),
        }
    }
}

/// Grid cell index: `speed` selects the column, `altitude` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub speed: usize,
    pub altitude: usize,
}

impl Cell {
    pub const fn new(speed: usize, altitude: usize) -> Self {
        Self { speed, altitude }
    }
}

/// Closed interval along one grid axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisBounds {
    pub lower: f64,
    pub upper: f64,
}

impl AxisBounds {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn span(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn is_valid(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite() && self.upper > self.lower
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Segment counts of one resolution pass. A pass samples `segments + 1`
/// points along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub speed_segments: usize,
    pub altitude_segments: usize,
}

impl Resolution {
    pub const fn new(speed_segments: usize, altitude_segments: usize) -> Self {
        Self {
            speed_segments,
            altitude_segments,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.speed_segments > 0 && self.altitude_segments > 0
    }

    pub fn cell_count(&self) -> usize {
        (self.speed_segments + 1).saturating_mul(self.altitude_segments + 1)
    }
}

/// One recorded point of an ascent path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AscentPathPoint {
    pub speed_mps: f64,
    pub altitude_m: f64,
    /// Cost accumulated since the start of the path
    pub cost: f64,
    pub climb_rate_mps: f64,
    pub climb_angle_rad: f64,
    /// Seconds elapsed since the start of the path
    pub time_s: f64,
}

impl AscentPathPoint {
    pub fn new(
        speed_mps: f64,
        altitude_m: f64,
        cost: f64,
        climb_rate_mps: f64,
        time_s: f64,
    ) -> Self {
        Self {
            speed_mps,
            altitude_m,
            cost,
            climb_rate_mps,
            climb_angle_rad: climb_angle(climb_rate_mps, speed_mps),
            time_s,
        }
    }
}

/// A physical (speed, altitude) coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlightCondition {
    pub speed_mps: f64,
    pub altitude_m: f64,
}

impl FlightCondition {
    pub const fn new(speed_mps: f64, altitude_m: f64) -> Self {
        Self {
            speed_mps,
            altitude_m,
        }
    }
}

impl From<&SamplePoint> for FlightCondition {
    fn from(point: &SamplePoint) -> Self {
        Self::new(point.speed_mps, point.altitude_m)
    }
}

/// Flight path angle for a given vertical rate and true airspeed.
pub fn climb_angle(climb_rate_mps: f64, speed_mps: f64) -> f64 {
    if speed_mps <= 0.0 || !climb_rate_mps.is_finite() {
        return 0.0;
    }
    (climb_rate_mps / speed_mps).clamp(-1.0, 1.0).asin()
}
