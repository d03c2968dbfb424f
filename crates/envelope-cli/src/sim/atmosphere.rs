use envelope_core::G0;

// ISA 1976 standard atmosphere, sea level to 32 km.

const R_AIR: f64 = 287.052_87; // J/(kg·K)
const GAMMA: f64 = 1.4;

const T0: f64 = 288.15;
const P0: f64 = 101_325.0;

pub const SEA_LEVEL_DENSITY: f64 = 1.225;

/// Highest altitude the layer table covers.
pub const CEILING_M: f64 = 32_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Atmosphere {
    pub density: f64,     // kg/m^3
    pub pressure: f64,    // Pa
    pub temperature: f64, // K
    pub sound_speed: f64, // m/s
}

impl Atmosphere {
    /// Density ratio to sea level.
    pub fn sigma(&self) -> f64 {
        self.density / SEA_LEVEL_DENSITY
    }
}

/// Standard atmosphere at a geometric altitude. Returns `None` above the
/// table; negative altitudes clamp to sea level.
pub fn isa(altitude_m: f64) -> Option<Atmosphere> {
    if !altitude_m.is_finite() || altitude_m > CEILING_M {
        return None;
    }
    let h = altitude_m.max(0.0);

    let (temperature, pressure) = if h < 11_000.0 {
        gradient_layer(h, 0.0, T0, -0.0065, P0)
    } else if h < 20_000.0 {
        isothermal_layer(h, 11_000.0, 216.65, 22_632.1)
    } else {
        gradient_layer(h, 20_000.0, 216.65, 0.001, 5_474.89)
    };

    Some(Atmosphere {
        density: pressure / (R_AIR * temperature),
        pressure,
        temperature,
        sound_speed: (GAMMA * R_AIR * temperature).sqrt(),
    })
}

fn gradient_layer(h: f64, h_base: f64, t_base: f64, lapse: f64, p_base: f64) -> (f64, f64) {
    let t = t_base + lapse * (h - h_base);
    let p = p_base * (t / t_base).powf(-G0 / (lapse * R_AIR));
    (t, p)
}

fn isothermal_layer(h: f64, h_base: f64, t: f64, p_base: f64) -> (f64, f64) {
    let p = p_base * ((-G0 / (R_AIR * t)) * (h - h_base)).exp();
    (t, p)
}
