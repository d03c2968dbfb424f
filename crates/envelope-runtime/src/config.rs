//! Runtime configuration from environment.

use std::env;

use envelope_core::{AxisBounds, EnvelopeConfig, FlightCondition, Quantization, Resolution};

#[derive(Debug, Clone)]
pub struct Config {
    pub envelope: EnvelopeConfig,
    /// Threads in the sampling pool; 0 uses rayon's global pool
    pub worker_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            envelope: EnvelopeConfig::default(),
            worker_threads: default_worker_threads(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = EnvelopeConfig::default();
        let number = |key: &str, default: f64| -> f64 {
            lookup(key)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };

        let envelope = EnvelopeConfig {
            speed: AxisBounds::new(
                number("ENVELOPE_SPEED_MIN", defaults.speed.lower),
                number("ENVELOPE_SPEED_MAX", defaults.speed.upper),
            ),
            altitude: AxisBounds::new(
                number("ENVELOPE_ALTITUDE_MIN", defaults.altitude.lower),
                number("ENVELOPE_ALTITUDE_MAX", defaults.altitude.upper),
            ),
            resolutions: lookup("ENVELOPE_RESOLUTIONS")
                .and_then(|s| parse_resolutions(&s))
                .unwrap_or_else(|| defaults.resolutions.clone()),
            quantization: Quantization::new(
                number("ENVELOPE_SPEED_QUANTUM", defaults.quantization.speed_step_mps),
                number("ENVELOPE_ALTITUDE_QUANTUM", defaults.quantization.altitude_step_m),
            ),
            target: lookup("ENVELOPE_TARGET").and_then(|s| parse_condition(&s)),
            start: lookup("ENVELOPE_START").and_then(|s| parse_condition(&s)),
            ..defaults
        };

        Self {
            envelope,
            worker_threads: lookup("ENVELOPE_WORKER_THREADS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or_else(default_worker_threads),
        }
    }
}

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Parse `"16x16,48x48"` into resolutions. Any malformed entry rejects the list.
pub fn parse_resolutions(value: &str) -> Option<Vec<Resolution>> {
    let resolutions = value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (speed, altitude) = entry.split_once(['x', 'X'])?;
            let resolution = Resolution::new(speed.trim().parse().ok()?, altitude.trim().parse().ok()?);
            resolution.is_valid().then_some(resolution)
        })
        .collect::<Option<Vec<_>>>()?;
    (!resolutions.is_empty()).then_some(resolutions)
}

/// Parse `"speed,altitude"`.
pub fn parse_condition(value: &str) -> Option<FlightCondition> {
    let (speed, altitude) = value.split_once(',')?;
    let speed: f64 = speed.trim().parse().ok()?;
    let altitude: f64 = altitude.trim().parse().ok()?;
    (speed.is_finite() && altitude.is_finite()).then(|| FlightCondition::new(speed, altitude))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_resolution_lists() {
        assert_eq!(
            parse_resolutions("2x2, 4X8"),
            Some(vec![Resolution::new(2, 2), Resolution::new(4, 8)])
        );
        assert_eq!(parse_resolutions("2x2,bad"), None);
        assert_eq!(parse_resolutions("0x4"), None);
        assert_eq!(parse_resolutions(""), None);
    }

    #[test]
    fn parses_conditions() {
        assert_eq!(
            parse_condition("250, 11000"),
            Some(FlightCondition::new(250.0, 11_000.0))
        );
        assert_eq!(parse_condition("250"), None);
        assert_eq!(parse_condition("NaN,1"), None);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("ENVELOPE_RESOLUTIONS", "8x8,32x32"),
            ("ENVELOPE_SPEED_MAX", "280"),
            ("ENVELOPE_ALTITUDE_QUANTUM", "25"),
            ("ENVELOPE_TARGET", "240,9000"),
            ("ENVELOPE_WORKER_THREADS", "3"),
            ("ENVELOPE_SPEED_MIN", "not a number"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.envelope.resolutions.len(), 2);
        assert_eq!(config.envelope.speed, AxisBounds::new(50.0, 280.0));
        assert_eq!(config.envelope.quantization.altitude_step_m, 25.0);
        assert_eq!(config.envelope.target, Some(FlightCondition::new(240.0, 9_000.0)));
        assert_eq!(config.worker_threads, 3);
    }
}
