//! Concurrent memoization of evaluated sample points.
//!
//! Keys are quantized (speed, altitude) pairs, so physically close queries
//! collapse to one entry. The cache is owned by a session, never global;
//! callers clear it whenever the vehicle configuration changes.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::models::SamplePoint;

/// Quantized coordinate of a cached evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub speed: i64,
    pub altitude: i64,
}

/// Rounding granularity used to build [`CacheKey`]s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantization {
    pub speed_step_mps: f64,
    pub altitude_step_m: f64,
}

impl Default for Quantization {
    fn default() -> Self {
        Self {
            speed_step_mps: 1.0,
            altitude_step_m: 10.0,
        }
    }
}

impl Quantization {
    pub fn new(speed_step_mps: f64, altitude_step_m: f64) -> Self {
        Self {
            speed_step_mps: sanitize_step(speed_step_mps),
            altitude_step_m: sanitize_step(altitude_step_m),
        }
    }

    pub fn key(&self, speed_mps: f64, altitude_m: f64) -> CacheKey {
        CacheKey {
            speed: (speed_mps / self.speed_step_mps).round() as i64,
            altitude: (altitude_m / self.altitude_step_m).round() as i64,
        }
    }

    /// Physical coordinate a key stands for, as (speed, altitude).
    pub fn coordinate(&self, key: CacheKey) -> (f64, f64) {
        (
            key.speed as f64 * self.speed_step_mps,
            key.altitude as f64 * self.altitude_step_m,
        )
    }
}

fn sanitize_step(step: f64) -> f64 {
    if step.is_finite() && step > 0.0 {
        step
    } else {
        1.0
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct PointCache {
    entries: DashMap<CacheKey, SamplePoint>,
    quantization: Quantization,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for PointCache {
    fn default() -> Self {
        Self::new(Quantization::default())
    }
}

impl PointCache {
    pub fn new(quantization: Quantization) -> Self {
        Self {
            entries: DashMap::new(),
            quantization,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn quantization(&self) -> Quantization {
        self.quantization
    }

    pub fn key(&self, speed_mps: f64, altitude_m: f64) -> CacheKey {
        self.quantization.key(speed_mps, altitude_m)
    }

    pub fn get(&self, key: &CacheKey) -> Option<SamplePoint> {
        self.entries.get(key).map(|entry| *entry.value())
    }

    /// Return the cached point for `key`, computing it on a miss.
    ///
    /// `compute` runs without any shard lock held. Two workers missing on the
    /// same key at the same moment both compute, and the later insert wins;
    /// both values are equal because the model is pure for fixed inputs.
    pub fn get_or_compute<E, F>(&self, key: CacheKey, compute: F) -> Result<SamplePoint, E>
    where
        F: FnOnce() -> Result<SamplePoint, E>,
    {
        if let Some(point) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(point);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let point = compute()?;
        self.entries.insert(key, point);
        Ok(point)
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
