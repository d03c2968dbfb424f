//! Data-parallel grid sampling over a bounded rayon worker pool.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use tokio_util::sync::CancellationToken;

use crate::aero::AeroModel;
use crate::cache::{CacheKey, PointCache};
use crate::error::{CellFault, EvaluationError, SampleError};
use crate::grid::{validate_layout, EnvelopeGrid};
use crate::models::{AxisBounds, Cell, Resolution, SamplePoint};
use crate::pool::{ModelLease, ModelPool};
use crate::progress::ProgressTracker;

/// Build the bounded pool that runs per-cell work.
pub fn build_worker_pool(threads: usize) -> Result<ThreadPool, ThreadPoolBuildError> {
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|idx| format!("envelope-sampler-{}", idx))
        .build()
}

enum CellError {
    Cancelled,
    Fault(CellFault),
}

/// Fills grids of [`SamplePoint`]s, memoizing evaluations in a shared cache.
#[derive(Clone)]
pub struct GridSampler {
    cache: Arc<PointCache>,
    workers: Option<Arc<ThreadPool>>,
}

impl GridSampler {
    /// Sampler running on rayon's global pool.
    pub fn new(cache: Arc<PointCache>) -> Self {
        Self {
            cache,
            workers: None,
        }
    }

    pub fn with_workers(mut self, workers: Arc<ThreadPool>) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn cache(&self) -> &Arc<PointCache> {
        &self.cache
    }

    /// Evaluate every cell of `[0, speed_segments] x [0, altitude_segments]`.
    ///
    /// Each rayon job checks out one model evaluator for its share of cells
    /// and releases it when the share ends. Faults from individual cells are
    /// collected; if any occurred, each is logged and the whole pass fails
    /// with [`SampleError::Faults`]. Cancellation is checked before every
    /// cell and turns the pass into [`SampleError::Cancelled`].
    pub fn sample<M: AeroModel>(
        &self,
        model: &M,
        speed: AxisBounds,
        altitude: AxisBounds,
        resolution: Resolution,
        cancel: &CancellationToken,
        progress: Option<&ProgressTracker>,
    ) -> Result<EnvelopeGrid, SampleError> {
        validate_layout(speed, altitude, resolution)?;
        if cancel.is_cancelled() {
            return Err(SampleError::Cancelled);
        }

        let started = Instant::now();
        let altitude_count = resolution.altitude_segments + 1;
        let total = resolution.cell_count();
        let speed_step = speed.span() / resolution.speed_segments as f64;
        let altitude_step = altitude.span() / resolution.altitude_segments as f64;
        let mass_kg = model.mass_kg();
        let reference_area_m2 = model.reference_area_m2();
        let pool = ModelPool::new(model);
        let cache = self.cache.as_ref();

        let run = || -> Vec<Result<SamplePoint, CellError>> {
            (0..total)
                .into_par_iter()
                .map_init(
                    || pool.checkout(),
                    |lease, offset| {
                        if cancel.is_cancelled() {
                            return Err(CellError::Cancelled);
                        }
                        let cell = Cell::new(offset / altitude_count, offset % altitude_count);
                        let speed_mps = speed.lower + cell.speed as f64 * speed_step;
                        let altitude_m = altitude.lower + cell.altitude as f64 * altitude_step;
                        let key = cache.key(speed_mps, altitude_m);
                        let result = cache.get_or_compute(key, || {
                            evaluate_key(&pool, lease, cache, key, mass_kg, reference_area_m2)
                        });
                        if let Some(progress) = progress {
                            progress.advance(1);
                        }
                        result.map_err(|error| CellError::Fault(CellFault { cell, error }))
                    },
                )
                .collect()
        };

        let outcomes = match &self.workers {
            Some(workers) => workers.install(run),
            None => run(),
        };
        debug_assert_eq!(pool.outstanding(), 0);

        if cancel.is_cancelled() {
            tracing::info!(?resolution, "Sampling cancelled");
            return Err(SampleError::Cancelled);
        }

        let mut points = Vec::with_capacity(total);
        let mut faults = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(point) => points.push(point),
                Err(CellError::Fault(fault)) => faults.push(fault),
                Err(CellError::Cancelled) => return Err(SampleError::Cancelled),
            }
        }

        if !faults.is_empty() {
            for fault in &faults {
                tracing::error!(
                    speed_index = fault.cell.speed,
                    altitude_index = fault.cell.altitude,
                    "Cell evaluation failed: {}",
                    fault.error
                );
            }
            return Err(SampleError::Faults {
                count: faults.len(),
                faults,
            });
        }

        let stats = cache.stats();
        tracing::debug!(
            ?resolution,
            cells = total,
            evaluators = pool.checkouts(),
            cache_entries = stats.entries,
            cache_hits = stats.hits,
            cache_misses = stats.misses,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sampling pass complete"
        );

        EnvelopeGrid::new(speed, altitude, resolution, points)
    }
}

/// Evaluate the model at the coordinate a cache key stands for, so a point
/// is identical no matter which query first populated its key.
fn evaluate_key<'p, 'm, M: AeroModel>(
    pool: &'p ModelPool<'m, M>,
    lease: &mut ModelLease<'p, 'm, M>,
    cache: &PointCache,
    key: CacheKey,
    mass_kg: f64,
    reference_area_m2: f64,
) -> Result<SamplePoint, EvaluationError> {
    let (speed_mps, altitude_m) = cache.quantization().coordinate(key);
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| lease.evaluate(altitude_m, speed_mps)));
    let state = match attempt {
        Ok(result) => result?,
        Err(payload) => {
            // The evaluator's internal state is unknown after a panic.
            *lease = pool.checkout();
            return Err(EvaluationError::new(
                speed_mps,
                altitude_m,
                format!("model panicked: {}", panic_message(payload.as_ref())),
            ));
        }
    };

    let forces = [
        state.lift_n,
        state.drag_n,
        state.thrust_available_n,
        state.thrust_required_n,
        state.fuel_burn_kg_s,
    ];
    if forces.iter().any(|value| !value.is_finite()) {
        return Err(EvaluationError::new(
            speed_mps,
            altitude_m,
            "model returned non-finite forces",
        ));
    }

    Ok(SamplePoint::from_state(
        speed_mps,
        altitude_m,
        &state,
        mass_kg,
        reference_area_m2,
    ))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
