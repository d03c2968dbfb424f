//! Scoped checkout of per-worker model evaluators.
//!
//! A [`ModelLease`] owns one evaluator for the lifetime of a worker's share
//! of the grid. Dropping the lease hands the evaluator back through
//! [`AeroModel::release`], so the release happens on every exit path:
//! normal completion, early return on cancellation, and unwinding.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::aero::{AeroEvaluator, AeroModel, AeroState};
use crate::error::EvaluationError;

pub struct ModelPool<'m, M: AeroModel> {
    model: &'m M,
    checkouts: AtomicUsize,
    releases: AtomicUsize,
}

impl<'m, M: AeroModel> ModelPool<'m, M> {
    pub fn new(model: &'m M) -> Self {
        Self {
            model,
            checkouts: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn model(&self) -> &'m M {
        self.model
    }

    /// Acquire a private evaluator. It is released when the lease drops.
    pub fn checkout(&self) -> ModelLease<'_, 'm, M> {
        self.checkouts.fetch_add(1, Ordering::Relaxed);
        ModelLease {
            pool: self,
            evaluator: Some(self.model.clone_for_thread()),
        }
    }

    pub fn checkouts(&self) -> usize {
        self.checkouts.load(Ordering::Relaxed)
    }

    /// Leases currently checked out and not yet released.
    pub fn outstanding(&self) -> usize {
        self.checkouts
            .load(Ordering::Acquire)
            .saturating_sub(self.releases.load(Ordering::Acquire))
    }
}

pub struct ModelLease<'p, 'm, M: AeroModel> {
    pool: &'p ModelPool<'m, M>,
    evaluator: Option<M::Evaluator>,
}

impl<M: AeroModel> ModelLease<'_, '_, M> {
    pub fn evaluate(
        &mut self,
        altitude_m: f64,
        speed_mps: f64,
    ) -> Result<AeroState, EvaluationError> {
        match self.evaluator.as_mut() {
            Some(evaluator) => evaluator.evaluate(altitude_m, speed_mps),
            None => Err(EvaluationError::new(
                speed_mps,
                altitude_m,
                "model lease already released",
            )),
        }
    }
}

impl<M: AeroModel> Drop for ModelLease<'_, '_, M> {
    fn drop(&mut self) {
        if let Some(evaluator) = self.evaluator.take() {
            self.pool.model.release(evaluator);
            self.pool.releases.fetch_add(1, Ordering::Release);
        }
    }
}
