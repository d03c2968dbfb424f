//! Progress, ETA and cancellation chaining for long-running passes.
//!
//! A tracker counts completed work units against a total. Child trackers
//! forward their completions to the parent and hold a child cancellation
//! token: cancelling the parent cancels every child, while cancelling a
//! child leaves the parent running.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub completed: u64,
    pub total: u64,
    pub fraction: f64,
    pub elapsed: Duration,
    /// Linear extrapolation of the remaining time, once any work completed
    pub eta: Option<Duration>,
}

#[derive(Debug)]
pub struct ProgressTracker {
    total: AtomicU64,
    completed: AtomicU64,
    started: Instant,
    token: CancellationToken,
    parent: Option<Arc<ProgressTracker>>,
}

impl ProgressTracker {
    pub fn new(total: u64, token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            total: AtomicU64::new(total),
            completed: AtomicU64::new(0),
            started: Instant::now(),
            token,
            parent: None,
        })
    }

    /// Nested tracker for a sub-task of `total` units.
    pub fn child(self: &Arc<Self>, total: u64) -> Arc<Self> {
        Arc::new(Self {
            total: AtomicU64::new(total),
            completed: AtomicU64::new(0),
            started: Instant::now(),
            token: self.token.child_token(),
            parent: Some(Arc::clone(self)),
        })
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn add_total(&self, units: u64) {
        self.total.fetch_add(units, Ordering::Relaxed);
    }

    pub fn advance(&self, units: u64) {
        self.completed.fetch_add(units, Ordering::Relaxed);
        if let Some(parent) = &self.parent {
            parent.advance(units);
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let total = self.total.load(Ordering::Relaxed);
        let completed = self.completed.load(Ordering::Relaxed).min(total.max(1));
        let elapsed = self.started.elapsed();
        let fraction = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64
        };
        let eta = if completed == 0 || total == 0 {
            None
        } else {
            let remaining = total.saturating_sub(completed) as f64;
            Some(elapsed.mul_f64(remaining / completed as f64))
        };
        ProgressSnapshot {
            completed,
            total,
            fraction,
            elapsed,
            eta,
        }
    }
}
