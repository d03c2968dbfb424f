//! Progressive multi-resolution envelope pipeline.
//!
//! Each level of the schedule moves through named stages:
//! `Sampling -> Solving -> Publishing -> Published`. Level N+1 starts
//! sampling only after level N has been handed to the sink, so a coarser
//! grid can never overwrite a finer one. Cancellation stops the sequence
//! at the next check without publishing; a failed level stops the sequence
//! but leaves earlier publications in place.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task;
use tokio_util::sync::CancellationToken;

use envelope_core::{
    solve_ascent, AeroModel, AscentSolution, CacheStats, EnvelopeConfig, EnvelopeGrid,
    EnvelopeSummary, GridSampler, ProgressSnapshot, ProgressTracker, Resolution, SampleError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PipelineStatus {
    Idle,
    Sampling { level: usize, resolution: Resolution },
    Solving { level: usize },
    Publishing { level: usize },
    Published { level: usize },
    Completed { levels: usize },
    Cancelled { level: usize },
    Failed { level: usize, reason: String },
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Completed { .. }
                | PipelineStatus::Cancelled { .. }
                | PipelineStatus::Failed { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("resolution schedule is empty")]
    EmptySchedule,
    #[error("pipeline cancelled at level {level}")]
    Cancelled { level: usize },
    #[error("level {level} ({resolution:?}) sampling failed: {source}")]
    Sampling {
        level: usize,
        resolution: Resolution,
        #[source]
        source: SampleError,
    },
    #[error("worker task failed: {0}")]
    Worker(String),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled { .. })
    }
}

/// A fully computed level handed to consumers. Never mutated once built.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedEnvelope {
    pub level: usize,
    pub resolution: Resolution,
    pub grid: EnvelopeGrid,
    pub summary: EnvelopeSummary,
    pub ascent: Option<AscentSolution>,
    /// Why the ascent solve failed, when it did; the grid is still valid
    pub ascent_error: Option<String>,
    pub cache: CacheStats,
    pub elapsed_ms: u64,
    pub published_at: DateTime<Utc>,
}

/// Downstream consumer of published levels.
pub trait EnvelopeSink: Send + Sync {
    fn publish(&self, envelope: Arc<PublishedEnvelope>);
}

impl<F> EnvelopeSink for F
where
    F: Fn(Arc<PublishedEnvelope>) + Send + Sync,
{
    fn publish(&self, envelope: Arc<PublishedEnvelope>) {
        self(envelope)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub levels_published: usize,
    pub cache: CacheStats,
    pub elapsed_ms: u64,
}

pub struct ResolutionPipeline<M: AeroModel + 'static> {
    model: Arc<M>,
    sampler: GridSampler,
    config: EnvelopeConfig,
    status: watch::Sender<PipelineStatus>,
    tracker: Mutex<Option<Arc<ProgressTracker>>>,
}

impl<M: AeroModel + 'static> ResolutionPipeline<M> {
    pub fn new(model: Arc<M>, sampler: GridSampler, config: EnvelopeConfig) -> Self {
        let (status, _) = watch::channel(PipelineStatus::Idle);
        Self {
            model,
            sampler,
            config,
            status,
            tracker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> PipelineStatus {
        self.status.borrow().clone()
    }

    /// Cells completed across the whole schedule of the current run.
    pub fn progress(&self) -> Option<ProgressSnapshot> {
        self.tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|tracker| tracker.snapshot())
    }

    fn set_status(&self, status: PipelineStatus) {
        self.status.send_replace(status);
    }

    fn cancelled(&self, level: usize) -> PipelineError {
        tracing::info!(level, "Envelope pipeline cancelled");
        self.set_status(PipelineStatus::Cancelled { level });
        PipelineError::Cancelled { level }
    }

    fn failed(&self, level: usize, error: PipelineError) -> PipelineError {
        tracing::error!(level, "Envelope pipeline failed: {}", error);
        self.set_status(PipelineStatus::Failed {
            level,
            reason: error.to_string(),
        });
        error
    }

    /// Run every level of the schedule, publishing each to `sink` before
    /// the next begins.
    pub async fn run<S>(
        &self,
        sink: &S,
        cancel: CancellationToken,
    ) -> Result<PipelineReport, PipelineError>
    where
        S: EnvelopeSink + ?Sized,
    {
        let schedule = self.config.resolutions.clone();
        if schedule.is_empty() {
            self.set_status(PipelineStatus::Failed {
                level: 0,
                reason: PipelineError::EmptySchedule.to_string(),
            });
            return Err(PipelineError::EmptySchedule);
        }

        let started = Instant::now();
        let total_cells: usize = schedule.iter().map(|r| r.cell_count()).sum();
        let tracker = ProgressTracker::new(total_cells as u64, cancel.clone());
        *self.tracker.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&tracker));

        let mut published = 0;
        for (level, resolution) in schedule.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(self.cancelled(level));
            }

            let level_started = Instant::now();
            self.set_status(PipelineStatus::Sampling { level, resolution });
            tracing::info!(level, ?resolution, "Sampling envelope level");

            let level_tracker = tracker.child(resolution.cell_count() as u64);
            let sampled = {
                let model = Arc::clone(&self.model);
                let sampler = self.sampler.clone();
                let (speed, altitude) = (self.config.speed, self.config.altitude);
                let progress = Arc::clone(&level_tracker);
                task::spawn_blocking(move || {
                    sampler.sample(
                        model.as_ref(),
                        speed,
                        altitude,
                        resolution,
                        progress.token(),
                        Some(&progress),
                    )
                })
                .await
                .map_err(|e| self.failed(level, PipelineError::Worker(format!("sampling task: {}", e))))?
            };

            let grid = match sampled {
                Ok(grid) => grid,
                Err(SampleError::Cancelled) => return Err(self.cancelled(level)),
                Err(source) => {
                    return Err(self.failed(
                        level,
                        PipelineError::Sampling {
                            level,
                            resolution,
                            source,
                        },
                    ))
                }
            };

            self.set_status(PipelineStatus::Solving { level });
            let (grid, ascent) = {
                let options = self.config.ascent_options();
                let token = cancel.clone();
                task::spawn_blocking(move || {
                    let ascent = solve_ascent(&grid, &options, &token);
                    (grid, ascent)
                })
                .await
                .map_err(|e| self.failed(level, PipelineError::Worker(format!("solver task: {}", e))))?
            };

            let (ascent, ascent_error) = match ascent {
                Ok(solution) => (Some(solution), None),
                Err(error) if error.is_cancelled() => return Err(self.cancelled(level)),
                Err(error) => {
                    tracing::warn!(level, "Ascent solve failed, publishing grid without paths: {}", error);
                    (None, Some(error.to_string()))
                }
            };

            if cancel.is_cancelled() {
                return Err(self.cancelled(level));
            }

            self.set_status(PipelineStatus::Publishing { level });
            let summary = EnvelopeSummary::from_grid(&grid);
            let envelope = Arc::new(PublishedEnvelope {
                level,
                resolution,
                grid,
                summary,
                ascent,
                ascent_error,
                cache: self.sampler.cache().stats(),
                elapsed_ms: level_started.elapsed().as_millis() as u64,
                published_at: Utc::now(),
            });
            sink.publish(envelope);
            published += 1;
            self.set_status(PipelineStatus::Published { level });
            tracing::info!(
                level,
                ?resolution,
                elapsed_ms = level_started.elapsed().as_millis() as u64,
                "Published envelope level"
            );
        }

        self.set_status(PipelineStatus::Completed { levels: published });
        let report = PipelineReport {
            levels_published: published,
            cache: self.sampler.cache().stats(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        tracing::debug!(?report, "Envelope pipeline complete");
        Ok(report)
    }
}
