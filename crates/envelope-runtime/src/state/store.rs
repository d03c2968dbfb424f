//! Per-vehicle session state.
//!
//! A session owns the point cache and the model prototype, so evaluations
//! are shared across runs of the same vehicle and dropped when the vehicle
//! changes. It also keeps the latest published envelope for consumers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use envelope_core::{AeroModel, CacheStats, EnvelopeConfig, GridSampler, PointCache, Resolution};

use crate::pipeline::{
    EnvelopeSink, PipelineError, PipelineReport, PipelineStatus, PublishedEnvelope,
    ResolutionPipeline,
};

/// Entry of the publication log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub generation: u64,
    pub level: usize,
    pub resolution: Resolution,
    pub published_at: DateTime<Utc>,
}

pub struct EnvelopeSession<M: AeroModel + 'static> {
    model: RwLock<Arc<M>>,
    config: RwLock<EnvelopeConfig>,
    cache: RwLock<Arc<PointCache>>,
    workers: Option<Arc<ThreadPool>>,
    latest: RwLock<Option<Arc<PublishedEnvelope>>>,
    publications: Mutex<Vec<PublicationRecord>>,
    active: Mutex<Option<CancellationToken>>,
    /// Bumped on every run and vehicle change; stale runs cannot publish
    generation: AtomicU64,
    status: Arc<watch::Sender<PipelineStatus>>,
}

impl<M: AeroModel + 'static> EnvelopeSession<M> {
    pub fn new(model: M, config: EnvelopeConfig) -> Self {
        let (status, _) = watch::channel(PipelineStatus::Idle);
        Self {
            model: RwLock::new(Arc::new(model)),
            cache: RwLock::new(Arc::new(PointCache::new(config.quantization))),
            config: RwLock::new(config),
            workers: None,
            latest: RwLock::new(None),
            publications: Mutex::new(Vec::new()),
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
            status: Arc::new(status),
        }
    }

    pub fn with_workers(mut self, workers: Arc<ThreadPool>) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn cache(&self) -> Arc<PointCache> {
        Arc::clone(&self.cache.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }

    pub fn model(&self) -> Arc<M> {
        Arc::clone(&self.model.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn config(&self) -> EnvelopeConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn latest(&self) -> Option<Arc<PublishedEnvelope>> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn publications(&self) -> Vec<PublicationRecord> {
        self.publications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stage updates of whichever run is current.
    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.status.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Swap the vehicle: cancels the active run and invalidates every cached
    /// evaluation and published envelope. A run still winding down keeps the
    /// old cache, so its late evaluations never reach the new vehicle's.
    pub fn replace_model(&self, model: M) {
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cancel();
        *self.model.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(model);
        let quantization = self
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .quantization;
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(PointCache::new(quantization));
        *latest = None;
        tracing::info!("Vehicle replaced, envelope cache cleared");
    }

    /// New bounds or schedule. The cache survives unless the quantization
    /// changes, since cached keys would no longer line up.
    pub fn reconfigure(&self, config: EnvelopeConfig) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cancel();
        let mut current = self.config.write().unwrap_or_else(PoisonError::into_inner);
        if current.quantization != config.quantization {
            tracing::warn!("Quantization changed, replacing envelope cache");
            *self.cache.write().unwrap_or_else(PoisonError::into_inner) =
                Arc::new(PointCache::new(config.quantization));
        }
        *current = config;
    }

    pub fn cancel(&self) {
        if let Some(token) = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }

    /// Cancel the current run, if any, and start a new token.
    fn begin_run(&self) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        (generation, token)
    }

    fn pipeline(&self) -> ResolutionPipeline<M> {
        let mut sampler = GridSampler::new(self.cache());
        if let Some(workers) = &self.workers {
            sampler = sampler.with_workers(Arc::clone(workers));
        }
        ResolutionPipeline::new(self.model(), sampler, self.config())
    }

    /// Run the progressive pipeline for the current vehicle and config,
    /// superseding any run in flight.
    pub async fn refine(&self) -> Result<PipelineReport, PipelineError> {
        let (generation, token) = self.begin_run();
        let pipeline = self.pipeline();
        let mut updates = pipeline.subscribe();
        let forward = Arc::clone(&self.status);
        let relay = tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let status = updates.borrow_and_update().clone();
                forward.send_replace(status);
            }
        });

        let sink = SessionSink {
            session: self,
            generation,
        };
        let result = pipeline.run(&sink, token).await;
        let last = pipeline.status();
        drop(pipeline);
        if let Err(e) = relay.await {
            tracing::error!("Envelope status relay task panicked: {}", e);
        }
        self.status.send_replace(last);
        result
    }

    fn accept(&self, generation: u64, envelope: Arc<PublishedEnvelope>) {
        // Held across the generation check so a vehicle swap cannot land between.
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        if generation != self.generation() {
            tracing::debug!(
                level = envelope.level,
                generation,
                "Dropping publication from a superseded run"
            );
            return;
        }
        self.publications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PublicationRecord {
                generation,
                level: envelope.level,
                resolution: envelope.resolution,
                published_at: envelope.published_at,
            });
        *latest = Some(envelope);
    }
}

struct SessionSink<'a, M: AeroModel + 'static> {
    session: &'a EnvelopeSession<M>,
    generation: u64,
}

impl<M: AeroModel + 'static> EnvelopeSink for SessionSink<'_, M> {
    fn publish(&self, envelope: Arc<PublishedEnvelope>) {
        self.session.accept(self.generation, envelope);
    }
}
