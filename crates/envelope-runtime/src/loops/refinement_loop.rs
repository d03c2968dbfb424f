//! Background refinement loop.
//!
//! Receives refinement requests and (re)runs the session's progressive
//! pipeline. A new request supersedes the run in flight: it is cancelled
//! and awaited before the next run starts, so publications from two runs
//! never interleave.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use envelope_core::{AeroModel, EnvelopeConfig};

use crate::pipeline::{PipelineError, PipelineReport};
use crate::state::EnvelopeSession;

pub enum RefinementRequest<M> {
    /// Re-run with the current vehicle and configuration
    Refine,
    Reconfigure(EnvelopeConfig),
    ReplaceModel(M),
}

type RunHandle = JoinHandle<Result<PipelineReport, PipelineError>>;

/// Start the refinement loop. Returns once the request channel closes and
/// the last run has finished.
pub async fn run_refinement_loop<M>(
    session: Arc<EnvelopeSession<M>>,
    mut requests: mpsc::Receiver<RefinementRequest<M>>,
) where
    M: AeroModel + 'static,
{
    let mut running: Option<RunHandle> = None;

    while let Some(request) = requests.recv().await {
        // The previous run holds the vehicle and cache it started with; let it
        // wind down before the session changes under it.
        session.cancel();
        if let Some(previous) = running.take() {
            settle(previous).await;
        }

        match request {
            RefinementRequest::Refine => {
                tracing::debug!("Refinement requested");
            }
            RefinementRequest::Reconfigure(config) => {
                tracing::info!(levels = config.resolutions.len(), "Envelope reconfigured");
                session.reconfigure(config);
            }
            RefinementRequest::ReplaceModel(model) => {
                session.replace_model(model);
            }
        }

        let session = Arc::clone(&session);
        running = Some(tokio::spawn(async move { session.refine().await }));
    }

    if let Some(last) = running.take() {
        settle(last).await;
    }
    tracing::info!("Refinement loop stopped");
}

async fn settle(handle: RunHandle) {
    match handle.await {
        Ok(Ok(report)) => {
            tracing::info!(
                levels = report.levels_published,
                elapsed_ms = report.elapsed_ms,
                "Envelope refinement complete"
            );
        }
        Ok(Err(e)) if e.is_cancelled() => {
            tracing::info!("Envelope refinement superseded");
        }
        Ok(Err(e)) => {
            tracing::error!("Envelope refinement failed: {}", e);
        }
        Err(e) => {
            tracing::error!("Envelope refinement task panicked: {}", e);
        }
    }
}
