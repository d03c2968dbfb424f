//! Async orchestration of progressive envelope refinement.

pub mod config;
pub mod loops;
pub mod pipeline;
pub mod state;

pub use config::Config;
pub use loops::refinement_loop::{run_refinement_loop, RefinementRequest};
pub use pipeline::{
    EnvelopeSink, PipelineError, PipelineReport, PipelineStatus, PublishedEnvelope,
    ResolutionPipeline,
};
pub use state::{EnvelopeSession, PublicationRecord};
