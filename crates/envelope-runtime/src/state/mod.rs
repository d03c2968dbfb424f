//! Session state shared between the pipeline and its consumers.

mod store;

pub use store::{EnvelopeSession, PublicationRecord};
