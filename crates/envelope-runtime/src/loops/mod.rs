//! Background loops for continuous processing.

pub mod refinement_loop;
