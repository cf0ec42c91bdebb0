//! The optimizer pass pipeline and the analyses (scheduling, liveness) the
//! backend consumes once the pipeline has run.

pub mod liveness;
pub mod passes;
pub mod schedule;
