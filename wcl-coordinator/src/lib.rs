//! The coordinator side of word-count-lite: a job tracker over a fixed set of
//! documents and the TCP server that hands those jobs to workers.

pub mod core;
pub mod jobs;

pub use crate::core::{Coordinator, CoordinatorConfig, ServerState};
pub use crate::jobs::{Aggregation, JobState, JobTracker, Progress};
