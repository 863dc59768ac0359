//! The worker side of word-count-lite: asks the coordinator for a play,
//! downloads and counts it, and reports the counts back.

pub mod core;
pub mod fetch;

pub use crate::core::{ClientConfig, ClientError, CoordinatorClient, RunSummary, StopReason, Worker};
pub use crate::fetch::{count_words, Fetcher, HttpsFetcher};
