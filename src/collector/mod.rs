//! Bulk collection pipeline
//!
//! Discovery and processing of ranked matches into aggregated lane matchup
//! statistics, with checkpoint/resume for multi-hour runs.

pub mod checkpoint;
pub mod job;
pub mod patch;

pub use checkpoint::{CollectionCheckpoint, JobParams, JobPhase};
pub use job::{CollectionJob, JobOutcome, JobSettings};
