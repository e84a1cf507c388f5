//! Acquisition of library items.
//!
//! This module provides:
//! - Library listing and work selection
//! - Expansion of podcasts into episodes
//! - Retry with backoff for failing steps
//! - The batch scheduler and its job results

pub mod expand;
pub mod library;
pub mod retry;
pub mod scheduler;
pub mod state;

pub use expand::PodcastExpander;
pub use library::{title_accuracy, Library, Selection, TITLE_MATCH_THRESHOLD};
pub use retry::RetryPolicy;
pub use scheduler::{AcquisitionScheduler, AssetOptions, SchedulerOptions};
pub use state::{BatchSummary, JobResult, JobStatus, ProgressSnapshot};
