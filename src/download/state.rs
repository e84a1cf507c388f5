//! Job results and batch statistics.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::{Error, ErrorClass};

/// Terminal status of one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    /// A retryable error persisted past the retry budget.
    FailedRetryableExhausted,
    FailedPermanent,
    /// Never attempted, or abandoned when the batch stopped.
    Skipped,
}

impl JobStatus {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            JobStatus::FailedRetryableExhausted | JobStatus::FailedPermanent
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::FailedRetryableExhausted => write!(f, "failed (retries exhausted)"),
            JobStatus::FailedPermanent => write!(f, "failed"),
            JobStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome of one work item.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub item_id: String,
    pub title: String,
    pub status: JobStatus,
    pub error_class: Option<ErrorClass>,
    pub message: Option<String>,
    pub bytes_transferred: u64,
    pub retries: u32,
    /// Path of the audio file, when one was produced or already present.
    pub output: Option<PathBuf>,
}

impl JobResult {
    pub fn succeeded(item_id: &str, title: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            title: title.to_string(),
            status: JobStatus::Succeeded,
            error_class: None,
            message: None,
            bytes_transferred: 0,
            retries: 0,
            output: None,
        }
    }

    pub fn skipped(item_id: &str, title: &str, reason: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Skipped,
            message: Some(reason.into()),
            ..Self::succeeded(item_id, title)
        }
    }

    /// Result for an item that ended with `err`.
    ///
    /// Cancellation counts as skipped; a retryable error that reached this
    /// point has exhausted its retries.
    pub fn failed(item_id: &str, title: &str, err: &Error) -> Self {
        if matches!(err, Error::Cancelled) {
            return Self::skipped(item_id, title, "cancelled");
        }

        let class = err.class();
        let status = if class == ErrorClass::Retryable {
            JobStatus::FailedRetryableExhausted
        } else {
            JobStatus::FailedPermanent
        };

        Self {
            status,
            error_class: Some(class),
            message: Some(err.to_string()),
            ..Self::succeeded(item_id, title)
        }
    }
}

/// Running counters published while a batch runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total: usize,
}

impl ProgressSnapshot {
    pub fn done(&self) -> usize {
        self.completed + self.failed + self.skipped
    }
}

/// Aggregated outcome of a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed_retryable: usize,
    pub failed_permanent: usize,
    pub skipped: usize,
    pub bytes_transferred: u64,
    pub retries: u64,
    /// Highest number of items processed at the same time.
    pub peak_concurrency: usize,
    /// One result per work item, in work-list order.
    pub results: Vec<JobResult>,
}

impl BatchSummary {
    /// Build the summary from results indexed by work-list position.
    pub fn from_results(results: Vec<JobResult>, peak_concurrency: usize) -> Self {
        let mut summary = Self {
            total: results.len(),
            peak_concurrency,
            ..Self::default()
        };

        for result in &results {
            match result.status {
                JobStatus::Succeeded => summary.succeeded += 1,
                JobStatus::FailedRetryableExhausted => summary.failed_retryable += 1,
                JobStatus::FailedPermanent => summary.failed_permanent += 1,
                JobStatus::Skipped => summary.skipped += 1,
            }
            summary.bytes_transferred += result.bytes_transferred;
            summary.retries += u64::from(result.retries);
        }

        summary.results = results;
        summary
    }

    pub fn failed(&self) -> usize {
        self.failed_retryable + self.failed_permanent
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// Results that did not succeed, in work-list order.
    pub fn unsuccessful(&self) -> impl Iterator<Item = &JobResult> {
        self.results
            .iter()
            .filter(|r| r.status != JobStatus::Succeeded)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.succeeded,
            failed: self.failed(),
            skipped: self.skipped,
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_classification() {
        let timeout = JobResult::failed("B1", "A", &Error::Timeout("chunk".into()));
        assert_eq!(timeout.status, JobStatus::FailedRetryableExhausted);
        assert_eq!(timeout.error_class, Some(ErrorClass::Retryable));

        let denied = JobResult::failed("B1", "A", &Error::NotEntitled("B1".into()));
        assert_eq!(denied.status, JobStatus::FailedPermanent);

        let full = JobResult::failed("B1", "A", &Error::DiskFull(PathBuf::from("/x")));
        assert_eq!(full.status, JobStatus::FailedPermanent);
        assert_eq!(full.error_class, Some(ErrorClass::Resource));

        let cancelled = JobResult::failed("B1", "A", &Error::Cancelled);
        assert_eq!(cancelled.status, JobStatus::Skipped);
        assert_eq!(cancelled.error_class, None);
    }

    #[test]
    fn test_summary_counts() {
        let mut ok = JobResult::succeeded("B1", "A");
        ok.bytes_transferred = 100;
        ok.retries = 2;

        let summary = BatchSummary::from_results(
            vec![
                ok,
                JobResult::failed("B2", "B", &Error::NotEntitled("B2".into())),
                JobResult::skipped("B3", "C", "batch stopped"),
            ],
            1,
        );

        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed_permanent, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.bytes_transferred, 100);
        assert_eq!(summary.retries, 2);
        assert!(summary.has_failures());

        let ids: Vec<_> = summary.unsuccessful().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["B2", "B3"]);
        assert_eq!(summary.snapshot().done(), 3);
    }
}
