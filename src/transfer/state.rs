//! Transfer state tracking.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::transfer::resume::ResumeState;

/// Lifecycle of a transfer.
///
/// `Pending -> InProgress -> {Complete | Paused}`, `Paused -> InProgress` on
/// resume. A failed attempt leaves the partial file behind, so from the
/// outside it is `Paused` unless its content was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    InProgress,
    Paused,
    Complete,
    Failed,
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Pending => write!(f, "pending"),
            TransferStatus::InProgress => write!(f, "in progress"),
            TransferStatus::Paused => write!(f, "paused"),
            TransferStatus::Complete => write!(f, "complete"),
            TransferStatus::Failed => write!(f, "failed"),
        }
    }
}

/// State of one target file.
#[derive(Debug, Clone)]
pub struct TransferState {
    pub target: PathBuf,
    pub expected_size: Option<u64>,
    /// Bytes committed to disk so far, across all parts.
    pub bytes_written: u64,
    /// Bytes fetched during this invocation.
    pub bytes_transferred: u64,
    pub resume: ResumeState,
    pub status: TransferStatus,
}

impl TransferState {
    pub fn new(target: PathBuf, resume: ResumeState) -> Self {
        let status = if resume.committed() > 0 {
            TransferStatus::Paused
        } else {
            TransferStatus::Pending
        };

        Self {
            target,
            expected_size: resume.expected_size,
            bytes_written: resume.committed(),
            bytes_transferred: 0,
            resume,
            status,
        }
    }

    /// State for a target that is already complete on disk.
    pub fn already_complete(target: PathBuf, format_key: &str, size: u64) -> Self {
        let mut resume = ResumeState::single(format_key, Some(size));
        resume.parts[0].committed = size;
        resume.parts[0].complete = true;

        Self {
            target,
            expected_size: Some(size),
            bytes_written: size,
            bytes_transferred: 0,
            resume,
            status: TransferStatus::Complete,
        }
    }

    /// Record bytes committed to part `index`.
    pub fn commit(&mut self, index: usize, len: u64) {
        if let Some(part) = self.resume.parts.get_mut(index) {
            part.committed += len;
        }
        self.bytes_written += len;
        self.bytes_transferred += len;
    }

    /// Replace the resume record, e.g. after restarting from zero.
    pub fn reset(&mut self, resume: ResumeState) {
        self.bytes_written = resume.committed();
        self.resume = resume;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_status() {
        let fresh = TransferState::new(PathBuf::from("a"), ResumeState::single("k", Some(10)));
        assert_eq!(fresh.status, TransferStatus::Pending);

        let mut partial = ResumeState::single("k", Some(10));
        partial.parts[0].committed = 4;
        let resumed = TransferState::new(PathBuf::from("a"), partial);
        assert_eq!(resumed.status, TransferStatus::Paused);
        assert_eq!(resumed.bytes_written, 4);
    }

    #[test]
    fn test_commit() {
        let mut state = TransferState::new(PathBuf::from("a"), ResumeState::plan("k", Some(20), 10, 10));
        state.commit(1, 5);
        assert_eq!(state.resume.parts[1].committed, 5);
        assert_eq!(state.bytes_written, 5);
        assert_eq!(state.bytes_transferred, 5);
    }

    #[test]
    fn test_already_complete() {
        let state = TransferState::already_complete(PathBuf::from("a"), "k", 42);
        assert_eq!(state.status, TransferStatus::Complete);
        assert!(state.resume.is_complete());
        assert_eq!(state.bytes_transferred, 0);
    }
}
