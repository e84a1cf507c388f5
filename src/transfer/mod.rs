//! Resumable asset transfers.

pub mod content;
pub mod engine;
pub mod resume;
pub mod state;

pub use content::AssetKind;
pub use engine::{ResumableTransfer, TransferOptions, TransferRequest};
pub use resume::{PartRecord, ResumeState};
pub use state::{TransferState, TransferStatus};
