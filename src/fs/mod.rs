//! Filesystem module.
//!
//! Provides:
//! - Output, staging and sidecar path layout
//! - Filename generation and sanitization

pub mod naming;
pub mod paths;

pub use naming::{
    annotations_filename, audio_extension, audio_filename, chapters_filename, cover_filename,
    pdf_filename, sanitize_filename, sanitize_path_component, voucher_filename,
};
pub use paths::{ensure_dir, item_directory, resume_path, staging_path};
