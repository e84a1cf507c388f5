//! Configuration module for the audible-downloader.
//!
//! This module handles:
//! - Loading configuration from TOML files
//! - Option enums shared with the CLI
//! - Configuration validation

pub mod loader;
pub mod modes;
pub mod validation;

pub use loader::{AccountConfig, Config, DownloadConfig};
pub use modes::{ChapterType, ErrorPolicy, FilenameMode, PodcastMode, Quality};
pub use validation::{validate_config, validate_item_id};
