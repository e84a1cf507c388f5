//! Audible Downloader - resumable acquisition of audiobooks and podcasts.
//!
//! This library provides functionality for downloading the items of an
//! Audible library.
//!
//! # Features
//!
//! - Codec and quality selection with family fallback
//! - License negotiation with voucher reuse
//! - Resumable, optionally multi-part transfers
//! - Lazy expansion of podcasts into episodes
//! - Bounded concurrent batches with per-item retry and error policies
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use audible_downloader::{
//!     AcquisitionScheduler, Config, HttpCatalog, Library, Preferences, ResumableTransfer,
//!     SchedulerOptions, TransferOptions,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(Path::new("config.toml"))?;
//!     let catalog = Arc::new(HttpCatalog::new(&config.account, config.timeout())?);
//!     let library = Library::fetch(catalog.as_ref(), config.download.page_size).await?;
//!
//!     let transfer = ResumableTransfer::new(TransferOptions::from_config(&config))?;
//!     let scheduler =
//!         AcquisitionScheduler::new(catalog, transfer, SchedulerOptions::from_config(&config));
//!     let summary = scheduler
//!         .run(
//!             library.items().to_vec(),
//!             &Preferences::from_config(&config.download),
//!             config.download.jobs,
//!             config.error_policy(),
//!         )
//!         .await?;
//!     println!("{} succeeded", summary.succeeded);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod format;
pub mod fs;
pub mod license;
pub mod media;
pub mod output;
pub mod transfer;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use api::{CatalogClient, HttpCatalog};
pub use config::{Config, ErrorPolicy, PodcastMode};
pub use download::{
    AcquisitionScheduler, BatchSummary, JobResult, JobStatus, Library, PodcastExpander,
    SchedulerOptions, Selection,
};
pub use error::{Error, ErrorClass, Result};
pub use format::{FormatChoice, Preferences};
pub use license::{License, LicenseNegotiator};
pub use media::{AcquisitionItem, ItemKind};
pub use transfer::{ResumableTransfer, TransferOptions, TransferState};
