//! Catalog API module.
//!
//! This module provides:
//! - The `CatalogClient` trait the engine consumes
//! - HTTP client for the catalog REST API
//! - API response types

pub mod catalog;
pub mod client;
pub mod types;

pub use catalog::{fetch_library, CatalogClient};
pub use client::HttpCatalog;
pub use types::*;
