//! Configuration validation logic.

use std::sync::OnceLock;

use crate::config::loader::Config;
use crate::error::{Error, Result};
use regex::Regex;

/// Cover sizes the catalog serves.
pub const COVER_SIZES: [u32; 10] = [252, 315, 360, 408, 500, 558, 570, 882, 900, 1215];

/// Allowed range for library page sizes.
const PAGE_SIZE_RANGE: std::ops::RangeInclusive<u32> = 10..=1000;

/// Validate the entire configuration.
///
/// Runs before any scheduling so conflicting options abort the run without
/// side effects.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_token(&config.account.access_token)?;
    validate_api_base(&config.account.api_base)?;
    validate_download_options(config)?;

    Ok(())
}

/// Validate the access token.
pub fn validate_token(token: &str) -> Result<()> {
    if token.trim().is_empty() {
        return Err(Error::MissingConfig("access_token".to_string()));
    }

    let token_lower = token.to_lowercase();
    if token_lower.contains("replaceme") || token_lower.contains("your_token") {
        return Err(Error::ConfigValidation {
            field: "access_token".to_string(),
            message: "Token appears to be a placeholder.".to_string(),
        });
    }

    Ok(())
}

/// Validate the catalog base URL.
pub fn validate_api_base(api_base: &str) -> Result<()> {
    let url = url::Url::parse(api_base).map_err(|e| Error::ConfigValidation {
        field: "api_base".to_string(),
        message: format!("Invalid URL '{}': {}", api_base, e),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::ConfigValidation {
            field: "api_base".to_string(),
            message: format!("Unsupported scheme '{}'", url.scheme()),
        });
    }

    Ok(())
}

/// Validate download options.
pub fn validate_download_options(config: &Config) -> Result<()> {
    let download = &config.download;

    if download.resolve_podcasts && download.ignore_podcasts {
        return Err(Error::Config(
            "resolve_podcasts and ignore_podcasts are mutually exclusive".to_string(),
        ));
    }

    if download.jobs == 0 {
        return Err(Error::ConfigValidation {
            field: "jobs".to_string(),
            message: "At least one simultaneous job is required".to_string(),
        });
    }

    if !PAGE_SIZE_RANGE.contains(&download.page_size) {
        return Err(Error::ConfigValidation {
            field: "page_size".to_string(),
            message: format!(
                "Page size must be between {} and {} (got {})",
                PAGE_SIZE_RANGE.start(),
                PAGE_SIZE_RANGE.end(),
                download.page_size
            ),
        });
    }

    if download.cover && !COVER_SIZES.contains(&download.cover_size) {
        return Err(Error::ConfigValidation {
            field: "cover_size".to_string(),
            message: format!("Unsupported cover size {}", download.cover_size),
        });
    }

    if download.part_size_mb == 0 {
        return Err(Error::ConfigValidation {
            field: "part_size_mb".to_string(),
            message: "Part size must be greater than zero".to_string(),
        });
    }

    if !(download.audio
        || download.annotations
        || download.chapters
        || download.cover
        || download.pdf)
    {
        return Err(Error::Config(
            "Nothing to download: enable audio, cover, pdf, chapters or annotations".to_string(),
        ));
    }

    Ok(())
}

/// Validate an item identifier (ASIN): ten uppercase letters or digits.
pub fn validate_item_id(id: &str) -> Result<()> {
    if item_id_pattern().is_match(id) {
        Ok(())
    } else {
        Err(Error::ConfigValidation {
            field: "asin".to_string(),
            message: format!("'{}' is not a valid item identifier", id),
        })
    }
}

fn item_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]{10}$").expect("valid regex"))
}
