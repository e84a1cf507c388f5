//! Error types for the audible-downloader application.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    // Catalog errors
    #[error("API error: {0}")]
    Api(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    // Selection and licensing errors
    #[error("No compatible format for {item}: {reason}")]
    NoCompatibleFormat { item: String, reason: String },

    #[error("{0} is not downloadable with this account")]
    NotEntitled(String),

    #[error("{item} is not published yet (available {available_at})")]
    NotYetPublished { item: String, available_at: String },

    #[error("License denied for {item}: {message}")]
    LicenseDenied { item: String, message: String },

    #[error("Invalid license for {item}: {reason}")]
    InvalidLicense { item: String, reason: String },

    // Transfer errors
    #[error("Unexpected content from {url}: {reason}")]
    UnexpectedContent { url: String, reason: String },

    #[error("Too many redirects ({hops}) while fetching {url}")]
    TooManyRedirects { url: String, hops: usize },

    #[error("Size mismatch for '{}': expected {expected} bytes, got {actual} bytes", path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Timed out during {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Transfer cancelled")]
    Cancelled,

    // Resource errors
    #[error("Disk full while writing '{}'", .0.display())]
    DiskFull(PathBuf),

    #[error("Permission denied for '{}'", .0.display())]
    PermissionDenied(PathBuf),

    #[error("Invalid filename (path traversal attempt): {0}")]
    InvalidFilename(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // URL parsing errors
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// How an error affects the item (and the batch) it was raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Transient; the failing step may be attempted again.
    Retryable,
    /// Never retried; terminates the item.
    Permanent,
    /// Conflicting or invalid options; aborts the run before scheduling.
    Configuration,
    /// Local resource exhausted or inaccessible (disk full, permissions).
    Resource,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Retryable => write!(f, "retryable"),
            ErrorClass::Permanent => write!(f, "permanent"),
            ErrorClass::Configuration => write!(f, "configuration"),
            ErrorClass::Resource => write!(f, "resource"),
        }
    }
}

impl Error {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Config(_) | Error::ConfigValidation { .. } | Error::MissingConfig(_) => {
                ErrorClass::Configuration
            }

            Error::RateLimited(_)
            | Error::InvalidLicense { .. }
            | Error::Timeout(_)
            | Error::Connection(_) => ErrorClass::Retryable,

            Error::HttpStatus { status, .. } => {
                if *status == 408 || *status == 429 || *status >= 500 {
                    ErrorClass::Retryable
                } else {
                    ErrorClass::Permanent
                }
            }

            Error::Http(e) => match e.status() {
                Some(status) => {
                    if status.is_server_error() || status.as_u16() == 429 || status.as_u16() == 408
                    {
                        ErrorClass::Retryable
                    } else {
                        ErrorClass::Permanent
                    }
                }
                None if e.is_builder() || e.is_redirect() => ErrorClass::Permanent,
                None => ErrorClass::Retryable,
            },

            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::WouldBlock => ErrorClass::Retryable,
                _ => ErrorClass::Permanent,
            },

            Error::DiskFull(_) | Error::PermissionDenied(_) => ErrorClass::Resource,

            Error::Api(_)
            | Error::Authentication(_)
            | Error::ItemNotFound(_)
            | Error::NoCompatibleFormat { .. }
            | Error::NotEntitled(_)
            | Error::NotYetPublished { .. }
            | Error::LicenseDenied { .. }
            | Error::UnexpectedContent { .. }
            | Error::TooManyRedirects { .. }
            | Error::SizeMismatch { .. }
            | Error::Cancelled
            | Error::InvalidFilename(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::UrlParse(_) => ErrorClass::Permanent,
        }
    }

    /// Whether the failing step may be attempted again.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// Number of retries this error allows, given the configured maximum.
    ///
    /// Invalid licenses are only worth one more attempt: a skewed clock or a
    /// stale URL is transient, a broken license response is not.
    pub fn retry_budget(&self, max_retries: u32) -> u32 {
        match self {
            Error::InvalidLicense { .. } => max_retries.min(1),
            e if e.is_retryable() => max_retries,
            _ => 0,
        }
    }

    /// Wrap an IO error raised while touching `path`, classifying resource
    /// exhaustion separately from ordinary failures.
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        // ENOSPC / EDQUOT
        const NO_SPACE: i32 = 28;
        const QUOTA_EXCEEDED: i32 = 122;

        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::StorageFull => Error::DiskFull(path.to_path_buf()),
            _ if matches!(err.raw_os_error(), Some(NO_SPACE) | Some(QUOTA_EXCEEDED)) => {
                Error::DiskFull(path.to_path_buf())
            }
            _ => Error::Io(err),
        }
    }

    /// Wrap a reqwest error raised while talking to `url`.
    pub fn from_request(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(format!("request to {}", url))
        } else if err.is_connect() || err.is_body() || err.is_request() {
            Error::Connection(format!("{}: {}", url, err))
        } else {
            Error::Http(err)
        }
    }
}

/// Exit codes for the command-line binary.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const ABORT: i32 = 1;
    pub const API_ERROR: i32 = 2;
    pub const CONFIG_ERROR: i32 = 3;
    pub const DOWNLOAD_ERROR: i32 = 4;
    pub const UNEXPECTED_ERROR: i32 = 5;
    pub const SOME_ITEMS_FAILED: i32 = 6;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_classification() {
        let err = |status| Error::HttpStatus {
            url: "https://cdn.example/a".into(),
            status,
        };
        assert_eq!(err(503).class(), ErrorClass::Retryable);
        assert_eq!(err(429).class(), ErrorClass::Retryable);
        assert_eq!(err(408).class(), ErrorClass::Retryable);
        assert_eq!(err(404).class(), ErrorClass::Permanent);
        assert_eq!(err(403).class(), ErrorClass::Permanent);
    }

    #[test]
    fn test_invalid_license_retried_once() {
        let err = Error::InvalidLicense {
            item: "B000000001".into(),
            reason: "expired".into(),
        };
        assert_eq!(err.retry_budget(5), 1);
        assert_eq!(err.retry_budget(0), 0);
        assert_eq!(Error::Timeout("chunk".into()).retry_budget(5), 5);
        assert_eq!(Error::NotEntitled("B000000001".into()).retry_budget(5), 0);
    }

    #[test]
    fn test_io_classification() {
        let path = Path::new("/tmp/out.aaxc");

        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(matches!(
            Error::from_io(path, denied),
            Error::PermissionDenied(_)
        ));

        let full = std::io::Error::from_raw_os_error(28);
        let err = Error::from_io(path, full);
        assert!(matches!(err, Error::DiskFull(_)));
        assert_eq!(err.class(), ErrorClass::Resource);

        let other = std::io::Error::other("boom");
        assert_eq!(Error::from_io(path, other).class(), ErrorClass::Permanent);
    }

    #[test]
    fn test_configuration_class() {
        assert_eq!(
            Error::Config("both modes".into()).class(),
            ErrorClass::Configuration
        );
    }
}
