//! Option enums shared by the configuration file and the CLI.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Requested download quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Highest available, no cap (default).
    #[default]
    Best,
    /// Cap at the high tier.
    High,
    /// Cap at the normal tier.
    Normal,
}

impl Quality {
    /// Quality label sent with license requests.
    pub fn license_label(&self) -> &'static str {
        match self {
            Quality::Best | Quality::High => "High",
            Quality::Normal => "Normal",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Best => write!(f, "best"),
            Quality::High => write!(f, "high"),
            Quality::Normal => write!(f, "normal"),
        }
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "best" => Ok(Quality::Best),
            "high" => Ok(Quality::High),
            "normal" => Ok(Quality::Normal),
            _ => Err(format!("Unknown quality: {}", s)),
        }
    }
}

/// Chapter representation requested with the license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterType {
    Flat,
    #[default]
    Tree,
}

impl ChapterType {
    /// Value sent with license requests.
    pub fn license_label(&self) -> &'static str {
        match self {
            ChapterType::Flat => "Flat",
            ChapterType::Tree => "Tree",
        }
    }
}

impl fmt::Display for ChapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChapterType::Flat => write!(f, "flat"),
            ChapterType::Tree => write!(f, "tree"),
        }
    }
}

/// How base filenames are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilenameMode {
    #[default]
    Ascii,
    AsinAscii,
    Unicode,
    AsinUnicode,
}

impl fmt::Display for FilenameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilenameMode::Ascii => write!(f, "ascii"),
            FilenameMode::AsinAscii => write!(f, "asin_ascii"),
            FilenameMode::Unicode => write!(f, "unicode"),
            FilenameMode::AsinUnicode => write!(f, "asin_unicode"),
        }
    }
}

impl FromStr for FilenameMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ascii" => Ok(FilenameMode::Ascii),
            "asin_ascii" => Ok(FilenameMode::AsinAscii),
            "unicode" => Ok(FilenameMode::Unicode),
            "asin_unicode" => Ok(FilenameMode::AsinUnicode),
            _ => Err(format!("Unknown filename mode: {}", s)),
        }
    }
}

/// Batch behavior after an item fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Abort the batch; remaining items are skipped (default).
    #[default]
    StopOnFirstFailure,
    /// Record the failure and continue.
    IgnoreErrors,
}

impl ErrorPolicy {
    pub fn from_ignore_errors(ignore_errors: bool) -> Self {
        if ignore_errors {
            ErrorPolicy::IgnoreErrors
        } else {
            ErrorPolicy::StopOnFirstFailure
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::StopOnFirstFailure => write!(f, "stop on first failure"),
            ErrorPolicy::IgnoreErrors => write!(f, "ignore errors"),
        }
    }
}

/// How parent items (podcasts, multi-part books) are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PodcastMode {
    /// Replace parents by their children at scheduling time (default).
    #[default]
    Expand,
    /// Expand parents before selection so children are searchable.
    Resolve,
    /// Skip parents that have more than one child.
    Ignore,
}

impl fmt::Display for PodcastMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodcastMode::Expand => write!(f, "expand"),
            PodcastMode::Resolve => write!(f, "resolve"),
            PodcastMode::Ignore => write!(f, "ignore"),
        }
    }
}
