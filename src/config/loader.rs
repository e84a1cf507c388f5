//! Configuration structures and loading logic.

use crate::config::modes::{ChapterType, ErrorPolicy, FilenameMode, PodcastMode, Quality};
use crate::error::{Error, Result};
use crate::media::CodecFamily;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "AUDIBLE_CONFIG_DIR";

/// Configuration file name inside the configuration directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub download: DownloadConfig,
}

/// Catalog account configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Catalog API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Bearer token for the catalog API.
    #[serde(default)]
    pub access_token: String,

    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Marketplace (country code) the account belongs to.
    #[serde(default = "default_marketplace")]
    pub marketplace: String,
}

/// Download options configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Base directory for downloads.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Preferred codec family.
    #[serde(default)]
    pub codec: CodecFamily,

    /// Fall back to the other codec family when the preferred one is missing.
    #[serde(default = "default_true")]
    pub fallback: bool,

    #[serde(default)]
    pub quality: Quality,

    /// Codec labels preferred when several encodings share the best tier.
    #[serde(default = "default_quality_priority")]
    pub quality_priority: Vec<String>,

    #[serde(default)]
    pub chapter_type: ChapterType,

    /// Download the audio itself.
    #[serde(default = "default_true")]
    pub audio: bool,

    /// Save annotations (bookmarks, notes) as JSON.
    #[serde(default)]
    pub annotations: bool,

    /// Save chapter metadata as JSON.
    #[serde(default)]
    pub chapters: bool,

    /// Download the cover image.
    #[serde(default)]
    pub cover: bool,

    /// Cover size in pixels.
    #[serde(default = "default_cover_size")]
    pub cover_size: u32,

    /// Download the companion PDF.
    #[serde(default)]
    pub pdf: bool,

    /// Number of items processed simultaneously (bunch size).
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Retries per failing step.
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Per-operation network timeout; 0 disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Assets larger than this are transferred in parts.
    #[serde(default = "default_part_threshold_mb")]
    pub part_threshold_mb: u64,

    #[serde(default = "default_part_size_mb")]
    pub part_size_mb: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Expand podcasts before selection.
    #[serde(default)]
    pub resolve_podcasts: bool,

    /// Skip podcasts that have episodes.
    #[serde(default)]
    pub ignore_podcasts: bool,

    /// Continue with remaining items after a failure.
    #[serde(default)]
    pub ignore_errors: bool,

    /// Re-fetch existing files and ignore cached vouchers.
    #[serde(default)]
    pub overwrite: bool,

    #[serde(default)]
    pub filename_mode: FilenameMode,

    /// Library items requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            codec: CodecFamily::default(),
            fallback: true,
            quality: Quality::default(),
            quality_priority: default_quality_priority(),
            chapter_type: ChapterType::default(),
            audio: true,
            annotations: false,
            chapters: false,
            cover: false,
            cover_size: default_cover_size(),
            pdf: false,
            jobs: default_jobs(),
            retries: default_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            timeout_secs: default_timeout_secs(),
            part_threshold_mb: default_part_threshold_mb(),
            part_size_mb: default_part_size_mb(),
            max_redirects: default_max_redirects(),
            resolve_podcasts: false,
            ignore_podcasts: false,
            ignore_errors: false,
            overwrite: false,
            filename_mode: FilenameMode::default(),
            page_size: default_page_size(),
        }
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            access_token: String::new(),
            user_agent: default_user_agent(),
            marketplace: default_marketplace(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.audible.com/1.0".to_string()
}

fn default_user_agent() -> String {
    "Audible/671 CFNetwork/1240.0.4 Darwin/20.6.0".to_string()
}

fn default_marketplace() -> String {
    "us".to_string()
}

fn default_true() -> bool {
    true
}

fn default_quality_priority() -> Vec<String> {
    vec![
        "LC_128_44100_stereo".to_string(),
        "LC_64_44100_stereo".to_string(),
    ]
}

fn default_cover_size() -> u32 {
    500
}

fn default_jobs() -> usize {
    3
}

fn default_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_part_threshold_mb() -> u64 {
    512
}

fn default_part_size_mb() -> u64 {
    256
}

fn default_max_redirects() -> usize {
    10
}

fn default_page_size() -> u32 {
    1000
}

const MIB: u64 = 1024 * 1024;

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Config(format!(
                    "Configuration file not found: {}",
                    path.display()
                ))
            } else {
                Error::Io(e)
            }
        })?;

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Default configuration file location.
    ///
    /// `$AUDIBLE_CONFIG_DIR/config.toml` if set, else the platform config dir.
    pub fn default_path() -> PathBuf {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
            return PathBuf::from(dir).join(CONFIG_FILE);
        }

        ProjectDirs::from("", "", "audible-downloader")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
    }

    /// Get the effective output directory.
    pub fn output_dir(&self) -> PathBuf {
        self.download
            .output_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// Podcast handling mode. Validation rejects enabling both flags.
    pub fn podcast_mode(&self) -> PodcastMode {
        if self.download.ignore_podcasts {
            PodcastMode::Ignore
        } else if self.download.resolve_podcasts {
            PodcastMode::Resolve
        } else {
            PodcastMode::Expand
        }
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy::from_ignore_errors(self.download.ignore_errors)
    }

    /// Per-operation timeout, `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        match self.download.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn part_threshold_bytes(&self) -> u64 {
        self.download.part_threshold_mb.saturating_mul(MIB)
    }

    pub fn part_size_bytes(&self) -> u64 {
        self.download.part_size_mb.saturating_mul(MIB)
    }
}
