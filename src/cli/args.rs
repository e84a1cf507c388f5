//! Command-line argument definitions using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::{Config, FilenameMode, Quality};
use crate::download::Selection;
use crate::media::CodecFamily;

/// Audible library downloader CLI.
#[derive(Parser, Debug)]
#[command(
    name = "audible-downloader",
    version,
    about = "Download audiobooks and podcasts from an Audible library",
    long_about = "A CLI tool to download audiobooks, podcast episodes and their companion files \
                  (cover, PDF, chapters, annotations) from an Audible library.\n\n\
                  Interrupted downloads resume where they stopped."
)]
pub struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Download every item in the library.
    #[arg(long)]
    pub all: bool,

    /// ASIN(s) of the items to download.
    #[arg(short = 'a', long = "asin", num_args = 1..)]
    pub asins: Vec<String>,

    /// Title(s) of the items to download.
    #[arg(short = 't', long = "title", num_args = 1..)]
    pub titles: Vec<String>,

    /// Read items from a JSON file instead of listing the library.
    #[arg(long)]
    pub items_file: Option<PathBuf>,

    /// Base directory for downloads.
    #[arg(short = 'o', long = "output-dir")]
    pub output_dir: Option<PathBuf>,

    /// Preferred codec family.
    #[arg(long, value_enum)]
    pub codec: Option<CodecArg>,

    /// Never fall back to the other codec family.
    #[arg(long)]
    pub no_fallback: bool,

    /// Download quality (best, high, normal).
    #[arg(short = 'q', long)]
    pub quality: Option<Quality>,

    /// Filename mode (ascii, asin_ascii, unicode, asin_unicode).
    #[arg(short = 'f', long)]
    pub filename_mode: Option<FilenameMode>,

    /// Number of items processed simultaneously.
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Continue with the remaining items after a failure.
    #[arg(long)]
    pub ignore_errors: bool,

    /// Expand podcasts so episodes can be selected by title or ASIN.
    #[arg(long, conflicts_with = "ignore_podcasts")]
    pub resolve_podcasts: bool,

    /// Skip podcasts with episodes.
    #[arg(long)]
    pub ignore_podcasts: bool,

    /// Skip the audio file itself.
    #[arg(long)]
    pub no_audio: bool,

    /// Download the cover image.
    #[arg(long)]
    pub cover: bool,

    /// Cover size in pixels.
    #[arg(long)]
    pub cover_size: Option<u32>,

    /// Download the companion PDF.
    #[arg(long)]
    pub pdf: bool,

    /// Save chapter metadata as JSON.
    #[arg(long)]
    pub chapters: bool,

    /// Save annotations as JSON.
    #[arg(long)]
    pub annotations: bool,

    /// Re-download existing files and ignore saved vouchers.
    #[arg(long)]
    pub overwrite: bool,

    /// Retries per failing step.
    #[arg(long)]
    pub retries: Option<u32>,

    /// Network timeout in seconds; 0 disables it.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Catalog access token.
    #[arg(long, env = "AUDIBLE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Account marketplace (country code).
    #[arg(long, env = "AUDIBLE_MARKETPLACE")]
    pub marketplace: Option<String>,

    /// Enable debug logging.
    #[arg(long)]
    pub debug: bool,
}

/// CLI codec family argument.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CodecArg {
    /// AAXC or MPEG, delivered with a voucher.
    Wrapped,
    /// Legacy AAX.
    Legacy,
}

impl From<CodecArg> for CodecFamily {
    fn from(arg: CodecArg) -> Self {
        match arg {
            CodecArg::Wrapped => CodecFamily::Wrapped,
            CodecArg::Legacy => CodecFamily::Legacy,
        }
    }
}

impl Args {
    /// Configuration file to load.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Items requested on the command line.
    pub fn selection(&self) -> Selection {
        Selection {
            all: self.all,
            ids: self.asins.clone(),
            titles: self.titles.clone(),
        }
    }

    /// Merge CLI arguments into an existing config, overriding where specified.
    pub fn merge_into_config(&self, config: &mut Config) {
        let download = &mut config.download;

        if let Some(token) = &self.token {
            config.account.access_token = token.clone();
        }

        if let Some(marketplace) = &self.marketplace {
            config.account.marketplace = marketplace.clone();
        }

        if let Some(dir) = &self.output_dir {
            download.output_dir = Some(dir.clone());
        }

        if let Some(codec) = self.codec {
            download.codec = codec.into();
        }

        if let Some(quality) = self.quality {
            download.quality = quality;
        }

        if let Some(mode) = self.filename_mode {
            download.filename_mode = mode;
        }

        if let Some(jobs) = self.jobs {
            download.jobs = jobs;
        }

        if let Some(size) = self.cover_size {
            download.cover_size = size;
        }

        if let Some(retries) = self.retries {
            download.retries = retries;
        }

        if let Some(timeout) = self.timeout {
            download.timeout_secs = timeout;
        }

        // Boolean flags (only override if set to non-default)
        if self.no_fallback {
            download.fallback = false;
        }

        if self.no_audio {
            download.audio = false;
        }

        if self.cover {
            download.cover = true;
        }

        if self.pdf {
            download.pdf = true;
        }

        if self.chapters {
            download.chapters = true;
        }

        if self.annotations {
            download.annotations = true;
        }

        if self.overwrite {
            download.overwrite = true;
        }

        if self.ignore_errors {
            download.ignore_errors = true;
        }

        if self.resolve_podcasts {
            download.resolve_podcasts = true;
        }

        if self.ignore_podcasts {
            download.ignore_podcasts = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ErrorPolicy, PodcastMode};

    #[test]
    fn test_merge_overrides_file() {
        let args = Args::try_parse_from([
            "audible-downloader",
            "--asin",
            "B000000001",
            "B000000002",
            "--codec",
            "legacy",
            "--quality",
            "normal",
            "--jobs",
            "6",
            "--ignore-errors",
            "--ignore-podcasts",
            "--cover",
            "--token",
            "abc",
        ])
        .unwrap();

        let mut config = Config::default();
        args.merge_into_config(&mut config);

        assert_eq!(config.account.access_token, "abc");
        assert_eq!(config.download.codec, CodecFamily::Legacy);
        assert_eq!(config.download.quality, Quality::Normal);
        assert_eq!(config.download.jobs, 6);
        assert!(config.download.cover);
        assert!(config.download.audio);
        assert_eq!(config.error_policy(), ErrorPolicy::IgnoreErrors);
        assert_eq!(config.podcast_mode(), PodcastMode::Ignore);

        let selection = args.selection();
        assert_eq!(selection.ids, vec!["B000000001", "B000000002"]);
        assert!(!selection.all);
    }

    #[test]
    fn test_unset_flags_keep_file_values() {
        let args = Args::try_parse_from(["audible-downloader", "--all"]).unwrap();

        let mut config = Config::default();
        config.download.jobs = 9;
        config.download.pdf = true;
        args.merge_into_config(&mut config);

        assert_eq!(config.download.jobs, 9);
        assert!(config.download.pdf);
        assert!(args.selection().all);
    }

    #[test]
    fn test_podcast_flags_conflict() {
        let result = Args::try_parse_from([
            "audible-downloader",
            "--all",
            "--resolve-podcasts",
            "--ignore-podcasts",
        ]);
        assert!(result.is_err());
    }
}
