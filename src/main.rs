//! Audible Downloader - CLI entry point.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use audible_downloader::{
    api::HttpCatalog,
    cli::Args,
    config::{validate_config, validate_item_id, Config, PodcastMode},
    download::{AcquisitionScheduler, BatchSummary, Library, PodcastExpander, SchedulerOptions},
    error::{exit_codes, Error, Result},
    format::Preferences,
    output::{
        create_spinner, print_banner, print_batch_summary, print_config_summary, print_error,
        print_info, print_success, print_warning, spawn_progress,
    },
    transfer::{ResumableTransfer, TransferOptions},
};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(None) => ExitCode::from(exit_codes::SUCCESS as u8),
        Ok(Some(summary)) if summary.has_failures() => {
            ExitCode::from(exit_codes::SOME_ITEMS_FAILED as u8)
        }
        Ok(Some(_)) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(e) => {
            print_error(&format!("{}", e));
            match e {
                Error::Cancelled => ExitCode::from(exit_codes::ABORT as u8),
                Error::Config(_) | Error::ConfigValidation { .. } | Error::MissingConfig(_) => {
                    ExitCode::from(exit_codes::CONFIG_ERROR as u8)
                }
                Error::Authentication(_)
                | Error::Api(_)
                | Error::ItemNotFound(_)
                | Error::RateLimited(_) => ExitCode::from(exit_codes::API_ERROR as u8),
                Error::DiskFull(_) | Error::PermissionDenied(_) | Error::InvalidFilename(_) => {
                    ExitCode::from(exit_codes::DOWNLOAD_ERROR as u8)
                }
                _ => ExitCode::from(exit_codes::UNEXPECTED_ERROR as u8),
            }
        }
    }
}

/// Returns the batch summary, or `None` when there was nothing to do.
async fn run() -> Result<Option<BatchSummary>> {
    // Parse CLI arguments
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt().with_env_filter(filter).with_target(false).init();

    print_banner();

    // Load configuration
    let config_path = args.config_path();
    let mut config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        print_warning(&format!(
            "Configuration file not found: {}",
            config_path.display()
        ));
        print_info("Using default configuration with CLI arguments");
        Config::default()
    };

    // Merge CLI arguments into config
    args.merge_into_config(&mut config);

    // Validate before anything touches the network or the disk
    validate_config(&config)?;

    let selection = args.selection();
    if selection.is_empty() && args.items_file.is_none() {
        return Err(Error::Config(
            "Nothing selected: use --all, --asin, --title or --items-file".to_string(),
        ));
    }
    for id in &selection.ids {
        validate_item_id(id)?;
    }

    let catalog = Arc::new(HttpCatalog::new(&config.account, config.timeout())?);
    let page_size = config.download.page_size;

    // Build the library
    let mut library = match &args.items_file {
        Some(path) => {
            print_info(&format!("Reading items from {}", path.display()));
            Library::from_items_file(path)?
        }
        None => {
            let spinner = create_spinner("Listing library...");
            let library = Library::fetch(catalog.as_ref(), page_size).await;
            spinner.finish_and_clear();
            library?
        }
    };

    if config.podcast_mode() == PodcastMode::Resolve {
        let expander = PodcastExpander::new(catalog.clone(), page_size);
        library.resolve_podcasts(&expander).await?;
    }

    // Without an explicit selection an items file is taken as a whole.
    let items = if selection.is_empty() {
        library.items().to_vec()
    } else {
        library.select(&selection, config.download.ignore_errors)?
    };

    if items.is_empty() {
        print_warning("No items matched the selection");
        return Ok(None);
    }

    print_config_summary(
        items.len(),
        &config.download.codec.to_string(),
        &config.download.quality.to_string(),
        config.download.jobs,
        &config.output_dir().display().to_string(),
    );

    // Acquire
    let transfer = ResumableTransfer::new(TransferOptions::from_config(&config))?;
    let scheduler =
        AcquisitionScheduler::new(catalog, transfer, SchedulerOptions::from_config(&config));
    let prefs = Preferences::from_config(&config.download);

    let progress = spawn_progress(scheduler.progress());

    // Ctrl-C stops the batch through the scheduler so in-flight transfers
    // get to checkpoint before the run returns.
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                print_warning("Interrupted; partial downloads will resume on the next run");
                cancel.cancel();
            }
        })
    };

    let outcome = scheduler
        .run_until(items, &prefs, config.download.jobs, config.error_policy(), &cancel)
        .await;
    interrupt.abort();

    drop(scheduler);
    if let Err(e) = progress.await {
        tracing::debug!("Progress display ended abnormally: {}", e);
    }

    let summary = outcome?;
    print_batch_summary(&summary);

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    if summary.has_failures() {
        print_warning(&format!("{} item(s) failed", summary.failed()));
    } else {
        print_success("All items processed");
    }

    Ok(Some(summary))
}
