//! Batch orchestration: expand, select, negotiate and transfer each item.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::api::CatalogClient;
use crate::config::{Config, ErrorPolicy, FilenameMode, PodcastMode};
use crate::download::expand::PodcastExpander;
use crate::download::retry::RetryPolicy;
use crate::download::state::{BatchSummary, JobResult, JobStatus, ProgressSnapshot};
use crate::error::{Error, Result};
use crate::format::{select, FormatChoice, Preferences};
use crate::fs::{
    annotations_filename, audio_filename, chapters_filename, cover_filename, ensure_dir,
    item_directory, pdf_filename, resume_path, voucher_filename,
};
use crate::license::{load_voucher, save_voucher, License, LicenseNegotiator};
use crate::media::AcquisitionItem;
use crate::transfer::{AssetKind, ResumableTransfer, ResumeState, TransferRequest};

/// Which files to produce per item besides annotations.
#[derive(Debug, Clone)]
pub struct AssetOptions {
    pub audio: bool,
    pub chapters: bool,
    pub cover: bool,
    pub cover_size: u32,
    pub pdf: bool,
}

impl Default for AssetOptions {
    fn default() -> Self {
        Self {
            audio: true,
            chapters: false,
            cover: false,
            cover_size: 500,
            pdf: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub output_root: PathBuf,
    pub filename_mode: FilenameMode,
    pub podcast_mode: PodcastMode,
    pub retry: RetryPolicy,
    /// Ignore cached vouchers and existing files.
    pub overwrite: bool,
    pub assets: AssetOptions,
    pub page_size: u32,
    pub license_timeout: Option<Duration>,
}

impl SchedulerOptions {
    pub fn from_config(config: &Config) -> Self {
        let download = &config.download;
        Self {
            output_root: config.output_dir(),
            filename_mode: download.filename_mode,
            podcast_mode: config.podcast_mode(),
            retry: RetryPolicy::from_config(config),
            overwrite: download.overwrite,
            assets: AssetOptions {
                audio: download.audio,
                chapters: download.chapters,
                cover: download.cover,
                cover_size: download.cover_size,
                pdf: download.pdf,
            },
            page_size: download.page_size,
            license_timeout: config.timeout(),
        }
    }
}

/// A slot of the flattened work list.
enum WorkEntry {
    Pending(AcquisitionItem),
    /// Settled before execution (expansion failure, ignored podcast).
    Settled(JobResult),
}

/// Drives selection, negotiation and transfer for a batch of items.
pub struct AcquisitionScheduler {
    catalog: Arc<dyn CatalogClient>,
    negotiator: LicenseNegotiator,
    transfer: ResumableTransfer,
    expander: PodcastExpander,
    options: SchedulerOptions,
    progress: watch::Sender<ProgressSnapshot>,
}

impl AcquisitionScheduler {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        transfer: ResumableTransfer,
        options: SchedulerOptions,
    ) -> Self {
        let (progress, _) = watch::channel(ProgressSnapshot::default());
        Self {
            negotiator: LicenseNegotiator::new(catalog.clone(), options.license_timeout),
            expander: PodcastExpander::new(catalog.clone(), options.page_size),
            catalog,
            transfer,
            options,
            progress,
        }
    }

    /// Observe running counters of the current batch.
    pub fn progress(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }

    /// Process `items` with at most `concurrency` items in flight.
    ///
    /// Every work item ends up in the summary. Only problems that prevent any
    /// item from proceeding (bad options, an unusable output root) are
    /// returned as errors.
    pub async fn run(
        &self,
        items: Vec<AcquisitionItem>,
        prefs: &Preferences,
        concurrency: usize,
        policy: ErrorPolicy,
    ) -> Result<BatchSummary> {
        self.run_until(items, prefs, concurrency, policy, &CancellationToken::new())
            .await
    }

    /// Like [`AcquisitionScheduler::run`], but stops when `cancel` fires.
    ///
    /// In-flight transfers checkpoint their progress before giving up; the
    /// affected items and everything not yet started are reported as skipped.
    pub async fn run_until(
        &self,
        items: Vec<AcquisitionItem>,
        prefs: &Preferences,
        concurrency: usize,
        policy: ErrorPolicy,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary> {
        if concurrency == 0 {
            return Err(Error::ConfigValidation {
                field: "jobs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        ensure_dir(&self.options.output_root)?;

        let token = cancel.child_token();
        let work = self.build_work_list(items, policy, &token).await;
        let total = work.len();

        let mut results: Vec<Option<JobResult>> = vec![None; total];
        let mut snapshot = ProgressSnapshot {
            total,
            ..ProgressSnapshot::default()
        };

        let mut pending = Vec::new();
        for (index, entry) in work.into_iter().enumerate() {
            match entry {
                WorkEntry::Pending(item) => pending.push((index, item)),
                WorkEntry::Settled(result) => {
                    record(&mut snapshot, &result);
                    results[index] = Some(result);
                }
            }
        }
        self.progress.send_replace(snapshot);

        tracing::info!(
            total,
            concurrency,
            "Acquiring {} item(s)",
            pending.len()
        );

        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let token_ref = &token;
        let active_ref = &active;
        let peak_ref = &peak;

        let mut outcomes = stream::iter(pending)
            .map(|(index, item)| async move {
                let result = self
                    .process(item, prefs, token_ref, active_ref, peak_ref)
                    .await;
                (index, result)
            })
            .buffer_unordered(concurrency);

        while let Some((index, result)) = outcomes.next().await {
            if result.status.is_failure()
                && policy == ErrorPolicy::StopOnFirstFailure
                && !token.is_cancelled()
            {
                tracing::warn!(
                    item = %result.item_id,
                    "Stopping batch after first failure"
                );
                token.cancel();
            }

            record(&mut snapshot, &result);
            self.progress.send_replace(snapshot);
            results[index] = Some(result);
        }
        drop(outcomes);

        Ok(BatchSummary::from_results(
            results.into_iter().flatten().collect(),
            peak.load(Ordering::SeqCst),
        ))
    }

    /// Flatten the input into the work list, expanding parents up front.
    async fn build_work_list(
        &self,
        items: Vec<AcquisitionItem>,
        policy: ErrorPolicy,
        token: &CancellationToken,
    ) -> Vec<WorkEntry> {
        let mut work = Vec::new();
        let mut seen = HashSet::new();
        let ignore = self.options.podcast_mode == PodcastMode::Ignore;

        let mut push = |work: &mut Vec<WorkEntry>, item: AcquisitionItem| {
            if seen.insert(item.id.clone()) {
                work.push(WorkEntry::Pending(item));
            } else {
                tracing::debug!(item = %item.id, "Dropping duplicate work item");
            }
        };

        for item in items {
            if !item.kind.is_parent() {
                push(&mut work, item);
                continue;
            }

            if token.is_cancelled() {
                work.push(WorkEntry::Settled(JobResult::skipped(
                    &item.id,
                    &item.title,
                    "batch stopped",
                )));
                continue;
            }

            if ignore && item.child_count.is_some_and(|count| count > 1) {
                tracing::info!(item = %item.id, "Skipping {} {}", item.kind, item.title);
                work.push(WorkEntry::Settled(JobResult::skipped(
                    &item.id,
                    &item.title,
                    format!("{} ignored", item.kind),
                )));
                continue;
            }

            let mut retries = 0;
            let expanded = self
                .options
                .retry
                .run("expand", token, &mut retries, |_| {
                    self.expander.collect(item.clone(), None)
                })
                .await;

            match expanded {
                Ok(children) if ignore && children.len() > 1 => {
                    tracing::info!(item = %item.id, "Skipping {} {}", item.kind, item.title);
                    work.push(WorkEntry::Settled(JobResult::skipped(
                        &item.id,
                        &item.title,
                        format!("{} ignored", item.kind),
                    )));
                }
                Ok(children) if children.is_empty() => {
                    tracing::warn!(item = %item.id, "{} has no downloadable parts", item.title);
                    work.push(WorkEntry::Settled(JobResult::skipped(
                        &item.id,
                        &item.title,
                        "no children",
                    )));
                }
                Ok(children) => {
                    tracing::info!(
                        item = %item.id,
                        "Expanded {} into {} item(s)",
                        item.title,
                        children.len()
                    );
                    for child in children {
                        push(&mut work, child);
                    }
                }
                Err(e) => {
                    tracing::error!(item = %item.id, "Failed to expand {}: {}", item.title, e);
                    let mut result = JobResult::failed(&item.id, &item.title, &e);
                    result.retries = retries;
                    if result.status.is_failure() && policy == ErrorPolicy::StopOnFirstFailure {
                        token.cancel();
                    }
                    work.push(WorkEntry::Settled(result));
                }
            }
        }

        work
    }

    async fn process(
        &self,
        item: AcquisitionItem,
        prefs: &Preferences,
        token: &CancellationToken,
        active: &AtomicUsize,
        peak: &AtomicUsize,
    ) -> JobResult {
        if token.is_cancelled() {
            tracing::info!(item = %item.id, "Skipping {}, batch stopped", item.title);
            return JobResult::skipped(&item.id, &item.title, "batch stopped");
        }

        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);

        let mut job = JobResult::succeeded(&item.id, &item.title);
        let outcome = self.acquire(&item, prefs, token, &mut job).await;

        active.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(()) => {
                tracing::info!(item = %item.id, "Finished {}", item.title);
                job
            }
            Err(e) => {
                let mut failed = JobResult::failed(&item.id, &item.title, &e);
                failed.retries = job.retries;
                failed.bytes_transferred = job.bytes_transferred;
                failed.output = job.output;

                if failed.status == JobStatus::Skipped {
                    tracing::info!(item = %item.id, "Abandoned {}", item.title);
                } else {
                    tracing::error!(
                        item = %item.id,
                        class = %e.class(),
                        "Failed to acquire {}: {}",
                        item.title,
                        e
                    );
                }
                failed
            }
        }
    }

    /// Run the per-item pipeline; each step retries on its own.
    async fn acquire(
        &self,
        item: &AcquisitionItem,
        prefs: &Preferences,
        token: &CancellationToken,
        job: &mut JobResult,
    ) -> Result<()> {
        let choice = select(item, prefs)?;
        if choice.fell_back {
            tracing::info!(
                item = %item.id,
                "No {} encoding available, using {}",
                prefs.codec_family,
                choice.codec
            );
        }
        if choice.cap_relaxed {
            tracing::info!(
                item = %item.id,
                "No encoding within quality '{}', using {}",
                choice.quality,
                choice.codec
            );
        }

        let dir = item_directory(&self.options.output_root, item);
        ensure_dir(&dir)?;
        let base = item.create_base_filename(self.options.filename_mode);
        let assets = &self.options.assets;

        if assets.audio || assets.chapters {
            let license = self.license(item, &choice, &dir, &base, token, job).await?;

            if assets.audio {
                let target = dir.join(audio_filename(&base, &license.granted_codec, license.drm)?);
                let request = TransferRequest {
                    source: license.content_url.clone(),
                    target,
                    expected_size: license.content_size,
                    format_key: choice.format_key(),
                    asset: AssetKind::Audio,
                };
                self.fetch("audio", &request, token, job).await?;
                job.output = Some(request.target);
            }

            if assets.chapters {
                self.write_chapters(item, &license, &dir, &base).await?;
            }
        }

        if assets.cover {
            self.fetch_cover(item, &dir, &base, token, job).await?;
        }

        if assets.pdf {
            self.fetch_pdf(item, &dir, &base, token, job).await?;
        }

        if choice.annotations {
            self.write_annotations(item, &dir, &base, token, job).await?;
        }

        Ok(())
    }

    async fn license(
        &self,
        item: &AcquisitionItem,
        choice: &FormatChoice,
        dir: &Path,
        base: &str,
        token: &CancellationToken,
        job: &mut JobResult,
    ) -> Result<License> {
        let voucher_path = dir.join(voucher_filename(base, &choice.codec)?);
        let cached = if self.options.overwrite {
            None
        } else {
            load_voucher(&voucher_path).await?
        };

        let license = self
            .options
            .retry
            .run("license", token, &mut job.retries, |_| {
                self.negotiator.negotiate(item, choice, cached.as_ref())
            })
            .await?;

        if license.granted_codec != choice.codec {
            tracing::info!(
                item = %item.id,
                "Requested {} but was granted {}",
                choice.codec,
                license.granted_codec
            );
        }

        if !license.from_cache {
            if let Some(voucher) = &license.voucher {
                save_voucher(&voucher_path, voucher).await?;
            }
        }

        Ok(license)
    }

    /// Transfer one asset under the retry policy, resuming from its sidecar.
    async fn fetch(
        &self,
        step: &str,
        request: &TransferRequest,
        token: &CancellationToken,
        job: &mut JobResult,
    ) -> Result<()> {
        let sidecar = resume_path(&request.target);
        let sidecar = sidecar.as_path();
        let transferred = AtomicU64::new(0);
        let transferred_ref = &transferred;

        let result = self
            .options
            .retry
            .run(step, token, &mut job.retries, |_| async move {
                let resume = ResumeState::load(sidecar).await?;
                let start = resume.as_ref().map(ResumeState::committed).unwrap_or(0);

                let outcome = self.transfer.transfer(request, resume, token).await;

                let fetched = match &outcome {
                    Ok(state) => state.bytes_transferred,
                    Err(_) => ResumeState::load(sidecar)
                        .await
                        .ok()
                        .flatten()
                        .map(|r| r.committed())
                        .unwrap_or(start)
                        .saturating_sub(start),
                };
                transferred_ref.fetch_add(fetched, Ordering::Relaxed);

                outcome
            })
            .await;

        job.bytes_transferred += transferred.load(Ordering::Relaxed);
        result.map(|_| ())
    }

    async fn fetch_cover(
        &self,
        item: &AcquisitionItem,
        dir: &Path,
        base: &str,
        token: &CancellationToken,
        job: &mut JobResult,
    ) -> Result<()> {
        let size = self.options.assets.cover_size;
        let Some(url) = item.cover_urls.get(&size) else {
            tracing::info!(item = %item.id, "No {}px cover found for {}", size, item.title);
            return Ok(());
        };

        let request = TransferRequest {
            source: Url::parse(url)?,
            target: dir.join(cover_filename(base, size)?),
            expected_size: None,
            format_key: format!("cover/{}", size),
            asset: AssetKind::Image,
        };
        self.fetch("cover", &request, token, job).await
    }

    async fn fetch_pdf(
        &self,
        item: &AcquisitionItem,
        dir: &Path,
        base: &str,
        token: &CancellationToken,
        job: &mut JobResult,
    ) -> Result<()> {
        let Some(url) = &item.pdf_url else {
            tracing::info!(item = %item.id, "No PDF found for {}", item.title);
            return Ok(());
        };

        let request = TransferRequest {
            source: Url::parse(url)?,
            target: dir.join(pdf_filename(base)?),
            expected_size: None,
            format_key: "pdf".to_string(),
            asset: AssetKind::Document,
        };
        self.fetch("pdf", &request, token, job).await
    }

    async fn write_chapters(
        &self,
        item: &AcquisitionItem,
        license: &License,
        dir: &Path,
        base: &str,
    ) -> Result<()> {
        let Some(chapters) = &license.chapter_info else {
            tracing::info!(item = %item.id, "No chapter information for {}", item.title);
            return Ok(());
        };

        let path = dir.join(chapters_filename(base, &license.granted_codec)?);
        if path.exists() && !self.options.overwrite {
            tracing::info!("File {} already exists. Skip saving chapters.", path.display());
            return Ok(());
        }

        write_json(&path, chapters).await
    }

    async fn write_annotations(
        &self,
        item: &AcquisitionItem,
        dir: &Path,
        base: &str,
        token: &CancellationToken,
        job: &mut JobResult,
    ) -> Result<()> {
        let path = dir.join(annotations_filename(base)?);
        if path.exists() && !self.options.overwrite {
            tracing::info!("File {} already exists. Skip saving annotations.", path.display());
            return Ok(());
        }

        let annotations = self
            .options
            .retry
            .run("annotations", token, &mut job.retries, |_| {
                self.catalog.fetch_annotations(&item.id)
            })
            .await;

        match annotations {
            Ok(value) => write_json(&path, &value).await,
            Err(Error::ItemNotFound(_)) => {
                tracing::info!(item = %item.id, "No annotations for {}", item.title);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn record(snapshot: &mut ProgressSnapshot, result: &JobResult) {
    match result.status {
        JobStatus::Succeeded => snapshot.completed += 1,
        JobStatus::FailedRetryableExhausted | JobStatus::FailedPermanent => snapshot.failed += 1,
        JobStatus::Skipped => snapshot.skipped += 1,
    }
}

async fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| Error::from_io(path, e))?;
    tracing::debug!("Saved {}", path.display());
    Ok(())
}
