//! Resumable, validated HTTP transfers.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use reqwest::header::{CONTENT_RANGE, LOCATION, RANGE};
use reqwest::{Client, Response, StatusCode};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fs::{ensure_dir, resume_path, staging_path};
use crate::transfer::content::{parse_content_range, validate_response, AssetKind};
use crate::transfer::resume::ResumeState;
use crate::transfer::state::{TransferState, TransferStatus};

const MIB: u64 = 1024 * 1024;

/// Tunables for [`ResumableTransfer`].
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub max_redirects: usize,
    /// Timeout for establishing a connection and receiving response headers.
    pub request_timeout: Option<Duration>,
    /// Maximum silence between two body chunks.
    pub chunk_timeout: Option<Duration>,
    /// Assets larger than this are fetched in parts.
    pub part_threshold: u64,
    pub part_size: u64,
    /// Persist resume state after this many new bytes...
    pub persist_every: u64,
    /// ...or after this much time, whichever comes first.
    pub persist_interval: Duration,
    /// Re-fetch targets that already exist.
    pub overwrite: bool,
    pub user_agent: String,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            max_redirects: 10,
            request_timeout: Some(Duration::from_secs(10)),
            chunk_timeout: Some(Duration::from_secs(10)),
            part_threshold: 512 * MIB,
            part_size: 256 * MIB,
            persist_every: 4 * MIB,
            persist_interval: Duration::from_secs(2),
            overwrite: false,
            user_agent: concat!("audible-downloader/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl TransferOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_redirects: config.download.max_redirects,
            request_timeout: config.timeout(),
            chunk_timeout: config.timeout(),
            part_threshold: config.part_threshold_bytes(),
            part_size: config.part_size_bytes(),
            overwrite: config.download.overwrite,
            user_agent: config.account.user_agent.clone(),
            ..Self::default()
        }
    }
}

/// One asset to fetch.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub source: Url,
    pub target: PathBuf,
    pub expected_size: Option<u64>,
    /// Identity of the requested format, recorded in the resume state.
    pub format_key: String,
    pub asset: AssetKind,
}

/// Fetches remote assets into target files, resuming interrupted transfers.
///
/// Bytes land in staging files next to the target. Progress is recorded in a
/// `<target>.resume` sidecar; the target only appears once all bytes are
/// verified.
pub struct ResumableTransfer {
    client: Client,
    options: TransferOptions,
}

impl ResumableTransfer {
    pub fn new(options: TransferOptions) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(&options.user_agent)
            .redirect(reqwest::redirect::Policy::none());

        if let Some(timeout) = options.request_timeout {
            builder = builder.connect_timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Api(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, options })
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Fetch `request.source` into `request.target`.
    ///
    /// `resume` is the sidecar loaded by the caller, if any. Fetching a target
    /// that is already complete is a no-op. On error, staging files and the
    /// sidecar are kept for the next attempt unless the content itself was
    /// rejected.
    pub async fn transfer(
        &self,
        request: &TransferRequest,
        resume: Option<ResumeState>,
        cancel: &CancellationToken,
    ) -> Result<TransferState> {
        let target = &request.target;

        if resume.is_none() && !self.options.overwrite {
            if let Some(state) = self.existing_target(request).await? {
                return Ok(state);
            }
        }

        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }

        let resume = self.prepare(request, resume).await?;
        let mut state = TransferState::new(target.clone(), resume);

        if state.status == TransferStatus::Paused {
            tracing::info!(
                "Resuming {} at {} bytes",
                target.display(),
                state.bytes_written
            );
        }

        if let Err(e) = self.fetch_all(request, &mut state, cancel).await {
            return Err(self.abandon(request, &mut state, e).await);
        }

        self.finish(request, &mut state).await?;
        Ok(state)
    }

    async fn existing_target(&self, request: &TransferRequest) -> Result<Option<TransferState>> {
        let target = &request.target;
        let meta = match tokio::fs::metadata(target).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::from_io(target, e)),
        };

        if !meta.is_file() {
            return Err(Error::InvalidFilename(format!(
                "{} exists and is not a file",
                target.display()
            )));
        }

        match request.expected_size {
            Some(expected) if expected != meta.len() => {
                tracing::warn!(
                    "{} has {} bytes, expected {}; fetching again",
                    target.display(),
                    meta.len(),
                    expected
                );
                Ok(None)
            }
            _ => {
                tracing::info!("File {} already exists. Skip download.", target.display());
                Ok(Some(TransferState::already_complete(
                    target.clone(),
                    &request.format_key,
                    meta.len(),
                )))
            }
        }
    }

    /// Pick the resume record to continue from and bring staging files in
    /// line with it.
    async fn prepare(
        &self,
        request: &TransferRequest,
        resume: Option<ResumeState>,
    ) -> Result<ResumeState> {
        let mut resume = match resume {
            Some(r) if r.is_compatible(&request.format_key, request.expected_size) => r,
            Some(stale) => {
                tracing::info!(
                    "Format of {} changed since the last attempt, starting over",
                    request.target.display()
                );
                remove_staging(&request.target, &stale).await;
                self.plan(request)
            }
            None => self.plan(request),
        };

        for part in &mut resume.parts {
            let path = staging_path(&request.target, part.index);
            let on_disk = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta.len(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
                Err(e) => return Err(Error::from_io(&path, e)),
            };

            if on_disk > part.committed {
                // Bytes past the committed length were never acknowledged.
                let file = OpenOptions::new()
                    .write(true)
                    .open(&path)
                    .await
                    .map_err(|e| Error::from_io(&path, e))?;
                file.set_len(part.committed)
                    .await
                    .map_err(|e| Error::from_io(&path, e))?;
            } else if on_disk < part.committed {
                tracing::warn!(
                    "Staging file {} is shorter than recorded ({} < {})",
                    path.display(),
                    on_disk,
                    part.committed
                );
                part.committed = on_disk;
                part.complete = false;
            }
        }

        Ok(resume)
    }

    fn plan(&self, request: &TransferRequest) -> ResumeState {
        ResumeState::plan(
            &request.format_key,
            request.expected_size,
            self.options.part_threshold,
            self.options.part_size,
        )
    }

    async fn fetch_all(
        &self,
        request: &TransferRequest,
        state: &mut TransferState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        state.status = TransferStatus::InProgress;

        while let Some(index) = state.resume.next_incomplete() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.fetch_part(request, state, index, cancel).await?;
        }

        Ok(())
    }

    async fn fetch_part(
        &self,
        request: &TransferRequest,
        state: &mut TransferState,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let part = state.resume.parts[index].clone();
        let offset = part.offset();
        let ranged = state.resume.parts.len() > 1 || offset > 0;

        let range = ranged.then(|| match part.end {
            Some(end) => format!("bytes={}-{}", offset, end.saturating_sub(1)),
            None => format!("bytes={}-", offset),
        });

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = self.open(&request.source, range.as_deref()) => response?,
        };
        let status = response.status();

        let index = match status {
            StatusCode::PARTIAL_CONTENT if ranged => {
                let content_range = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_content_range);

                match content_range {
                    Some(r) if r.start == offset => {
                        if let (Some(total), Some(expected)) = (r.total, request.expected_size) {
                            if total != expected {
                                return Err(Error::UnexpectedContent {
                                    url: request.source.to_string(),
                                    reason: format!(
                                        "resource is {} bytes, expected {}",
                                        total, expected
                                    ),
                                });
                            }
                        }
                        index
                    }
                    _ => {
                        tracing::warn!(
                            "Unexpected range in response for {}, starting over",
                            request.target.display()
                        );
                        self.restart(request, state).await?;
                        return Ok(());
                    }
                }
            }
            StatusCode::OK if ranged => {
                tracing::info!(
                    "Server ignored range request for {}, starting over",
                    request.target.display()
                );
                self.restart(request, state).await?;
                0
            }
            StatusCode::RANGE_NOT_SATISFIABLE if ranged => {
                self.reset_part(request, state, index).await?;
                return Err(Error::Connection(format!(
                    "range {} not satisfiable for {}",
                    range.unwrap_or_default(),
                    request.source
                )));
            }
            s if s.is_success() => index,
            s => {
                return Err(Error::HttpStatus {
                    url: request.source.to_string(),
                    status: s.as_u16(),
                })
            }
        };

        let remaining = state.resume.parts[index].remaining();
        validate_response(request.asset, &request.source, response.headers(), remaining)?;

        self.stream_part(request, state, index, response, cancel)
            .await
    }

    /// Send a GET, following redirects by hand up to the configured limit.
    async fn open(&self, source: &Url, range: Option<&str>) -> Result<Response> {
        let mut url = source.clone();

        for hop in 0..=self.options.max_redirects {
            let mut builder = self.client.get(url.clone());
            if let Some(range) = range {
                builder = builder.header(RANGE, range);
            }

            // Only header arrival is bounded here; body reads use the chunk timeout.
            let sent = match self.options.request_timeout {
                Some(timeout) => tokio::time::timeout(timeout, builder.send())
                    .await
                    .map_err(|_| Error::Timeout(format!("request to {}", url)))?,
                None => builder.send().await,
            };
            let response = sent.map_err(|e| Error::from_request(url.as_str(), e))?;

            if !response.status().is_redirection() {
                return Ok(response);
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| Error::UnexpectedContent {
                    url: url.to_string(),
                    reason: format!("redirect {} without location", response.status()),
                })?;

            let next = url.join(location)?;
            tracing::debug!("Redirect {} -> {} (hop {})", url, next, hop + 1);
            url = next;
        }

        Err(Error::TooManyRedirects {
            url: source.to_string(),
            hops: self.options.max_redirects,
        })
    }

    async fn stream_part(
        &self,
        request: &TransferRequest,
        state: &mut TransferState,
        index: usize,
        response: Response,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let staging = staging_path(&request.target, index);
        let sidecar = resume_path(&request.target);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&staging)
            .await
            .map_err(|e| Error::from_io(&staging, e))?;

        let mut stream = Box::pin(response.bytes_stream());
        let mut unsaved = 0u64;
        let mut last_saved = Instant::now();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    checkpoint(&mut file, &staging, &state.resume, &sidecar).await?;
                    state.status = TransferStatus::Paused;
                    return Err(Error::Cancelled);
                }
                next = read_chunk(&mut stream, self.options.chunk_timeout, &request.source) => next,
            };

            let chunk = match next {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    checkpoint(&mut file, &staging, &state.resume, &sidecar).await?;
                    return Err(e);
                }
            };
            let len = chunk.len() as u64;

            if let Some(remaining) = state.resume.parts[index].remaining() {
                if len > remaining {
                    return Err(Error::UnexpectedContent {
                        url: request.source.to_string(),
                        reason: "more data than announced".to_string(),
                    });
                }
            }

            file.write_all(&chunk)
                .await
                .map_err(|e| Error::from_io(&staging, e))?;
            state.commit(index, len);
            unsaved += len;

            if unsaved >= self.options.persist_every
                || last_saved.elapsed() >= self.options.persist_interval
            {
                checkpoint(&mut file, &staging, &state.resume, &sidecar).await?;
                unsaved = 0;
                last_saved = Instant::now();
            }
        }

        let part = &mut state.resume.parts[index];
        match part.end {
            Some(end) if part.offset() < end => {
                let message = format!(
                    "connection closed at byte {} of {} for {}",
                    part.offset(),
                    end,
                    request.source
                );
                checkpoint(&mut file, &staging, &state.resume, &sidecar).await?;
                return Err(Error::Connection(message));
            }
            Some(_) => {}
            None => part.end = Some(part.offset()),
        }
        part.complete = true;

        checkpoint(&mut file, &staging, &state.resume, &sidecar).await
    }

    /// Drop all progress and continue as a single part from byte zero.
    async fn restart(&self, request: &TransferRequest, state: &mut TransferState) -> Result<()> {
        remove_staging(&request.target, &state.resume).await;
        state.reset(ResumeState::single(
            &request.format_key,
            request.expected_size,
        ));
        state.resume.save(&resume_path(&request.target)).await
    }

    async fn reset_part(
        &self,
        request: &TransferRequest,
        state: &mut TransferState,
        index: usize,
    ) -> Result<()> {
        let path = staging_path(&request.target, index);
        remove_file_quiet(&path).await;

        let part = &mut state.resume.parts[index];
        state.bytes_written -= part.committed;
        part.committed = 0;
        part.complete = false;

        state.resume.save(&resume_path(&request.target)).await
    }

    /// Decide what survives a failed attempt.
    async fn abandon(&self, request: &TransferRequest, state: &mut TransferState, err: Error) -> Error {
        match err {
            Error::UnexpectedContent { .. } | Error::SizeMismatch { .. } => {
                state.status = TransferStatus::Failed;
                discard(&request.target, &state.resume).await;
            }
            _ => {
                state.status = TransferStatus::Paused;
                if let Err(save_err) = state.resume.save(&resume_path(&request.target)).await {
                    tracing::warn!(
                        "Failed to persist resume state for {}: {}",
                        request.target.display(),
                        save_err
                    );
                }
            }
        }

        tracing::debug!(
            "Transfer of {} {} at {} bytes: {}",
            request.target.display(),
            state.status,
            state.bytes_written,
            err
        );
        err
    }

    /// Assemble parts, verify the size and move the result into place.
    async fn finish(&self, request: &TransferRequest, state: &mut TransferState) -> Result<()> {
        let target = &request.target;
        let first = staging_path(target, 0);

        if state.resume.parts.len() > 1 {
            if let Err(e) = concat_parts(target, &state.resume).await {
                discard(target, &state.resume).await;
                return Err(e);
            }
        }

        let actual = tokio::fs::metadata(&first)
            .await
            .map_err(|e| Error::from_io(&first, e))?
            .len();
        let expected = request.expected_size.unwrap_or(state.resume.committed());

        if actual != expected {
            discard(target, &state.resume).await;
            state.status = TransferStatus::Failed;
            return Err(Error::SizeMismatch {
                path: target.clone(),
                expected,
                actual,
            });
        }

        tokio::fs::rename(&first, target)
            .await
            .map_err(|e| Error::from_io(target, e))?;
        ResumeState::remove(&resume_path(target)).await?;

        state.bytes_written = actual;
        state.status = TransferStatus::Complete;
        tracing::debug!("Completed {} ({} bytes)", target.display(), actual);
        Ok(())
    }
}

async fn read_chunk<S, B>(stream: &mut S, timeout: Option<Duration>, url: &Url) -> Result<Option<B>>
where
    S: Stream<Item = reqwest::Result<B>> + Unpin,
{
    let next = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, stream.next())
            .await
            .map_err(|_| Error::Timeout(format!("reading {}", url)))?,
        None => stream.next().await,
    };

    match next {
        Some(Ok(chunk)) => Ok(Some(chunk)),
        Some(Err(e)) => Err(Error::from_request(url.as_str(), e)),
        None => Ok(None),
    }
}

/// Flush written bytes, then record them as committed.
async fn checkpoint(
    file: &mut File,
    staging: &Path,
    resume: &ResumeState,
    sidecar: &Path,
) -> Result<()> {
    file.flush().await.map_err(|e| Error::from_io(staging, e))?;
    resume.save(sidecar).await
}

/// Append parts 1.. onto part 0, then remove them.
async fn concat_parts(target: &Path, resume: &ResumeState) -> Result<()> {
    let first = staging_path(target, 0);
    let mut out = OpenOptions::new()
        .append(true)
        .open(&first)
        .await
        .map_err(|e| Error::from_io(&first, e))?;

    for part in &resume.parts[1..] {
        let path = staging_path(target, part.index);
        let mut input = File::open(&path)
            .await
            .map_err(|e| Error::from_io(&path, e))?;
        tokio::io::copy(&mut input, &mut out)
            .await
            .map_err(|e| Error::from_io(&first, e))?;
    }
    out.flush().await.map_err(|e| Error::from_io(&first, e))?;

    for part in &resume.parts[1..] {
        remove_file_quiet(&staging_path(target, part.index)).await;
    }
    Ok(())
}

async fn remove_staging(target: &Path, resume: &ResumeState) {
    for part in &resume.parts {
        remove_file_quiet(&staging_path(target, part.index)).await;
    }
}

/// Remove staging files and the sidecar.
async fn discard(target: &Path, resume: &ResumeState) {
    remove_staging(target, resume).await;
    remove_file_quiet(&resume_path(target)).await;
}

async fn remove_file_quiet(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
