//! Background download jobs, at most one active per consumer key.
//!
//! A job is a `tokio::spawn` worker streaming one artifact to disk. The
//! manager owns the registry; workers report progress by mutating their own
//! entry under the registry lock. Cancellation is cooperative: `stop` only
//! flips a flag, and the worker notices between chunks. Partial files never
//! survive a cancelled or failed transfer.

pub mod path;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::api::types::{Model, ModelVersion};
use crate::api::{ApiError, CatalogClient};
use crate::filter::preview::{pick_sidecar_image, sidecar_extension};
use path::{DestinationResolver, safe_join, sanitize_filename};

/// Minimum wall-clock gap between progress writes when the integer percent
/// has not moved.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(800);

const MIB: u64 = 1024 * 1024;

/// Lifecycle of one download job. Idle is the absence of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Finished,
    Cancelled,
    Failed,
}

impl JobStatus {
    /// Terminal states never transition again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }
}

/// Why a worker stopped short of a finished file. Never escapes to callers;
/// the worker folds it into the job's status fields.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("no download URL available")]
    NoDownloadUrl,
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Poll-relevant copy of a job's fields.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub filename: String,
    pub dest_path: PathBuf,
    pub status: JobStatus,
    pub bytes_done: u64,
    /// 0 when the server did not announce a length.
    pub bytes_total: u64,
    pub percent: u8,
    pub message: String,
}

/// Diff-tracked poll result for the progress reporter.
#[derive(Debug)]
pub(crate) struct PollDiff {
    pub snapshot: JobSnapshot,
    pub progress_changed: bool,
    pub status_changed: bool,
}

type ProgressMark = (u8, u64, u64);

struct Job {
    filename: String,
    dest_path: PathBuf,
    status: JobStatus,
    bytes_done: u64,
    bytes_total: u64,
    percent: u8,
    message: String,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    last_emitted: Option<(ProgressMark, String)>,
}

impl Job {
    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            filename: self.filename.clone(),
            dest_path: self.dest_path.clone(),
            status: self.status,
            bytes_done: self.bytes_done,
            bytes_total: self.bytes_total,
            percent: self.percent,
            message: self.message.clone(),
        }
    }

    fn is_active(&self) -> bool {
        !self.status.is_terminal()
            && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

type Registry = Arc<Mutex<HashMap<String, Job>>>;

/// Outcome of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The flag was set; the worker will wind down shortly.
    Stopping,
    /// Nothing was running under that key.
    NoActive,
}

/// Starts, observes, and cancels download workers.
pub struct DownloadJobManager {
    jobs: Registry,
    client: Arc<CatalogClient>,
    dirs: Arc<dyn DestinationResolver>,
}

impl DownloadJobManager {
    #[must_use]
    pub fn new(client: Arc<CatalogClient>, dirs: Arc<dyn DestinationResolver>) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            client,
            dirs,
        }
    }

    /// Starts a download for `key`, or reports the one already running.
    ///
    /// Synchronous apart from a destination existence check: when the file
    /// is already on disk the job is recorded as finished without touching
    /// the network; otherwise a worker task is spawned and the returned
    /// snapshot shows it running.
    #[instrument(skip(self, model, version, api_key), fields(key))]
    pub fn start(
        &self,
        key: &str,
        model: &Model,
        version: &ModelVersion,
        api_key: &str,
    ) -> JobSnapshot {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = jobs.get(key) {
            if existing.is_active() {
                debug!(key, "download already in progress, ignoring start");
                return existing.snapshot();
            }
        }

        let category = model.kind.as_deref().unwrap_or("Other");
        let dir = self.dirs.resolve_dir(category);

        let (url_hint, name_hint) = version.pick_download();
        let filename = sanitize_filename(&name_hint.map_or_else(
            || {
                format!(
                    "{}_{}.safetensors",
                    model.id.unwrap_or(0),
                    version.id.unwrap_or(0)
                )
            },
            ToString::to_string,
        ));
        let dest_path = safe_join(&dir, &filename);

        if let Ok(meta) = std::fs::metadata(&dest_path) {
            info!(key, path = %dest_path.display(), "destination already present");
            let job = Job {
                filename: filename.clone(),
                dest_path,
                status: JobStatus::Finished,
                bytes_done: meta.len(),
                bytes_total: meta.len(),
                percent: 100,
                message: format!("Already exists: {filename}"),
                cancel: Arc::new(AtomicBool::new(false)),
                handle: None,
                last_emitted: None,
            };
            let snapshot = job.snapshot();
            jobs.insert(key.to_string(), job);
            return snapshot;
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            jobs: Arc::clone(&self.jobs),
            client: Arc::clone(&self.client),
            key: key.to_string(),
            category: category.to_string(),
            version: version.clone(),
            url_hint: url_hint.map(ToString::to_string),
            api_key: api_key.to_string(),
            dir,
            filename: filename.clone(),
            dest_path: dest_path.clone(),
            cancel: Arc::clone(&cancel),
        };
        let handle = tokio::spawn(worker.run());

        let job = Job {
            filename: filename.clone(),
            dest_path,
            status: JobStatus::Running,
            bytes_done: 0,
            bytes_total: 0,
            percent: 0,
            message: format!("Downloading {filename}..."),
            cancel,
            handle: Some(handle),
            last_emitted: None,
        };
        let snapshot = job.snapshot();
        jobs.insert(key.to_string(), job);
        snapshot
    }

    /// Requests cancellation of the job under `key`. Returns immediately;
    /// the worker observes the flag between chunks.
    #[instrument(skip(self), fields(key))]
    pub fn stop(&self, key: &str) -> StopOutcome {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        match jobs.get_mut(key) {
            Some(job) if job.is_active() => {
                job.cancel.store(true, Ordering::SeqCst);
                job.message = "Stopping current download...".to_string();
                info!(key, "cancellation requested");
                StopOutcome::Stopping
            }
            _ => {
                debug!(key, "stop requested with no active download");
                StopOutcome::NoActive
            }
        }
    }

    /// The current snapshot for `key`, if any job was ever started there.
    #[must_use]
    pub fn snapshot(&self, key: &str) -> Option<JobSnapshot> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(Job::snapshot)
    }

    /// Snapshot plus which facets changed since the previous poll. Updates
    /// the job's emission marker as a side effect.
    pub(crate) fn poll_diff(&self, key: &str) -> Option<PollDiff> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let job = jobs.get_mut(key)?;

        let mark: ProgressMark = (job.percent, job.bytes_done, job.bytes_total);
        let (progress_changed, status_changed) = match &job.last_emitted {
            Some((last_mark, last_message)) => {
                (*last_mark != mark, *last_message != job.message)
            }
            None => (true, true),
        };
        if progress_changed || status_changed {
            job.last_emitted = Some((mark, job.message.clone()));
        }
        Some(PollDiff {
            snapshot: job.snapshot(),
            progress_changed,
            status_changed,
        })
    }
}

/// Everything a worker task owns. Runs to completion exactly once and
/// records its outcome in the registry entry.
struct Worker {
    jobs: Registry,
    client: Arc<CatalogClient>,
    key: String,
    category: String,
    version: ModelVersion,
    url_hint: Option<String>,
    api_key: String,
    dir: PathBuf,
    filename: String,
    dest_path: PathBuf,
    cancel: Arc<AtomicBool>,
}

impl Worker {
    async fn run(self) {
        let result = self.transfer().await;
        match result {
            Ok((done, total)) => self.finish(done, total).await,
            Err(JobError::Cancelled) => {
                remove_partial(&self.dest_path).await;
                self.conclude(JobStatus::Cancelled, 0, 0, "Download cancelled.".to_string());
            }
            Err(JobError::NoDownloadUrl) => {
                self.conclude(
                    JobStatus::Failed,
                    0,
                    0,
                    "No download URL available for this version.".to_string(),
                );
            }
            Err(err) => {
                remove_partial(&self.dest_path).await;
                let message = match &err {
                    JobError::Api(ApiError::Unauthorized { .. }) => {
                        "Download failed: API key missing or invalid.".to_string()
                    }
                    other => format!("Download failed: {other}"),
                };
                warn!(key = %self.key, error = %err, "download failed");
                self.conclude(JobStatus::Failed, 0, 0, message);
            }
        }
    }

    /// Streams the artifact to disk, reporting progress along the way.
    /// Returns (bytes written, announced total).
    async fn transfer(&self) -> Result<(u64, u64), JobError> {
        let url = match &self.url_hint {
            Some(url) => url.clone(),
            None => {
                let version_id = self.version.id.ok_or(JobError::NoDownloadUrl)?;
                self.client.download_url_for_version(version_id)
            }
        };

        tokio::fs::create_dir_all(&self.dir).await?;

        let response = self.client.get(&url, &self.api_key).await?;
        let total = response.content_length().unwrap_or(0);
        self.update(|job| {
            job.bytes_total = total;
        });

        let mut file = tokio::fs::File::create(&self.dest_path).await?;
        let mut stream = response.bytes_stream();
        let mut done: u64 = 0;
        let mut last_percent: u8 = 0;
        let mut last_write = tokio::time::Instant::now();

        while let Some(chunk) = stream.next().await {
            if self.cancel.load(Ordering::SeqCst) {
                drop(file);
                return Err(JobError::Cancelled);
            }
            let chunk = chunk.map_err(|e| {
                JobError::Api(ApiError::Network {
                    url: url.clone(),
                    source: e,
                })
            })?;
            file.write_all(&chunk).await?;
            done += chunk.len() as u64;

            let percent = percent_of(done, total);
            let now = tokio::time::Instant::now();
            if percent != last_percent || now.duration_since(last_write) >= PROGRESS_INTERVAL {
                last_percent = percent;
                last_write = now;
                self.update(|job| {
                    job.bytes_done = done;
                    job.percent = percent;
                });
            }
        }
        file.flush().await?;

        Ok((done, total))
    }

    /// Records completion, attempting the preview sidecar for LORA files.
    async fn finish(&self, done: u64, total: u64) {
        let total = if total == 0 { done } else { total };
        let mut message = format!(
            "Downloaded: {} ({}) to {}",
            self.filename,
            format_transfer(done, total),
            self.dir.display()
        );

        if self.category.eq_ignore_ascii_case("lora") {
            match self.fetch_sidecar().await {
                Ok(Some(name)) => message.push_str(&format!(" Preview saved as {name}.")),
                Ok(None) => {}
                Err(err) => {
                    debug!(key = %self.key, error = %err, "preview sidecar skipped");
                    message.push_str(" Preview image could not be saved.");
                }
            }
        }

        info!(key = %self.key, file = %self.filename, bytes = done, "download finished");
        self.conclude(JobStatus::Finished, done, total, message);
    }

    /// Best-effort download of the first suitable preview image next to the
    /// artifact. Returns the sidecar filename when one was written.
    async fn fetch_sidecar(&self) -> Result<Option<String>, JobError> {
        let Some(image_url) = pick_sidecar_image(&self.version).map(ToString::to_string) else {
            return Ok(None);
        };

        let stem = self
            .dest_path
            .file_stem()
            .map_or_else(|| self.filename.clone(), |s| s.to_string_lossy().into_owned());
        let sidecar_name = format!("{stem}{}", sidecar_extension(&image_url));
        let sidecar_path = self.dir.join(&sidecar_name);
        if tokio::fs::try_exists(&sidecar_path).await.unwrap_or(false) {
            return Ok(None);
        }

        let response = self.client.get(&image_url, &self.api_key).await?;
        let bytes = response.bytes().await.map_err(|e| {
            JobError::Api(ApiError::Network {
                url: image_url.clone(),
                source: e,
            })
        })?;
        tokio::fs::write(&sidecar_path, &bytes).await?;
        Ok(Some(sidecar_name))
    }

    fn conclude(&self, status: JobStatus, done: u64, total: u64, message: String) {
        self.update(|job| {
            job.status = status;
            job.bytes_done = done;
            job.bytes_total = total;
            job.percent = match status {
                JobStatus::Finished => 100,
                _ => percent_of(done, total),
            };
            job.message = message;
        });
    }

    fn update(&self, apply: impl FnOnce(&mut Job)) {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(job) = jobs.get_mut(&self.key) {
            apply(job);
        }
    }
}

async fn remove_partial(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "could not remove partial file");
        }
    }
}

/// Renders a done/total pair with one unit; files under a mebibyte report
/// in KiB so small artifacts never show as "0/0 MiB".
fn format_transfer(done: u64, total: u64) -> String {
    const KIB: u64 = 1024;
    if total >= MIB {
        format!("{}/{} MiB", done / MIB, total / MIB)
    } else {
        format!("{}/{} KiB", done / KIB, total / KIB)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done.saturating_mul(100) / total).min(100)) as u8
}
