//! Process launcher and progress scraper.
//!
//! `submit` registers one record per URL and then spawns one task per URL. Each
//! task runs the selected downloader, folds parsed stdout lines into its own
//! record, and finishes it as `completed` or `failed` once the process exits.
//! There is no retry and no cancellation.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::error::{AppError, AppResult};
use crate::download::error::DownloadError;
use crate::download::progress::parser_for;
use crate::download::tool::{Tool, ToolOptions};
use crate::jobs::{JobKey, JobRecord, JobRegistry, JobStatus};

/// Stderr lines kept in a failed record
const ERROR_TAIL_LINES: usize = 20;

/// Result of accepting a set of URLs.
pub struct Submission {
    pub batch_id: String,
    pub batch_dir: PathBuf,
    /// URLs that got a new job
    pub accepted: Vec<String>,
    /// URLs skipped because a job for the same key was still running
    pub skipped: Vec<String>,
    /// One handle per accepted URL. Dropping them detaches the jobs.
    pub tasks: Vec<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct Launcher {
    registry: Arc<JobRegistry>,
    options: Arc<ToolOptions>,
    permits: Option<Arc<Semaphore>>,
}

/// Everything one job task owns.
struct JobContext {
    registry: Arc<JobRegistry>,
    options: Arc<ToolOptions>,
    permits: Option<Arc<Semaphore>>,
    key: JobKey,
    job_id: Uuid,
    batch_id: String,
    batch_dir: PathBuf,
}

impl Launcher {
    pub fn new(registry: Arc<JobRegistry>, options: ToolOptions, max_concurrent: Option<usize>) -> Self {
        Self {
            registry,
            options: Arc::new(options),
            permits: max_concurrent.map(|n| Arc::new(Semaphore::new(n.max(1)))),
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &ToolOptions {
        &self.options
    }

    /// Accepts URLs as one batch under `download_root`.
    ///
    /// Every record exists in the registry before its process is spawned. The
    /// batch directory is created only when at least one URL is accepted.
    pub async fn submit(&self, session: Option<&str>, urls: &[String], download_root: &Path) -> AppResult<Submission> {
        let batch_id = new_batch_id();
        let batch_dir = download_root.join(&batch_id);

        let initial = if self.permits.is_some() {
            JobStatus::Queued
        } else {
            JobStatus::Downloading
        };

        let mut accepted = Vec::with_capacity(urls.len());
        let mut skipped = Vec::new();
        let mut contexts = Vec::with_capacity(urls.len());

        for url in urls {
            let key = JobKey::new(session, url);
            let record = JobRecord::new(url, session.map(str::to_string), Some(batch_id.clone()), initial)
                .in_dir(batch_dir.clone());
            let job_id = record.job_id;

            match self.registry.begin(key.clone(), record) {
                Ok(()) => {
                    accepted.push(url.clone());
                    contexts.push(JobContext {
                        registry: Arc::clone(&self.registry),
                        options: Arc::clone(&self.options),
                        permits: self.permits.clone(),
                        key,
                        job_id,
                        batch_id: batch_id.clone(),
                        batch_dir: batch_dir.clone(),
                    });
                }
                Err(AppError::Conflict(reason)) => {
                    tracing::info!(url = %url, %reason, "skipping duplicate submission");
                    skipped.push(url.clone());
                }
                Err(e) => return Err(e),
            }
        }

        if !contexts.is_empty() {
            if let Err(e) = fs_err::tokio::create_dir_all(&batch_dir).await {
                for ctx in &contexts {
                    self.registry.update(&ctx.key, ctx.job_id, |r| r.fail(e.to_string()));
                }
                return Err(e.into());
            }
        }

        let tasks = contexts.into_iter().map(|ctx| tokio::spawn(run_job(ctx))).collect();

        tracing::info!(
            batch_id = %batch_id,
            accepted = accepted.len(),
            skipped = skipped.len(),
            "downloads started"
        );

        Ok(Submission {
            batch_id,
            batch_dir,
            accepted,
            skipped,
            tasks,
        })
    }
}

/// Batch ids are UTC timestamps plus a random suffix, e.g. `20240131_154501_042_9f3b2c1a`.
pub fn new_batch_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S_%3f"), &suffix[..8])
}

async fn run_job(ctx: JobContext) {
    let JobContext {
        registry,
        options,
        permits,
        key,
        job_id,
        batch_id,
        batch_dir,
    } = ctx;

    let _permit = match permits {
        Some(semaphore) => match semaphore.acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                registry.update(&key, job_id, |r| r.fail("Download queue closed"));
                return;
            }
        },
        None => None,
    };
    registry.update(&key, job_id, JobRecord::start);

    let tool = Tool::for_url(&key.url);
    tracing::info!(url = %key.url, %job_id, %batch_id, %tool, "starting download");

    match run_tool(&registry, &key, job_id, tool, &options, &batch_dir).await {
        Ok(()) => {
            registry.update(&key, job_id, JobRecord::complete);
            tracing::info!(url = %key.url, %job_id, "download completed");
        }
        Err(e) => {
            tracing::error!(url = %key.url, %job_id, kind = e.subcategory(), error = %e, "download failed");
            registry.update(&key, job_id, |r| r.fail(e.message()));
        }
    }
}

async fn run_tool(
    registry: &JobRegistry,
    key: &JobKey,
    job_id: Uuid,
    tool: Tool,
    options: &ToolOptions,
    batch_dir: &Path,
) -> Result<(), DownloadError> {
    let bin = options.binary(tool);
    let args = options.download_args(tool, &key.url, batch_dir);
    tracing::debug!(command = %format!("{} {}", bin, args.join(" ")), "running downloader");

    let mut child = Command::new(bin)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| DownloadError::Spawn(format!("failed to launch {}: {}", bin, e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| DownloadError::Io(format!("{} stdout was not captured", bin)))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| DownloadError::Io(format!("{} stderr was not captured", bin)))?;

    // drained concurrently so a chatty stderr cannot block the child
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Err(e) = stderr.read_to_end(&mut buf).await {
            tracing::warn!(error = %e, "failed to read downloader stderr");
        }
        buf
    });

    let parser = parser_for(tool);
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let chunk = String::from_utf8_lossy(&buf);
                for line in chunk.split('\r').map(str::trim).filter(|l| !l.is_empty()) {
                    tracing::trace!(url = %key.url, line, "downloader output");
                    if let Some(event) = parser.parse(line) {
                        registry.update(key, job_id, |r| r.apply(event));
                    }
                }
            }
            Err(e) => {
                tracing::warn!(url = %key.url, error = %e, "stopped reading downloader output");
                break;
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|e| DownloadError::Io(format!("failed waiting for {}: {}", bin, e)))?;
    let stderr = stderr_task.await.unwrap_or_default();

    if status.success() {
        return Ok(());
    }

    let text = String::from_utf8_lossy(&stderr);
    let tail = tail_lines(&text, ERROR_TAIL_LINES);
    if tail.is_empty() {
        Err(DownloadError::Exit(format!("{} exited with {}", bin, status)))
    } else {
        Err(DownloadError::Exit(tail))
    }
}

/// Last `n` non-empty lines of `text`, trimmed.
fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim_end).filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
