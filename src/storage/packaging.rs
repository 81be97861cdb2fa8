//! Lazy batch archives.
//!
//! The first request for a batch zips its directory; later requests get the
//! cached path. Concurrent first requests share one build through moka's
//! `try_get_with`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use moka::future::Cache;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::core::config::batch::ARCHIVE_EXTENSION;
use crate::core::error::{AppError, AppResult};
use crate::core::utils::is_valid_batch_id;
use crate::storage::walk_files;

/// Archives remembered at once; older entries are rebuilt from disk on demand
const MAX_CACHED_ARCHIVES: u64 = 1024;

pub struct BatchPackager {
    archives: Cache<PathBuf, PathBuf>,
    builds: AtomicU64,
}

impl Default for BatchPackager {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchPackager {
    pub fn new() -> Self {
        Self {
            archives: Cache::builder().max_capacity(MAX_CACHED_ARCHIVES).build(),
            builds: AtomicU64::new(0),
        }
    }

    /// How many archives this packager has actually written.
    pub fn builds(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }

    /// Path of the zip for `batch_id`, building it on first use.
    pub async fn archive(&self, download_root: &Path, batch_id: &str) -> AppResult<PathBuf> {
        if !is_valid_batch_id(batch_id) {
            return Err(AppError::Validation(format!("Invalid batch id: {}", batch_id)));
        }

        let batch_dir = download_root.join(batch_id);
        let archive_path = download_root.join(format!("{}.{}", batch_id, ARCHIVE_EXTENSION));

        if let Some(cached) = self.archives.get(&archive_path).await {
            if fs_err::tokio::metadata(&cached).await.is_ok() {
                return Ok(cached);
            }
            tracing::warn!(batch_id, path = %cached.display(), "cached archive vanished, rebuilding");
            self.archives.invalidate(&archive_path).await;
        }

        let build = self.build_once(batch_dir, archive_path.clone(), batch_id.to_string());
        self.archives.try_get_with(archive_path, build).await.map_err(unshare)
    }

    async fn build_once(&self, batch_dir: PathBuf, archive_path: PathBuf, batch_id: String) -> AppResult<PathBuf> {
        if fs_err::tokio::metadata(&archive_path).await.is_ok() {
            tracing::debug!(batch_id, "reusing archive found on disk");
            return Ok(archive_path);
        }
        if !batch_dir.is_dir() {
            return Err(AppError::NotFound(format!("Batch {} not found", batch_id)));
        }

        self.builds.fetch_add(1, Ordering::Relaxed);
        let target = archive_path.clone();
        let files = tokio::task::spawn_blocking(move || build_archive(&batch_dir, &target))
            .await
            .map_err(|e| anyhow!("archive task failed: {}", e))??;

        tracing::info!(batch_id, files, path = %archive_path.display(), "batch archive built");
        Ok(archive_path)
    }
}

/// Zips every finished file under `batch_dir` into `archive_path`.
///
/// Writes to a `.part` file first so a half-written archive is never served.
fn build_archive(batch_dir: &Path, archive_path: &Path) -> AppResult<usize> {
    let partial = archive_path.with_extension(format!("{}.part", ARCHIVE_EXTENSION));
    let files = walk_files(batch_dir)?;

    let mut zip = ZipWriter::new(fs_err::File::create(&partial)?);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    for path in &files {
        let name = path
            .strip_prefix(batch_dir)
            .map_err(|e| anyhow!("{} is outside the batch: {}", path.display(), e))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        zip.start_file(name, options)?;
        let mut source = fs_err::File::open(path)?;
        std::io::copy(&mut source, &mut zip)?;
    }
    zip.finish()?;

    fs_err::rename(&partial, archive_path)?;
    Ok(files.len())
}

fn unshare(err: Arc<AppError>) -> AppError {
    Arc::try_unwrap(err).unwrap_or_else(|shared| match shared.as_ref() {
        AppError::NotFound(msg) => AppError::NotFound(msg.clone()),
        AppError::Validation(msg) => AppError::Validation(msg.clone()),
        other => AppError::Anyhow(anyhow!("{}", other)),
    })
}
