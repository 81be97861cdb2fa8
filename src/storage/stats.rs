//! Download directory statistics

use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use itertools::Itertools;
use serde::Serialize;

use crate::core::config::stats::RECENT_FILES_LIMIT;
use crate::core::error::AppResult;
use crate::core::utils::bytes_to_mb;
use crate::storage::walk_files;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecentFile {
    pub name: String,
    pub size_mb: f64,
    /// Local modification time, `%Y-%m-%d %H:%M`
    pub date: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DownloadStats {
    pub total_files: usize,
    pub total_size_mb: f64,
    pub recent_files: Vec<RecentFile>,
}

struct AudioFile {
    name: String,
    size: u64,
    modified: SystemTime,
}

/// Stats over every `*.{extension}` file under `dir`. A missing `dir` gives zeros.
///
/// Blocking; call from `spawn_blocking` inside the server.
pub fn collect_stats(dir: &Path, extension: &str) -> AppResult<DownloadStats> {
    let mut files = Vec::new();
    for path in walk_files(dir)? {
        let matches = path
            .extension()
            .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension));
        if !matches {
            continue;
        }
        let meta = fs_err::metadata(&path)?;
        files.push(AudioFile {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: meta.len(),
            modified: meta.modified()?,
        });
    }

    let total_bytes: u64 = files.iter().map(|f| f.size).sum();
    let recent_files = files
        .iter()
        .sorted_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)))
        .take(RECENT_FILES_LIMIT)
        .map(|f| RecentFile {
            name: f.name.clone(),
            size_mb: bytes_to_mb(f.size),
            date: DateTime::<Local>::from(f.modified).format("%Y-%m-%d %H:%M").to_string(),
        })
        .collect();

    Ok(DownloadStats {
        total_files: files.len(),
        total_size_mb: bytes_to_mb(total_bytes),
        recent_files,
    })
}
