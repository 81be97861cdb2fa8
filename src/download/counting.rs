//! Track-count pre-check.
//!
//! Runs the downloaders in listing mode to estimate how many tracks a URL expands
//! to. The estimate only feeds admission control, so every failure degrades to
//! "one track" instead of an error.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::process::Command;
use uuid::Uuid;

use crate::core::process::run_with_timeout;
use crate::download::tool::{Tool, ToolOptions};

/// Estimates how many tracks a URL expands to.
#[async_trait]
pub trait TrackCounter: Send + Sync {
    /// Best-effort estimate, at least 1.
    async fn count(&self, url: &str) -> u32;
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UrlEstimate {
    pub url: String,
    pub tracks: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TrackEstimate {
    pub total_tracks: u32,
    pub urls: Vec<UrlEstimate>,
}

/// Counts all URLs concurrently.
pub async fn estimate_tracks(counter: &dyn TrackCounter, urls: &[String]) -> TrackEstimate {
    let counts = join_all(urls.iter().map(|url| counter.count(url))).await;

    let urls: Vec<UrlEstimate> = urls
        .iter()
        .zip(counts)
        .map(|(url, tracks)| UrlEstimate {
            url: url.clone(),
            tracks,
        })
        .collect();
    let total_tracks = urls.iter().map(|u| u.tracks).fold(0u32, u32::saturating_add);

    TrackEstimate { total_tracks, urls }
}

/// Counts by invoking yt-dlp / spotdl in listing mode.
pub struct ToolTrackCounter {
    options: Arc<ToolOptions>,
    timeout: Duration,
    /// Where spotdl writes its temporary `.spotdl` listing
    scratch_dir: PathBuf,
}

impl ToolTrackCounter {
    pub fn new(options: ToolOptions, timeout: Duration) -> Self {
        Self {
            options: Arc::new(options),
            timeout,
            scratch_dir: std::env::temp_dir(),
        }
    }

    pub fn with_scratch_dir(mut self, dir: PathBuf) -> Self {
        self.scratch_dir = dir;
        self
    }

    async fn count_ytdlp(&self, url: &str) -> Option<u32> {
        let args = self.options.count_args(Tool::YtDlp, url, &self.scratch_dir);
        let mut cmd = Command::new(&self.options.ytdlp_bin);
        cmd.args(&args);

        let output = match run_with_timeout(&mut cmd, self.timeout).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(url, kind = e.subcategory(), error = %e, "track count failed");
                return None;
            }
        };
        if !output.status.success() {
            tracing::warn!(url, status = %output.status, "track count exited with an error");
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let entries = stdout.lines().filter(|l| !l.trim().is_empty()).count();
        u32::try_from(entries).ok()
    }

    async fn count_spotdl(&self, url: &str) -> Option<u32> {
        let save_file = self.scratch_dir.join(format!("melodrop-count-{}.spotdl", Uuid::new_v4().simple()));
        let args = self.options.count_args(Tool::SpotDl, url, &save_file);
        let mut cmd = Command::new(&self.options.spotdl_bin);
        cmd.args(&args);

        let result = run_with_timeout(&mut cmd, self.timeout).await;
        let listing = fs_err::tokio::read_to_string(&save_file).await;
        let _ = fs_err::tokio::remove_file(&save_file).await;

        match result {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                tracing::warn!(url, status = %output.status, "track count exited with an error");
                return None;
            }
            Err(e) => {
                tracing::warn!(url, kind = e.subcategory(), error = %e, "track count failed");
                return None;
            }
        }

        let listing = listing
            .map_err(|e| tracing::warn!(url, error = %e, "spotdl did not write a listing"))
            .ok()?;
        count_spotdl_listing(&listing)
    }
}

/// Number of songs in a `.spotdl` save file (a JSON array of song objects).
pub fn count_spotdl_listing(listing: &str) -> Option<u32> {
    match serde_json::from_str::<serde_json::Value>(listing) {
        Ok(serde_json::Value::Array(songs)) => u32::try_from(songs.len()).ok(),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "unreadable spotdl listing");
            None
        }
    }
}

#[async_trait]
impl TrackCounter for ToolTrackCounter {
    async fn count(&self, url: &str) -> u32 {
        let counted = match Tool::for_url(url) {
            Tool::YtDlp => self.count_ytdlp(url).await,
            Tool::SpotDl => self.count_spotdl(url).await,
        };
        let tracks = counted.unwrap_or(1).max(1);
        tracing::debug!(url, tracks, "estimated track count");
        tracks
    }
}
