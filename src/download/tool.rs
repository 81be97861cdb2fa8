//! Downloader selection and argument vectors.
//!
//! Spotify URLs go to spotdl, everything else to yt-dlp. Both are invoked with a
//! fixed option set; only format, bitrate and output directory vary.

use std::path::Path;

use serde::Serialize;
use strum::{AsRefStr, Display};

/// Substring (matched case-insensitively) that routes a URL to spotdl
const SPOTIFY_MARKER: &str = "spotify.com";

/// yt-dlp output template relative to the batch directory
const YTDLP_OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// External downloader used for one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
pub enum Tool {
    #[serde(rename = "yt-dlp")]
    #[strum(serialize = "yt-dlp")]
    YtDlp,
    #[serde(rename = "spotdl")]
    #[strum(serialize = "spotdl")]
    SpotDl,
}

impl Tool {
    /// Picks the downloader for a URL.
    pub fn for_url(url: &str) -> Self {
        if url.to_lowercase().contains(SPOTIFY_MARKER) {
            Tool::SpotDl
        } else {
            Tool::YtDlp
        }
    }
}

/// Binaries and the fixed quality options passed to them
#[derive(Debug, Clone)]
pub struct ToolOptions {
    pub ytdlp_bin: String,
    pub spotdl_bin: String,
    /// Target audio codec/extension, e.g. "mp3"
    pub audio_format: String,
    /// spotdl bitrate, e.g. "320k"
    pub audio_bitrate: String,
    pub spotdl_threads: u32,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            ytdlp_bin: "yt-dlp".to_string(),
            spotdl_bin: "spotdl".to_string(),
            audio_format: "mp3".to_string(),
            audio_bitrate: "320k".to_string(),
            spotdl_threads: 4,
        }
    }
}

impl ToolOptions {
    pub fn binary(&self, tool: Tool) -> &str {
        match tool {
            Tool::YtDlp => &self.ytdlp_bin,
            Tool::SpotDl => &self.spotdl_bin,
        }
    }

    /// Arguments for downloading `url` into `output_dir`.
    pub fn download_args(&self, tool: Tool, url: &str, output_dir: &Path) -> Vec<String> {
        match tool {
            Tool::SpotDl => vec![
                url.to_string(),
                "--output".to_string(),
                output_dir.display().to_string(),
                "--format".to_string(),
                self.audio_format.clone(),
                "--bitrate".to_string(),
                self.audio_bitrate.clone(),
                "--threads".to_string(),
                self.spotdl_threads.to_string(),
            ],
            Tool::YtDlp => vec![
                url.to_string(),
                "-f".to_string(),
                "bestaudio/best".to_string(),
                "--extract-audio".to_string(),
                "--audio-format".to_string(),
                self.audio_format.clone(),
                "--audio-quality".to_string(),
                "0".to_string(),
                "--embed-thumbnail".to_string(),
                "--add-metadata".to_string(),
                "--prefer-ffmpeg".to_string(),
                // one progress report per line instead of carriage-return redraws
                "--newline".to_string(),
                "-o".to_string(),
                output_dir.join(YTDLP_OUTPUT_TEMPLATE).display().to_string(),
            ],
        }
    }

    /// Arguments for listing what `url` expands to without downloading.
    ///
    /// spotdl writes its listing into `save_file`; yt-dlp prints one id per entry.
    pub fn count_args(&self, tool: Tool, url: &str, save_file: &Path) -> Vec<String> {
        match tool {
            Tool::SpotDl => vec![
                "save".to_string(),
                url.to_string(),
                "--save-file".to_string(),
                save_file.display().to_string(),
            ],
            Tool::YtDlp => vec![
                "--flat-playlist".to_string(),
                "--print".to_string(),
                "id".to_string(),
                "--no-warnings".to_string(),
                url.to_string(),
            ],
        }
    }
}
