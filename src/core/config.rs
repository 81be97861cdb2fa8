//! Service configuration
//!
//! Values are layered with figment: built-in defaults, then `melodrop.toml`
//! (or the file passed with `--config`), then `MELODROP_*` environment
//! variables. CLI flags are applied on top by `main`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::core::error::AppResult;
use crate::download::tool::ToolOptions;

/// Config file read when no `--config` flag is given. Missing is fine.
pub const DEFAULT_CONFIG_FILE: &str = "melodrop.toml";

/// Prefix for environment overrides, e.g. `MELODROP_PORT=9000`
pub const ENV_PREFIX: &str = "MELODROP_";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to
    pub host: String,
    pub port: u16,
    /// Root directory for batch folders and archives. Supports `~`.
    pub download_dir: String,
    /// Optional plain-text log file written next to console output
    pub log_file: Option<String>,

    pub ytdlp_bin: String,
    pub spotdl_bin: String,
    pub audio_format: String,
    pub audio_bitrate: String,
    pub spotdl_threads: u32,

    /// Estimated tracks a request may contain without a credential
    pub free_track_threshold: u32,
    /// Plain shared secret. Never logged.
    #[serde(deserialize_with = "deserialize_secret")]
    pub access_secret: Option<SecretString>,
    /// Hex HMAC tag of the secret, as printed by `melodrop hash-secret`
    pub access_secret_hash: Option<String>,

    pub count_timeout_secs: u64,
    /// Unset means every job starts immediately
    pub max_concurrent_downloads: Option<usize>,

    pub job_ttl_secs: u64,
    pub max_jobs: usize,
    pub reap_interval_secs: u64,

    /// Directory served at `/` (the web UI), if any
    pub static_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            download_dir: "~/Downloads/MusicDownloader".to_string(),
            log_file: Some("downloads.log".to_string()),
            ytdlp_bin: "yt-dlp".to_string(),
            spotdl_bin: "spotdl".to_string(),
            audio_format: "mp3".to_string(),
            audio_bitrate: "320k".to_string(),
            spotdl_threads: 4,
            free_track_threshold: 5,
            access_secret: None,
            access_secret_hash: None,
            count_timeout_secs: 60,
            max_concurrent_downloads: None,
            job_ttl_secs: 24 * 60 * 60,
            max_jobs: 10_000,
            reap_interval_secs: 300,
            static_dir: None,
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(SecretString::from))
}

impl Config {
    /// Load configuration from the given file (or `melodrop.toml`) and the environment.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let config = Figment::new()
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract::<Config>()?;

        Ok(config)
    }

    /// Download root with `~` expanded.
    pub fn download_dir_path(&self) -> PathBuf {
        expand_path(&self.download_dir)
    }

    pub fn static_dir_path(&self) -> Option<PathBuf> {
        self.static_dir.as_deref().map(expand_path)
    }

    pub fn tool_options(&self) -> ToolOptions {
        ToolOptions {
            ytdlp_bin: self.ytdlp_bin.clone(),
            spotdl_bin: self.spotdl_bin.clone(),
            audio_format: self.audio_format.clone(),
            audio_bitrate: self.audio_bitrate.clone(),
            spotdl_threads: self.spotdl_threads,
        }
    }

    pub fn count_timeout(&self) -> Duration {
        Duration::from_secs(self.count_timeout_secs)
    }

    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

/// Expand `~` in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

/// Request validation limits
pub mod validation {
    /// Maximum URL length (RFC 7230 recommends 8000, but we use 2048 for safety)
    pub const MAX_URL_LENGTH: usize = 2048;

    /// Maximum number of URLs accepted in one request
    pub const MAX_URLS_PER_REQUEST: usize = 100;
}

/// Batch directory and archive naming
pub mod batch {
    /// Upper bound on batch id length; longer ids are rejected before touching the filesystem
    pub const MAX_BATCH_ID_LEN: usize = 64;

    /// Extension of packaged batch archives
    pub const ARCHIVE_EXTENSION: &str = "zip";
}

/// Download stats endpoint
pub mod stats {
    /// Number of most recently modified files listed
    pub const RECENT_FILES_LIMIT: usize = 10;
}
