//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + optional file)
//! - External tool availability check
//! - Startup banner

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use indoc::formatdoc;
use tokio::process::Command;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Config;
use crate::core::process::run_with_timeout;
use crate::download::tool::ToolOptions;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info,tower_http=warn";

const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Initialize the tracing subscriber for console and, optionally, file output
///
/// # Arguments
/// * `log_file_path` - Path of a plain-text log file to append to, if any
pub fn init_logger(log_file_path: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = match log_file_path {
        Some(path) => {
            let file = fs_err::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow!("Failed to open log file: {}", e))?;
            let (file, _) = file.into_parts();
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs whether the external downloaders can be started
///
/// Missing tools are not fatal: the service still starts and affected jobs
/// end up `failed` with a launch error.
pub async fn log_tools_configuration(options: &ToolOptions) {
    for bin in [&options.ytdlp_bin, &options.spotdl_bin] {
        let mut cmd = Command::new(bin);
        cmd.arg("--version");
        match run_with_timeout(&mut cmd, VERSION_CHECK_TIMEOUT).await {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                tracing::info!(tool = %bin, version = %version.trim(), "downloader available");
            }
            Ok(output) => {
                tracing::warn!(tool = %bin, status = %output.status, "downloader returned an error for --version");
            }
            Err(e) => {
                tracing::error!(tool = %bin, error = %e, "downloader not available, jobs using it will fail");
            }
        }
    }
}

/// Human-readable startup banner
pub fn startup_banner(config: &Config) -> String {
    formatdoc! {"
        melodrop {version}
          listening on  http://{host}:{port}
          downloads in  {dir}
          free tracks   {threshold} (credential {credential})",
        version = env!("CARGO_PKG_VERSION"),
        host = config.host,
        port = config.port,
        dir = config.download_dir_path().display(),
        threshold = config.free_track_threshold,
        credential = if config.access_secret.is_some() || config.access_secret_hash.is_some() {
            "configured"
        } else {
            "not configured"
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_mentions_port_and_threshold() {
        let config = Config {
            port: 8123,
            download_dir: "/srv/music".to_string(),
            ..Config::default()
        };
        let banner = startup_banner(&config);
        assert!(banner.contains("http://0.0.0.0:8123"));
        assert!(banner.contains("/srv/music"));
        assert!(banner.contains("free tracks   5 (credential not configured)"));
    }

    #[tokio::test]
    async fn test_tools_check_tolerates_missing_binaries() {
        let options = ToolOptions {
            ytdlp_bin: "/nonexistent/yt-dlp".to_string(),
            spotdl_bin: "/nonexistent/spotdl".to_string(),
            ..ToolOptions::default()
        };
        log_tools_configuration(&options).await;
    }
}
