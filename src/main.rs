use std::sync::Arc;

use anyhow::{bail, Result};
use futures_util::future::join_all;

use melodrop::cli::{Cli, Commands};
use melodrop::core::{init_logger, log_tools_configuration, start_web_server, startup_banner, utils, Config};
use melodrop::download::admission::credential_tag;
use melodrop::download::{estimate_tracks, Launcher, ToolTrackCounter};
use melodrop::jobs::{JobKey, JobRegistry, JobStatus};

/// Main entry point
///
/// Parses CLI arguments and dispatches to the selected subcommand. Without a
/// subcommand the HTTP server is started.
///
/// # Errors
/// Returns an error if configuration, logging or the selected command fails.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    if let Some(Commands::HashSecret { secret }) = &cli.command {
        println!("{}", credential_tag(secret)?);
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        None => run_server(config).await,
        Some(Commands::Serve {
            host,
            port,
            download_dir,
        }) => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(dir) = download_dir {
                config.download_dir = dir;
            }
            run_server(config).await
        }
        Some(Commands::Download { urls, download_dir }) => {
            if let Some(dir) = download_dir {
                config.download_dir = dir;
            }
            init_logger(config.log_file.as_deref())?;
            run_download(&config, &urls).await
        }
        Some(Commands::Count { urls }) => {
            init_logger(None)?;
            run_count(&config, &urls).await
        }
        Some(Commands::HashSecret { .. }) => Ok(()),
    }
}

async fn run_server(config: Config) -> Result<()> {
    init_logger(config.log_file.as_deref())?;

    for line in startup_banner(&config).lines() {
        tracing::info!("{}", line);
    }
    log_tools_configuration(&config.tool_options()).await;

    start_web_server(&config).await
}

/// Runs the launcher in the foreground and waits for every job to settle.
async fn run_download(config: &Config, urls: &[String]) -> Result<()> {
    let urls = utils::normalize_urls(urls)?;
    let registry = Arc::new(JobRegistry::new(config.job_ttl(), config.max_jobs));
    let launcher = Launcher::new(Arc::clone(&registry), config.tool_options(), config.max_concurrent_downloads);

    let submission = launcher.submit(None, &urls, &config.download_dir_path()).await?;
    println!("Batch {} -> {}", submission.batch_id, submission.batch_dir.display());

    for result in join_all(submission.tasks).await {
        if let Err(e) = result {
            tracing::error!(error = %e, "download task panicked");
        }
    }

    let mut failed = 0;
    for url in &submission.accepted {
        let Some(record) = registry.get(&JobKey::new(None, url)) else {
            continue;
        };
        match record.status {
            JobStatus::Completed => println!("  ok      {}", url),
            _ => {
                failed += 1;
                let error = record.error.unwrap_or_else(|| record.status.to_string());
                println!("  failed  {}\n          {}", url, error.replace('\n', "\n          "));
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} downloads failed", failed, submission.accepted.len());
    }
    Ok(())
}

async fn run_count(config: &Config, urls: &[String]) -> Result<()> {
    let urls = utils::normalize_urls(urls)?;
    let counter = ToolTrackCounter::new(config.tool_options(), config.count_timeout());

    let estimate = estimate_tracks(&counter, &urls).await;
    for entry in &estimate.urls {
        println!("{:>6}  {}", entry.tracks, entry.url);
    }
    println!("{:>6}  total", estimate.total_tracks);
    if estimate.total_tracks > config.free_track_threshold {
        println!("over the free limit of {}: a credential is required", config.free_track_threshold);
    }
    Ok(())
}
