//! Process execution utilities with timeout support
//!
//! Bounded invocations (track counting, version checks) go through here so a hung
//! tool cannot stall an admission check. Download jobs are not bounded.

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

use crate::download::error::DownloadError;

/// Run an async Command with a timeout, collecting stdout and stderr.
///
/// The child is killed when the timeout fires.
pub async fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<Output, DownloadError> {
    cmd.kill_on_drop(true);
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(DownloadError::Spawn(format!("failed to launch {}: {}", program, e))),
        Err(_) => Err(DownloadError::Timeout(format!(
            "{} timed out after {}s",
            program,
            timeout.as_secs()
        ))),
    }
}
