//! melodrop - download-job tracker for yt-dlp and spotdl
//!
//! Accepts music URLs, runs the external downloaders, scrapes their progress
//! into an in-memory job registry and serves the results over HTTP.
//!
//! # Module Structure
//!
//! - `core`: Configuration, errors, logging, process helpers and the HTTP server
//! - `download`: Tool selection, launcher, progress parsers, track counting, admission
//! - `jobs`: Job records and the registry
//! - `storage`: Batch archives and download-directory stats

pub mod cli;
pub mod core;
pub mod download;
pub mod jobs;
pub mod storage;

// Re-export commonly used types for convenience
pub use crate::core::{config, AppError, AppResult, Config};
pub use download::{Launcher, Tool, ToolOptions};
pub use jobs::{JobKey, JobRecord, JobRegistry, JobStatus};
