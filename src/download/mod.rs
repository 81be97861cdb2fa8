//! Download management: tool selection, process launching, progress scraping,
//! track counting and admission control

pub mod admission;
pub mod counting;
pub mod error;
pub mod launcher;
pub mod progress;
pub mod tool;

// Re-exports for convenience
pub use admission::{AccessCredential, AdmissionPolicy};
pub use counting::{estimate_tracks, ToolTrackCounter, TrackCounter, TrackEstimate};
pub use error::DownloadError;
pub use launcher::{Launcher, Submission};
pub use progress::{ProgressEvent, ProgressParser};
pub use tool::{Tool, ToolOptions};
