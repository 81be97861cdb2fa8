use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use uuid::Uuid;

use crate::download::progress::ProgressEvent;
use crate::download::tool::Tool;

/// Job lifecycle state. Moves forward only; `Completed` and `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Status of one URL download, as returned by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    /// Identifies one submission; a later resubmission of the URL gets a new id
    pub job_id: Uuid,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    pub tool: Tool,
    pub status: JobStatus,
    /// Advisory percentage scraped from tool output
    pub progress: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub total_songs: Option<u32>,
    pub completed_songs: Option<u32>,
    pub batch_id: Option<String>,
    /// Directory the job downloads into; kept server-side
    #[serde(skip)]
    pub batch_dir: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(url: &str, session: Option<String>, batch_id: Option<String>, status: JobStatus) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4(),
            url: url.to_string(),
            session,
            tool: Tool::for_url(url),
            status,
            progress: 0.0,
            error: None,
            total_songs: None,
            completed_songs: None,
            batch_id,
            batch_dir: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records where the job writes its files.
    pub fn in_dir(mut self, dir: PathBuf) -> Self {
        self.batch_dir = Some(dir);
        self
    }

    /// `queued -> downloading`. No-op in any other state.
    pub fn start(&mut self) {
        if self.status == JobStatus::Queued {
            self.status = JobStatus::Downloading;
            self.touch();
        }
    }

    /// Folds one scraped event into the record.
    ///
    /// Progress only moves up: yt-dlp reports separate 0-100 runs for each stream
    /// and playlist item, and the aggregate over items is what clients poll.
    pub fn apply(&mut self, event: ProgressEvent) {
        if self.status.is_terminal() {
            return;
        }

        match event {
            ProgressEvent::Percent(percent) => {
                let overall = match self.total_songs {
                    Some(total) if total > 1 => {
                        let done = self.completed_songs.unwrap_or(0) as f32;
                        (done + percent / 100.0) / total as f32 * 100.0
                    }
                    _ => percent,
                };
                self.raise_progress(overall);
            }
            ProgressEvent::ItemStarted { index, total } => {
                let total = total.max(1);
                let done = index.saturating_sub(1).min(total);
                self.total_songs = Some(total);
                self.completed_songs = Some(done);
                self.raise_progress(done as f32 / total as f32 * 100.0);
            }
            ProgressEvent::TotalItems(total) => {
                self.total_songs = Some(total);
                self.completed_songs.get_or_insert(0);
            }
            ProgressEvent::ItemFinished => {
                let mut done = self.completed_songs.unwrap_or(0).saturating_add(1);
                if let Some(total) = self.total_songs {
                    done = done.min(total);
                    if total > 0 {
                        self.raise_progress(done as f32 / total as f32 * 100.0);
                    }
                }
                self.completed_songs = Some(done);
            }
        }
        self.touch();
    }

    /// Terminal success: progress is forced to exactly 100.
    pub fn complete(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Completed;
        self.progress = 100.0;
        self.error = None;
        if self.total_songs.is_some() {
            self.completed_songs = self.total_songs;
        }
        self.touch();
    }

    /// Terminal failure with a human-readable, non-empty error.
    pub fn fail(&mut self, error: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        let error = error.into();
        let error = error.trim();
        self.status = JobStatus::Failed;
        self.progress = 0.0;
        self.error = Some(if error.is_empty() {
            "Download failed".to_string()
        } else {
            error.to_string()
        });
        self.touch();
    }

    fn raise_progress(&mut self, value: f32) {
        if value.is_finite() {
            self.progress = self.progress.max(value.clamp(0.0, 100.0));
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
