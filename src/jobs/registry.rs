//! In-memory job registry.
//!
//! Owned by the application state and shared by `Arc`. Each record is written only
//! by the task holding its `job_id`, so the per-shard locks of `DashMap` are the only
//! synchronization needed. Terminal records are reclaimed by `reap`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::error::{AppError, AppResult};
use crate::jobs::record::JobRecord;

/// Registry key: a URL, optionally scoped to a caller session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub session: Option<String>,
    pub url: String,
}

impl JobKey {
    pub fn new(session: Option<&str>, url: &str) -> Self {
        Self {
            session: session.map(str::to_string),
            url: url.to_string(),
        }
    }
}

/// All jobs submitted together, as returned by the batch endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub batch_id: String,
    /// True once every job of the batch is completed or failed
    pub settled: bool,
    pub jobs: Vec<JobRecord>,
    /// Directory the batch was downloaded into, whatever the current root is
    #[serde(skip)]
    pub dir: Option<PathBuf>,
}

pub struct JobRegistry {
    jobs: DashMap<JobKey, JobRecord>,
    /// Terminal records older than this are dropped by `reap`
    ttl: Duration,
    /// Soft capacity; only terminal records are ever evicted to meet it
    max_jobs: usize,
}

impl JobRegistry {
    pub fn new(ttl: Duration, max_jobs: usize) -> Self {
        Self {
            jobs: DashMap::new(),
            ttl,
            max_jobs,
        }
    }

    /// Unconditional insert or replace.
    pub fn put(&self, key: JobKey, record: JobRecord) {
        self.jobs.insert(key, record);
    }

    pub fn get(&self, key: &JobKey) -> Option<JobRecord> {
        self.jobs.get(key).map(|r| r.value().clone())
    }

    /// Registers a new job unless an unfinished job already holds the key.
    ///
    /// A key whose previous job is terminal is taken over by the new job; the old
    /// record is replaced, not modified.
    pub fn begin(&self, key: JobKey, record: JobRecord) -> AppResult<()> {
        match self.jobs.entry(key) {
            Entry::Occupied(entry) if !entry.get().status.is_terminal() => {
                return Err(AppError::Conflict(format!(
                    "{} is already being downloaded",
                    entry.key().url
                )));
            }
            Entry::Occupied(mut entry) => {
                entry.insert(record);
            }
            Entry::Vacant(entry) => {
                entry.insert(record);
            }
        }

        if self.jobs.len() > self.max_jobs {
            self.evict_overflow();
        }
        Ok(())
    }

    /// Applies `f` to the record if it still belongs to `job_id` and is not terminal.
    ///
    /// Returns whether the update was applied.
    pub fn update<F>(&self, key: &JobKey, job_id: Uuid, f: F) -> bool
    where
        F: FnOnce(&mut JobRecord),
    {
        match self.jobs.get_mut(key) {
            Some(mut record) if record.job_id == job_id && !record.status.is_terminal() => {
                f(&mut record);
                true
            }
            _ => false,
        }
    }

    /// Records visible to a caller, keyed by URL. A session sees only its own
    /// jobs; an unscoped caller sees the unscoped ones.
    pub fn list(&self, session: Option<&str>) -> BTreeMap<String, JobRecord> {
        self.jobs
            .iter()
            .filter(|entry| entry.key().session.as_deref() == session)
            .map(|entry| (entry.key().url.clone(), entry.value().clone()))
            .collect()
    }

    pub fn batch(&self, batch_id: &str) -> BatchSummary {
        self.collect_batch(batch_id, |_| true)
    }

    /// Like `batch`, but only with jobs submitted under `session`.
    pub fn batch_in_session(&self, batch_id: &str, session: Option<&str>) -> BatchSummary {
        self.collect_batch(batch_id, |record| record.session.as_deref() == session)
    }

    fn collect_batch<F>(&self, batch_id: &str, visible: F) -> BatchSummary
    where
        F: Fn(&JobRecord) -> bool,
    {
        let mut jobs: Vec<JobRecord> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().batch_id.as_deref() == Some(batch_id) && visible(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.url.cmp(&b.url)));

        BatchSummary {
            batch_id: batch_id.to_string(),
            settled: jobs.iter().all(|job| job.status.is_terminal()),
            dir: jobs.iter().find_map(|job| job.batch_dir.clone()),
            jobs,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Drops expired terminal records, then the oldest terminal records while over
    /// capacity. Returns how many records were removed.
    pub fn reap(&self, now: DateTime<Utc>) -> usize {
        let before = self.jobs.len();
        let ttl = self.ttl;

        self.jobs.retain(|_, record| {
            let expired = now
                .signed_duration_since(record.updated_at)
                .to_std()
                .map(|age| age > ttl)
                .unwrap_or(false);
            !(record.status.is_terminal() && expired)
        });
        self.evict_overflow();

        before.saturating_sub(self.jobs.len())
    }

    fn evict_overflow(&self) {
        let excess = self.jobs.len().saturating_sub(self.max_jobs);
        if excess == 0 {
            return;
        }

        let mut terminal: Vec<(JobKey, DateTime<Utc>)> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().status.is_terminal())
            .map(|entry| (entry.key().clone(), entry.value().updated_at))
            .collect();
        terminal.sort_by_key(|(_, updated_at)| *updated_at);

        for (key, _) in terminal.into_iter().take(excess) {
            self.jobs.remove_if(&key, |_, record| record.status.is_terminal());
        }
    }

    /// Runs `reap` on a fixed interval for the lifetime of the process.
    pub fn spawn_reaper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = self.reap(Utc::now());
                if removed > 0 {
                    tracing::debug!(removed, remaining = self.len(), "reaped finished jobs");
                }
            }
        })
    }
}
