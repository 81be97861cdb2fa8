//! Integration tests for the launcher against fake downloader scripts
//!
//! Run with: cargo test --test launcher_test

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use pretty_assertions::assert_eq;

use common::{fake_tools, script};
use melodrop::download::{Launcher, Submission, ToolOptions};
use melodrop::jobs::{JobKey, JobRecord, JobRegistry, JobStatus};

fn registry() -> Arc<JobRegistry> {
    Arc::new(JobRegistry::new(Duration::from_secs(3600), 1000))
}

fn launcher(options: ToolOptions) -> Launcher {
    Launcher::new(registry(), options, None)
}

async fn settle(submission: Submission) -> Submission {
    let Submission {
        batch_id,
        batch_dir,
        accepted,
        skipped,
        tasks,
    } = submission;
    for result in join_all(tasks).await {
        result.unwrap();
    }
    Submission {
        batch_id,
        batch_dir,
        accepted,
        skipped,
        tasks: Vec::new(),
    }
}

fn record(launcher: &Launcher, session: Option<&str>, url: &str) -> JobRecord {
    launcher.registry().get(&JobKey::new(session, url)).unwrap()
}

mod outcome_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const URL: &str = "https://www.youtube.com/watch?v=abc123";

    #[tokio::test]
    async fn test_exit_zero_completes_at_100() {
        let root = tempfile::tempdir().unwrap();
        let launcher = launcher(fake_tools("ytdlp-ok"));

        let submission = settle(launcher.submit(None, &[URL.to_string()], root.path()).await.unwrap()).await;

        let job = record(&launcher, None, URL);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100.0);
        assert_eq!(job.error, None);
        assert_eq!(job.batch_id.as_deref(), Some(submission.batch_id.as_str()));
        assert!(submission.batch_dir.join("track.mp3").is_file());
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails_with_stderr() {
        let root = tempfile::tempdir().unwrap();
        let launcher = launcher(fake_tools("ytdlp-fail"));

        settle(launcher.submit(None, &[URL.to_string()], root.path()).await.unwrap()).await;

        let job = record(&launcher, None, URL);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 0.0);
        let error = job.error.unwrap();
        assert!(error.contains("Video unavailable"), "{}", error);
        assert!(error.contains("falling back"), "{}", error);
    }

    #[tokio::test]
    async fn test_carriage_return_progress_is_scraped() {
        let root = tempfile::tempdir().unwrap();
        let launcher = launcher(fake_tools("ytdlp-carriage"));

        let submission = launcher.submit(None, &[URL.to_string()], root.path()).await.unwrap();

        // the script holds at 55.5% for a second before exiting
        let mut seen = 0.0;
        for _ in 0..80 {
            seen = record(&launcher, None, URL).progress;
            if seen >= 55.5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(seen, 55.5);
        assert_eq!(record(&launcher, None, URL).status, JobStatus::Downloading);

        settle(submission).await;
        let job = record(&launcher, None, URL);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100.0);
    }

    #[tokio::test]
    async fn test_large_stderr_does_not_stall_the_job() {
        let root = tempfile::tempdir().unwrap();
        let launcher = launcher(fake_tools("ytdlp-stderr-flood"));

        let submission = launcher.submit(None, &[URL.to_string()], root.path()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(10), settle(submission))
            .await
            .expect("job stalled on a full stderr pipe");

        assert_eq!(record(&launcher, None, URL).status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_silent_failure_reports_exit_status() {
        let root = tempfile::tempdir().unwrap();
        let launcher = launcher(fake_tools("ytdlp-silent-fail"));

        settle(launcher.submit(None, &[URL.to_string()], root.path()).await.unwrap()).await;

        let job = record(&launcher, None, URL);
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("exited with"));
    }

    #[tokio::test]
    async fn test_missing_binary_fails_the_job() {
        let root = tempfile::tempdir().unwrap();
        let options = ToolOptions {
            ytdlp_bin: "/nonexistent/yt-dlp".to_string(),
            ..fake_tools("ytdlp-ok")
        };
        let launcher = launcher(options);

        settle(launcher.submit(None, &[URL.to_string()], root.path()).await.unwrap()).await;

        let job = record(&launcher, None, URL);
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().starts_with("failed to launch /nonexistent/yt-dlp"));
    }

    #[tokio::test]
    async fn test_playlist_items_are_counted() {
        let root = tempfile::tempdir().unwrap();
        let launcher = launcher(fake_tools("ytdlp-playlist"));
        let url = "https://www.youtube.com/playlist?list=PL1";

        settle(launcher.submit(None, &[url.to_string()], root.path()).await.unwrap()).await;

        let job = record(&launcher, None, url);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_songs, Some(2));
        assert_eq!(job.completed_songs, Some(2));
        assert_eq!(job.progress, 100.0);
    }

    #[tokio::test]
    async fn test_spotify_urls_use_spotdl() {
        let root = tempfile::tempdir().unwrap();
        let options = ToolOptions {
            ytdlp_bin: "/nonexistent/yt-dlp".to_string(),
            spotdl_bin: script("spotdl-ok"),
            ..ToolOptions::default()
        };
        let launcher = launcher(options);
        let url = "https://open.spotify.com/album/4m2880jivSbbyEGAKfITCa";

        settle(launcher.submit(None, &[url.to_string()], root.path()).await.unwrap()).await;

        let job = record(&launcher, None, url);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_songs, Some(2));
        assert_eq!(job.completed_songs, Some(2));
    }
}

mod lifecycle_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const URL: &str = "https://soundcloud.com/artist/track";

    #[tokio::test]
    async fn test_record_exists_before_process_finishes() {
        let root = tempfile::tempdir().unwrap();
        let launcher = launcher(fake_tools("ytdlp-slow"));

        let submission = launcher.submit(None, &[URL.to_string()], root.path()).await.unwrap();

        let job = record(&launcher, None, URL);
        assert_eq!(job.status, JobStatus::Downloading);
        assert_eq!(job.progress, 0.0);

        settle(submission).await;
        assert_eq!(record(&launcher, None, URL).status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_in_flight_duplicate_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        let launcher = launcher(fake_tools("ytdlp-slow"));
        let urls = vec![URL.to_string()];

        let first = launcher.submit(Some("s1"), &urls, root.path()).await.unwrap();
        let job_id = record(&launcher, Some("s1"), URL).job_id;

        let second = launcher.submit(Some("s1"), &urls, root.path()).await.unwrap();
        assert!(second.accepted.is_empty());
        assert_eq!(second.skipped, urls);
        assert!(!second.batch_dir.exists());
        assert_eq!(record(&launcher, Some("s1"), URL).job_id, job_id);

        // another session has its own key
        let other = launcher.submit(Some("s2"), &urls, root.path()).await.unwrap();
        assert_eq!(other.accepted, urls);

        settle(first).await;
        settle(other).await;
        assert_eq!(record(&launcher, Some("s1"), URL).status, JobStatus::Completed);
        assert_eq!(record(&launcher, Some("s2"), URL).status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_resubmission_after_terminal_gets_new_job() {
        let root = tempfile::tempdir().unwrap();
        let launcher = launcher(fake_tools("ytdlp-ok"));
        let urls = vec![URL.to_string()];

        settle(launcher.submit(None, &urls, root.path()).await.unwrap()).await;
        let first = record(&launcher, None, URL);

        let again = settle(launcher.submit(None, &urls, root.path()).await.unwrap()).await;
        let second = record(&launcher, None, URL);

        assert_eq!(again.accepted, urls);
        assert_ne!(first.job_id, second.job_id);
        assert_ne!(first.batch_id, second.batch_id);
        assert_eq!(second.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrency_cap_queues_jobs() {
        let root = tempfile::tempdir().unwrap();
        let launcher = Launcher::new(registry(), fake_tools("ytdlp-slow"), Some(1));
        let urls = vec![
            "https://soundcloud.com/artist/one".to_string(),
            "https://soundcloud.com/artist/two".to_string(),
        ];

        let submission = launcher.submit(None, &urls, root.path()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let mut statuses: Vec<String> = urls
            .iter()
            .map(|url| record(&launcher, None, url).status.to_string())
            .collect();
        statuses.sort();
        assert_eq!(statuses, vec!["downloading".to_string(), "queued".to_string()]);

        settle(submission).await;
        for url in &urls {
            assert_eq!(record(&launcher, None, url).status, JobStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_batch_settles_when_all_jobs_finish() {
        let root = tempfile::tempdir().unwrap();
        let launcher = launcher(fake_tools("ytdlp-ok"));
        let urls = vec![
            "https://www.youtube.com/watch?v=one".to_string(),
            "https://www.youtube.com/watch?v=two".to_string(),
        ];

        let submission = launcher.submit(None, &urls, root.path()).await.unwrap();
        let batch_id = submission.batch_id.clone();
        assert_eq!(launcher.registry().batch(&batch_id).jobs.len(), 2);

        settle(submission).await;
        let summary = launcher.registry().batch(&batch_id);
        assert!(summary.settled);
        assert!(summary.jobs.iter().all(|job| job.status == JobStatus::Completed));
    }
}
