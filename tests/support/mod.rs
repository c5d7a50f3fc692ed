//! Helpers shared by the integration test binaries.
#![allow(dead_code)]

pub mod socket_guard {
    use std::net::TcpListener;
    use std::panic::Location;

    use wiremock::MockServer;

    const REQUIRE_SOCKET_TESTS_ENV: &str = "MEDIABATCH_REQUIRE_SOCKET_TESTS";

    fn socket_tests_required() -> bool {
        std::env::var(REQUIRE_SOCKET_TESTS_ENV)
            .ok()
            .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
    }

    /// Starts a wiremock server, or returns `None` when sockets cannot be bound.
    #[track_caller]
    pub fn start_mock_server_or_skip() -> impl std::future::Future<Output = Option<MockServer>> {
        let location = Location::caller();
        let skip = TcpListener::bind("127.0.0.1:0").is_err();
        if skip {
            let message = format!(
                "[socket-bound-test] cannot bind localhost socket at {}:{}",
                location.file(),
                location.line()
            );
            assert!(!socket_tests_required(), "{message}");
            eprintln!("{message}; skipping test");
        }
        async move {
            if skip {
                None
            } else {
                Some(MockServer::start().await)
            }
        }
    }
}

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mediabatch_core::{ManifestEntry, ManifestSource, MergeError, MergeJob, Merger, PipelineConfig, RetryPolicy};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Merger that writes `video ++ audio` to the output, standing in for ffmpeg.
#[derive(Default)]
pub struct CopyMerger {
    fail_ids: HashSet<String>,
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    merged: Mutex<Vec<String>>,
}

impl CopyMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes merges of these items exit with an error.
    pub fn failing_for(mut self, ids: &[&str]) -> Self {
        self.fail_ids = ids.iter().map(|id| (*id).to_string()).collect();
        self
    }

    /// Holds every merge for `delay` so overlaps become observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn peak_active(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn merged_ids(&self) -> Vec<String> {
        self.merged.lock().unwrap().clone()
    }
}

#[async_trait]
impl Merger for CopyMerger {
    async fn ensure_available(&self) -> Result<(), MergeError> {
        Ok(())
    }

    async fn merge(
        &self,
        job: &MergeJob,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<(), MergeError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        on_progress(job.duration_secs);

        let result = if self.fail_ids.contains(job.item_id.as_str()) {
            // Leaves a partial output behind, as a crashed tool would.
            let _ = tokio::fs::write(&job.output_path, b"partial").await;
            Err(MergeError::ExitStatus {
                code: Some(1),
                detail: "simulated merge failure".to_string(),
            })
        } else {
            let mut body = tokio::fs::read(&job.video_path).await.unwrap();
            body.extend(tokio::fs::read(&job.audio_path).await.unwrap());
            tokio::fs::write(&job.output_path, body).await.unwrap();
            self.merged.lock().unwrap().push(job.item_id.as_str().to_string());
            Ok(())
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Video body served for `id`.
pub fn video_body(id: &str) -> Vec<u8> {
    format!("video-bytes-{id}").into_bytes()
}

/// Audio body served for `id`.
pub fn audio_body(id: &str) -> Vec<u8> {
    format!("audio-bytes-{id}").into_bytes()
}

/// Serves both streams of `id` with a 200.
pub async fn mount_item(server: &MockServer, id: &str) {
    mount_item_with_delay(server, id, Duration::ZERO).await;
}

/// Serves both streams of `id` with a 200 after `delay`.
pub async fn mount_item_with_delay(server: &MockServer, id: &str, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(format!("/{id}/video.mp4")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(video_body(id))
                .set_delay(delay),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{id}/audio.m4a")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(audio_body(id))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

/// Makes every stream of `id` answer with `status`.
pub async fn mount_failing_item(server: &MockServer, id: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("/{id}/video.mp4")))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/{id}/audio.m4a")))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Manifest entry whose streams live on `server`.
pub fn entry(server: &MockServer, id: &str, title: &str) -> ManifestEntry {
    ManifestEntry {
        id: id.to_string(),
        title: title.to_string(),
        duration: 30,
        video_url: format!("{}/{id}/video.mp4", server.uri()),
        audio_url: format!("{}/{id}/audio.m4a", server.uri()),
    }
}

pub fn source(entries: Vec<ManifestEntry>) -> Arc<ManifestSource> {
    Arc::new(ManifestSource::from_entries(entries))
}

/// Config writing under `root` with a single attempt per stream.
pub fn config(root: &Path, download_concurrency: usize, merge_concurrency: usize) -> PipelineConfig {
    PipelineConfig {
        download_concurrency,
        merge_concurrency,
        output_dir: root.join("out"),
        temp_dir: root.join("out").join("temp"),
        retry_policy: RetryPolicy::with_max_attempts(1),
    }
}

/// Number of regular files left in `dir` (0 if it does not exist).
pub fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
                .count()
        })
        .unwrap_or(0)
}
