//! Pipeline coordinator connecting the download and merge stages.
//!
//! # Concurrency Model
//!
//! - Items are admitted in source order through a [`DownloadGate`] of size B_d
//! - Each admitted item runs as its own tokio task and holds its gate permit
//!   only while fetching
//! - Fetched items are queued on a [`MergeScheduler`] with B_m workers;
//!   submission never blocks, so fetches never wait on merges
//! - Once every item task has finished the scheduler is drained and the
//!   results are finalized
//!
//! # Interruption
//!
//! When the [`CancellationToken`] fires, no further items are admitted and
//! in-flight fetches are abandoned (their temp files are removed). Merges that
//! were already queued still run to completion, so no partial output is ever
//! left behind by an interrupt.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mediabatch_core::{
//!     FfmpegMerger, HttpClient, ManifestSource, PipelineConfig, PipelineCoordinator,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = ManifestSource::from_path("batch.json".as_ref()).await?;
//! let coordinator = PipelineCoordinator::new(
//!     PipelineConfig::default(),
//!     HttpClient::new()?,
//!     Arc::new(source),
//!     Arc::new(FfmpegMerger::new()),
//! );
//! let report = coordinator.run().await?;
//! println!("{} ok, {} failed", report.summary.success_count(), report.summary.failure_count());
//! # Ok(())
//! # }
//! ```

mod error;
mod task;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::download::{DownloadGate, HttpClient, RetryPolicy};
use crate::item::{Item, StateBoard};
use crate::merge::{MergeContext, MergeScheduler, MergeStats, Merger};
use crate::paths::{TempAssets, output_path, remove_file_best_effort};
use crate::progress::{NoopProgress, ProgressReporter};
use crate::report::{FailureKind, PipelineResult, PipelineSummary, ResultAggregator};
use crate::source::ItemSource;

pub use error::PipelineError;
use task::ItemTask;

/// Default number of items fetching at once.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 1;

/// Default number of merges running at once.
pub const DEFAULT_MERGE_CONCURRENCY: usize = 1;

/// Directory receiving merged outputs by default.
pub const DEFAULT_OUTPUT_DIR: &str = "./download";

/// Directory receiving fetched streams by default.
pub const DEFAULT_TEMP_DIR: &str = "./download/temp";

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Download concurrency bound (B_d).
    pub download_concurrency: usize,
    /// Merge concurrency bound (B_m).
    pub merge_concurrency: usize,
    /// Where merged outputs are written.
    pub output_dir: PathBuf,
    /// Where fetched streams are staged.
    pub temp_dir: PathBuf,
    /// Retry behavior for failed fetches.
    pub retry_policy: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            merge_concurrency: DEFAULT_MERGE_CONCURRENCY,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            temp_dir: PathBuf::from(DEFAULT_TEMP_DIR),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// What a finished run reports.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Per-item outcomes.
    pub summary: PipelineSummary,
    /// Effective download bound after clamping to the item count.
    pub download_concurrency: usize,
    /// Effective merge bound after clamping to the item count.
    pub merge_concurrency: usize,
    /// Highest number of items observed in `Fetching` at once.
    pub peak_fetching: usize,
    /// Highest number of gate permits held at once.
    pub peak_gate: usize,
    /// Merge stage counters.
    pub merge_stats: MergeStats,
    /// Whether the run was interrupted.
    pub cancelled: bool,
}

/// Runs a batch end to end.
pub struct PipelineCoordinator {
    config: PipelineConfig,
    client: HttpClient,
    source: Arc<dyn ItemSource>,
    merger: Arc<dyn Merger>,
    progress: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

impl PipelineCoordinator {
    /// Creates a coordinator with no progress reporting and no interruption source.
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        client: HttpClient,
        source: Arc<dyn ItemSource>,
        merger: Arc<dyn Merger>,
    ) -> Self {
        Self {
            config,
            client,
            source,
            merger,
            progress: Arc::new(NoopProgress),
            cancel: CancellationToken::new(),
        }
    }

    /// Sends progress events to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Stops admitting items once `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The configuration this coordinator runs with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processes every item of the source.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] only for run-level preconditions: the merge
    /// tool is unavailable, the item list cannot be obtained, is empty or
    /// reuses an id, or the working directories cannot be created. Item failures are reported
    /// in the returned [`RunReport`].
    #[instrument(skip(self), fields(
        output_dir = %self.config.output_dir.display(),
        temp_dir = %self.config.temp_dir.display(),
    ))]
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        self.merger
            .ensure_available()
            .await
            .map_err(PipelineError::MergerUnavailable)?;

        let items = self.source.list_items().await?;
        if items.is_empty() {
            return Err(PipelineError::EmptyItemList);
        }
        let mut seen = HashSet::with_capacity(items.len());
        if let Some(dup) = items.iter().find(|item| !seen.insert(&item.id)) {
            return Err(PipelineError::DuplicateItem {
                item_id: dup.id.clone(),
                index: dup.index,
            });
        }

        create_dir(&self.config.output_dir).await?;
        create_dir(&self.config.temp_dir).await?;

        let total = items.len();
        let download_concurrency = self.config.download_concurrency.clamp(1, total);
        let merge_concurrency = self.config.merge_concurrency.clamp(1, total);
        info!(
            items = total,
            download_concurrency,
            merge_concurrency,
            max_attempts = self.config.retry_policy.max_attempts(),
            "starting pipeline"
        );

        let results = Arc::new(ResultAggregator::new());
        let states = Arc::new(StateBoard::new());
        for item in &items {
            states.register(&item.id);
        }

        let gate = DownloadGate::new(download_concurrency);
        let scheduler = MergeScheduler::start(
            merge_concurrency,
            MergeContext {
                merger: Arc::clone(&self.merger),
                results: Arc::clone(&results),
                states: Arc::clone(&states),
                progress: Arc::clone(&self.progress),
            },
        );
        let task = Arc::new(ItemTask {
            client: self.client.clone(),
            source: Arc::clone(&self.source),
            retry_policy: self.config.retry_policy.clone(),
            results: Arc::clone(&results),
            states: Arc::clone(&states),
            progress: Arc::clone(&self.progress),
            merges: scheduler.handle(),
            cancel: self.cancel.clone(),
            output_dir: self.config.output_dir.clone(),
        });

        let mut handles = Vec::with_capacity(total);
        let mut admitted: Vec<(Item, TempAssets)> = Vec::with_capacity(total);

        for item in &items {
            let permit = if self.cancel.is_cancelled() {
                None
            } else {
                tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => None,
                    permit = gate.acquire() => permit.ok(),
                }
            };

            let Some(permit) = permit else {
                gate.close();
                if states.abandon(&item.id).is_none() {
                    warn!(item_id = %item.id, "could not mark unadmitted item as failed");
                }
                remove_file_best_effort(&output_path(&self.config.output_dir, item)).await;
                results.record(PipelineResult::failed_item(
                    item,
                    FailureKind::Cancelled,
                    "run interrupted before the item was started",
                ));
                continue;
            };

            let temps = TempAssets::allocate(&self.config.temp_dir);
            debug!(item_id = %item.id, index = item.index, "item admitted");
            admitted.push((item.clone(), temps.clone()));
            handles.push(tokio::spawn(Arc::clone(&task).run(
                item.clone(),
                temps,
                permit,
            )));
        }

        debug!(task_count = handles.len(), "waiting for download stage");
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "item task panicked");
            }
        }

        // Releases the last submission handle so the merge queue can close.
        drop(task);
        let merge_stats = scheduler.drain().await;

        for (item, temps) in &admitted {
            if results.has_result(&item.id) {
                continue;
            }
            error!(item_id = %item.id, "item ended without a recorded outcome");
            states.abandon(&item.id);
            temps.remove_all().await;
            remove_file_best_effort(&output_path(&self.config.output_dir, item)).await;
            results.record(PipelineResult::failed_item(
                item,
                FailureKind::Internal,
                "item ended without a recorded outcome",
            ));
        }

        let summary = results.finalize();
        let cancelled = self.cancel.is_cancelled();
        log_summary(&summary, cancelled);

        Ok(RunReport {
            summary,
            download_concurrency,
            merge_concurrency,
            peak_fetching: states.peak_fetching(),
            peak_gate: gate.peak_active(),
            merge_stats,
            cancelled,
        })
    }
}

async fn create_dir(path: &Path) -> Result<(), PipelineError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn log_summary(summary: &PipelineSummary, cancelled: bool) {
    for failure in &summary.failures {
        warn!(
            index = failure.index,
            item_id = %failure.item_id,
            title = %failure.title,
            kind = %failure.kind,
            reason = %failure.reason,
            "item failed"
        );
    }
    info!(
        succeeded = summary.success_count(),
        failed = summary.failure_count(),
        total = summary.total(),
        cancelled,
        "pipeline complete"
    );
}
