//! Bounded pool of merge workers.
//!
//! Jobs enter a FIFO channel; `workers` tasks take them one at a time, so at
//! most `workers` merges run at once no matter how fast the download stage
//! submits. Every job taken from the queue ends with exactly one recorded
//! result and with both of its inputs removed.

use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::{MergeError, MergeJob, Merger};
use crate::item::{ItemState, StateBoard};
use crate::paths::remove_file_best_effort;
use crate::progress::ProgressReporter;
use crate::report::{FailureKind, PipelineResult, ResultAggregator};

/// Shared collaborators every merge worker writes into.
#[derive(Clone)]
pub struct MergeContext {
    /// The merge tool adapter.
    pub merger: Arc<dyn Merger>,
    /// Where outcomes are recorded.
    pub results: Arc<ResultAggregator>,
    /// Lifecycle state of every item.
    pub states: Arc<StateBoard>,
    /// Progress sink.
    pub progress: Arc<dyn ProgressReporter>,
}

/// The scheduler no longer accepts jobs; the rejected job is handed back.
#[derive(Debug, Error)]
#[error("merge scheduler is closed")]
pub struct SubmitError(pub Box<MergeJob>);

/// Counters reported once the scheduler has drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Jobs taken from the queue.
    pub processed: usize,
    /// Jobs that produced a verified output.
    pub succeeded: usize,
    /// Jobs that failed.
    pub failed: usize,
    /// Highest number of merges running at once.
    pub peak_active: usize,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    processed: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

/// Cloneable submission side of a [`MergeScheduler`].
#[derive(Debug, Clone)]
pub struct MergeHandle {
    sender: mpsc::UnboundedSender<MergeJob>,
    counters: Arc<Counters>,
}

impl MergeHandle {
    /// Queues a job. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] carrying the job if every worker has exited.
    pub fn submit(&self, job: MergeJob) -> Result<(), SubmitError> {
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        self.sender.send(job).map_err(|rejected| {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
            SubmitError(Box::new(rejected.0))
        })
    }
}

/// Fixed-size merge worker pool.
pub struct MergeScheduler {
    handle: MergeHandle,
    workers: Vec<JoinHandle<()>>,
}

impl MergeScheduler {
    /// Spawns `workers` merge workers (minimum 1).
    #[must_use]
    pub fn start(workers: usize, context: MergeContext) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());
        let context = Arc::new(context);

        let handles = (0..workers)
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let counters = Arc::clone(&counters);
                let context = Arc::clone(&context);
                tokio::spawn(worker_loop(worker, receiver, context, counters))
            })
            .collect();

        debug!(workers, "merge scheduler started");

        Self {
            handle: MergeHandle { sender, counters },
            workers: handles,
        }
    }

    /// Returns a submission handle for producers.
    #[must_use]
    pub fn handle(&self) -> MergeHandle {
        self.handle.clone()
    }

    /// Queues a job.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] if every worker has exited.
    pub fn submit(&self, job: MergeJob) -> Result<(), SubmitError> {
        self.handle.submit(job)
    }

    /// Number of workers.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Jobs waiting for a worker.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.handle.counters.queued.load(Ordering::SeqCst)
    }

    /// Merges currently running.
    #[must_use]
    pub fn active(&self) -> usize {
        self.handle.counters.active.load(Ordering::SeqCst)
    }

    /// Highest number of merges running at once so far.
    #[must_use]
    pub fn peak_active(&self) -> usize {
        self.handle.counters.peak.load(Ordering::SeqCst)
    }

    /// Stops accepting jobs, waits for every queued and running job to finish
    /// and returns the counters.
    ///
    /// The queue only closes once every [`MergeHandle`] clone is dropped too.
    pub async fn drain(self) -> MergeStats {
        let Self { handle, workers } = self;
        let counters = Arc::clone(&handle.counters);
        drop(handle);

        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "merge worker terminated abnormally");
            }
        }

        let stats = MergeStats {
            processed: counters.processed.load(Ordering::SeqCst),
            succeeded: counters.succeeded.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
            peak_active: counters.peak.load(Ordering::SeqCst),
        };
        info!(
            processed = stats.processed,
            succeeded = stats.succeeded,
            failed = stats.failed,
            peak_active = stats.peak_active,
            "merge stage drained"
        );
        stats
    }
}

async fn worker_loop(
    worker: usize,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<MergeJob>>>,
    context: Arc<MergeContext>,
    counters: Arc<Counters>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(job) = next else {
            break;
        };
        counters.queued.fetch_sub(1, Ordering::SeqCst);
        process_job(worker, &context, &counters, job).await;
    }
    debug!(worker, "merge worker exiting");
}

#[instrument(skip(context, counters, job), fields(item_id = %job.item_id, index = job.index))]
async fn process_job(worker: usize, context: &MergeContext, counters: &Counters, job: MergeJob) {
    if let Err(e) = context.states.transition(&job.item_id, ItemState::Merging) {
        warn!(error = %e, "unexpected state on merge start");
    }
    let active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
    counters.peak.fetch_max(active, Ordering::SeqCst);
    debug!(
        active,
        waited_ms = job.submitted_at.elapsed().as_millis(),
        "merge started"
    );
    context
        .progress
        .merge_started(&job.item_id, &job.title, job.duration_secs);

    let outcome = run_merge(context, &job).await;
    counters.active.fetch_sub(1, Ordering::SeqCst);

    remove_file_best_effort(&job.video_path).await;
    remove_file_best_effort(&job.audio_path).await;

    counters.processed.fetch_add(1, Ordering::SeqCst);
    let (result, next_state) = match outcome {
        Ok(()) => {
            counters.succeeded.fetch_add(1, Ordering::SeqCst);
            info!(output = %job.output_path.display(), "merged");
            (
                PipelineResult::success(
                    job.item_id.clone(),
                    job.index,
                    &job.title,
                    job.output_path.clone(),
                ),
                ItemState::Merged,
            )
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::SeqCst);
            warn!(error = %e, "merge failed");
            remove_file_best_effort(&job.output_path).await;
            (
                PipelineResult::failure(
                    job.item_id.clone(),
                    job.index,
                    &job.title,
                    FailureKind::Merge,
                    e.to_string(),
                ),
                ItemState::MergeFailed,
            )
        }
    };

    let ok = result.success;
    context.results.record(result);
    if let Err(e) = context.states.transition(&job.item_id, next_state) {
        warn!(error = %e, "unexpected state on merge end");
    }
    context.progress.merge_finished(&job.item_id, ok);
}

/// Runs the merger in its own task so a panic becomes a per-item failure,
/// then verifies the output.
async fn run_merge(context: &MergeContext, job: &MergeJob) -> Result<(), MergeError> {
    let merger = Arc::clone(&context.merger);
    let progress = Arc::clone(&context.progress);
    let task_job = job.clone();

    let task = tokio::spawn(async move {
        let item_id = task_job.item_id.clone();
        let on_progress = move |elapsed: u64| progress.merge_advanced(&item_id, elapsed);
        merger.merge(&task_job, &on_progress).await
    });

    match task.await {
        Ok(result) => result?,
        Err(e) => {
            error!(error = %e, "merge task panicked");
            return Err(MergeError::Panicked {
                item_id: job.item_id.clone(),
            });
        }
    }

    match tokio::fs::metadata(&job.output_path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(MergeError::EmptyOutput {
            path: job.output_path.clone(),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(MergeError::MissingOutput {
            path: job.output_path.clone(),
        }),
        Err(source) => Err(MergeError::Io {
            path: job.output_path.clone(),
            source,
        }),
    }
}
