//! The download-stage work for one item.
//!
//! A task runs while holding a [`GatePermit`]: it resolves the item's streams,
//! fetches audio then video (retrying transient failures), checks both files
//! and hands a [`MergeJob`] to the merge stage. The permit is released as soon
//! as the item leaves the `Fetching` state. An item that fails never leaves a
//! file at its output path.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::download::{GatePermit, HttpClient, RetryDecision, RetryPolicy, classify_error};
use crate::item::{AssetKind, Item, ItemState, StateBoard, StreamPair};
use crate::merge::{MergeHandle, MergeJob};
use crate::paths::{TempAssets, file_len, output_path, remove_file_best_effort};
use crate::progress::ProgressReporter;
use crate::report::{FailureKind, PipelineResult, ResultAggregator};
use crate::source::ItemSource;

/// Why an item failed in the download stage.
#[derive(Debug)]
struct ItemFailure {
    kind: FailureKind,
    message: String,
}

impl ItemFailure {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "run interrupted while fetching")
    }
}

/// Everything an item task needs, shared by all item tasks of a run.
pub(super) struct ItemTask {
    pub(super) client: HttpClient,
    pub(super) source: Arc<dyn ItemSource>,
    pub(super) retry_policy: RetryPolicy,
    pub(super) results: Arc<ResultAggregator>,
    pub(super) states: Arc<StateBoard>,
    pub(super) progress: Arc<dyn ProgressReporter>,
    pub(super) merges: MergeHandle,
    pub(super) cancel: CancellationToken,
    pub(super) output_dir: PathBuf,
}

impl ItemTask {
    /// Runs the download stage for `item` and releases `permit` on every path.
    #[instrument(skip_all, fields(item_id = %item.id, index = item.index))]
    pub(super) async fn run(self: Arc<Self>, item: Item, temps: TempAssets, permit: GatePermit) {
        if let Err(e) = self.states.transition(&item.id, ItemState::Fetching) {
            warn!(error = %e, "item was not pending when admitted");
        }

        match self.fetch_item(&item, &temps).await {
            Ok(()) => {
                let job = MergeJob::new(
                    &item,
                    temps.video.clone(),
                    temps.audio.clone(),
                    output_path(&self.output_dir, &item),
                );
                if let Err(e) = self.states.transition(&item.id, ItemState::MergeQueued) {
                    warn!(error = %e, "unexpected state after fetch");
                }
                drop(permit);

                if let Err(rejected) = self.merges.submit(job) {
                    warn!(error = %rejected, "could not queue merge");
                    temps.remove_all().await;
                    remove_file_best_effort(&rejected.0.output_path).await;
                    self.finish_failed(
                        &item,
                        ItemState::MergeFailed,
                        ItemFailure::new(FailureKind::Merge, rejected.to_string()),
                    );
                } else {
                    debug!("merge queued");
                }
            }
            Err(failure) => {
                temps.remove_all().await;
                // Includes a file left at the output path by an earlier run.
                remove_file_best_effort(&output_path(&self.output_dir, &item)).await;
                self.finish_failed(&item, ItemState::FetchFailed, failure);
                drop(permit);
            }
        }
    }

    fn finish_failed(&self, item: &Item, state: ItemState, failure: ItemFailure) {
        if failure.kind == FailureKind::Cancelled {
            info!(reason = %failure.message, "item cancelled");
        } else {
            warn!(kind = %failure.kind, reason = %failure.message, "item failed");
        }
        if let Err(e) = self.states.transition(&item.id, state) {
            warn!(error = %e, "unexpected state on failure");
        }
        self.results
            .record(PipelineResult::failed_item(item, failure.kind, failure.message));
    }

    async fn fetch_item(&self, item: &Item, temps: &TempAssets) -> Result<(), ItemFailure> {
        let streams = self.resolve(item).await?;

        for kind in AssetKind::ALL {
            self.fetch_with_retry(item, kind, streams.location(kind), temps)
                .await?;
        }

        for kind in AssetKind::ALL {
            match file_len(temps.path(kind)).await {
                Some(len) if len > 0 => {}
                Some(_) => {
                    return Err(ItemFailure::new(
                        FailureKind::Validation,
                        format!("{kind} asset is empty"),
                    ));
                }
                None => {
                    return Err(ItemFailure::new(
                        FailureKind::Validation,
                        format!("{kind} asset is missing"),
                    ));
                }
            }
        }
        Ok(())
    }

    async fn resolve(&self, item: &Item) -> Result<StreamPair, ItemFailure> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ItemFailure::cancelled()),
            resolved = self.source.resolve_streams(item) => {
                resolved.map_err(|e| ItemFailure::new(FailureKind::Source, e.to_string()))
            }
        }
    }

    async fn fetch_with_retry(
        &self,
        item: &Item,
        kind: AssetKind,
        url: &str,
        temps: &TempAssets,
    ) -> Result<(), ItemFailure> {
        let destination = temps.path(kind);
        let mut attempt = 1;

        loop {
            self.progress.fetch_started(&item.id, kind);
            let fetch = self.client.fetch(url, destination, |p| {
                self.progress
                    .fetch_advanced(&item.id, kind, p.bytes_transferred, p.expected_bytes);
            });
            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.progress.fetch_finished(&item.id, kind, false);
                    return Err(ItemFailure::cancelled());
                }
                result = fetch => result,
            };

            let error = match result {
                Ok(outcome) => {
                    self.progress.fetch_finished(&item.id, kind, true);
                    debug!(%kind, bytes = outcome.bytes_written, attempt, "asset fetched");
                    return Ok(());
                }
                Err(e) => e,
            };
            self.progress.fetch_finished(&item.id, kind, false);
            remove_file_best_effort(destination).await;

            match self.retry_policy.should_retry(classify_error(&error), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    warn!(
                        %kind,
                        error = %error,
                        attempt,
                        delay_ms = delay.as_millis(),
                        "fetch failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => return Err(ItemFailure::cancelled()),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    return Err(ItemFailure::new(
                        FailureKind::Download,
                        format!("{kind} fetch failed after {attempt} attempt(s): {error} ({reason})"),
                    ));
                }
            }
        }
    }
}
