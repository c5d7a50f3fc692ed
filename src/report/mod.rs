//! Per-item outcomes and the run summary.
//!
//! [`ResultAggregator`] is the append-only, thread-safe collection every item
//! task and merge worker writes into. Each item gets exactly one
//! [`PipelineResult`]; later writes for the same item are rejected and logged.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, warn};

use crate::item::{Item, ItemId};

/// Classification of an item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Stream locations could not be resolved.
    Source,
    /// Transport error, truncated body or empty body.
    Download,
    /// An asset was missing or empty right before merge submission.
    Validation,
    /// The merge tool failed or produced no usable output.
    Merge,
    /// The run was interrupted before the item finished fetching.
    Cancelled,
    /// The item task ended without reporting an outcome.
    Internal,
}

impl FailureKind {
    /// Returns the stable string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Download => "download",
            Self::Validation => "validation",
            Self::Merge => "merge",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of one item. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineResult {
    /// Item identifier.
    pub item_id: ItemId,
    /// Display index of the item.
    pub index: usize,
    /// Item title.
    pub title: String,
    /// Whether the item produced a verified output file.
    pub success: bool,
    /// Failure classification (`None` on success).
    pub kind: Option<FailureKind>,
    /// Failure detail (`None` on success).
    pub error: Option<String>,
    /// Output path on success.
    pub output_path: Option<PathBuf>,
}

impl PipelineResult {
    /// Creates a success result.
    #[must_use]
    pub fn success(item_id: ItemId, index: usize, title: &str, output_path: PathBuf) -> Self {
        Self {
            item_id,
            index,
            title: title.to_string(),
            success: true,
            kind: None,
            error: None,
            output_path: Some(output_path),
        }
    }

    /// Creates a failure result.
    #[must_use]
    pub fn failure(
        item_id: ItemId,
        index: usize,
        title: &str,
        kind: FailureKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            item_id,
            index,
            title: title.to_string(),
            success: false,
            kind: Some(kind),
            error: Some(error.into()),
            output_path: None,
        }
    }

    /// Creates a failure result for an item descriptor.
    #[must_use]
    pub fn failed_item(item: &Item, kind: FailureKind, error: impl Into<String>) -> Self {
        Self::failure(item.id.clone(), item.index, &item.title, kind, error)
    }
}

/// A failed item as listed in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    /// Item identifier.
    pub item_id: ItemId,
    /// Display index.
    pub index: usize,
    /// Item title.
    pub title: String,
    /// Failure classification.
    pub kind: FailureKind,
    /// Human-readable reason.
    pub reason: String,
}

/// Tally of a finished run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineSummary {
    /// All results ordered by display index.
    pub results: Vec<PipelineResult>,
    /// Failed items ordered by display index.
    pub failures: Vec<FailedItem>,
}

impl PipelineSummary {
    /// Number of items that produced a verified output.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    /// Number of failed items.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Total number of results (success + failure).
    #[must_use]
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Returns true when every item succeeded.
    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Looks up the result for an item.
    #[must_use]
    pub fn result(&self, item_id: &ItemId) -> Option<&PipelineResult> {
        self.results.iter().find(|r| &r.item_id == item_id)
    }
}

#[derive(Debug, Default)]
struct AggregatorInner {
    results: Vec<PipelineResult>,
    seen: HashSet<ItemId>,
    finalized: bool,
}

/// Append-only, thread-safe collection of per-item results.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    inner: Mutex<AggregatorInner>,
}

impl ResultAggregator {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AggregatorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a result. Returns false (and keeps the first result) when the
    /// item already has one or the aggregator has been finalized.
    pub fn record(&self, result: PipelineResult) -> bool {
        let mut inner = self.lock();
        if inner.finalized {
            warn!(item_id = %result.item_id, "result recorded after finalize; ignoring");
            return false;
        }
        if !inner.seen.insert(result.item_id.clone()) {
            warn!(item_id = %result.item_id, "duplicate result for item; keeping the first");
            return false;
        }
        debug!(
            item_id = %result.item_id,
            success = result.success,
            kind = ?result.kind,
            "recorded item result"
        );
        inner.results.push(result);
        true
    }

    /// Returns true when the item already has a result.
    #[must_use]
    pub fn has_result(&self, item_id: &ItemId) -> bool {
        self.lock().seen.contains(item_id)
    }

    /// Number of results recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().results.len()
    }

    /// Returns true when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seals the aggregator and builds the summary.
    ///
    /// Called by the coordinator once both stages have drained; any later
    /// `record` call is rejected.
    #[must_use]
    pub fn finalize(&self) -> PipelineSummary {
        let mut inner = self.lock();
        inner.finalized = true;

        let mut results = inner.results.clone();
        results.sort_by_key(|r| r.index);

        let failures = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| FailedItem {
                item_id: r.item_id.clone(),
                index: r.index,
                title: r.title.clone(),
                kind: r.kind.unwrap_or(FailureKind::Internal),
                reason: r.error.clone().unwrap_or_default(),
            })
            .collect();

        PipelineSummary { results, failures }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn ok(id: &str, index: usize) -> PipelineResult {
        PipelineResult::success(ItemId::from(id), index, id, PathBuf::from(format!("{id}.mp4")))
    }

    fn failed(id: &str, index: usize) -> PipelineResult {
        PipelineResult::failure(ItemId::from(id), index, id, FailureKind::Download, "boom")
    }

    #[test]
    fn test_record_and_summarize() {
        let aggregator = ResultAggregator::new();
        assert!(aggregator.record(ok("b", 2)));
        assert!(aggregator.record(failed("a", 1)));
        assert!(aggregator.record(ok("c", 3)));

        let summary = aggregator.finalize();
        assert_eq!(summary.success_count(), 2);
        assert_eq!(summary.failure_count(), 1);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.results[0].item_id, ItemId::from("a"));
        assert_eq!(summary.failures[0].kind, FailureKind::Download);
        assert_eq!(summary.failures[0].reason, "boom");
        assert!(!summary.is_complete_success());
    }

    #[test]
    fn test_duplicate_result_keeps_first() {
        let aggregator = ResultAggregator::new();
        assert!(aggregator.record(failed("a", 1)));
        assert!(!aggregator.record(ok("a", 1)));

        let summary = aggregator.finalize();
        assert_eq!(summary.total(), 1);
        assert!(!summary.result(&ItemId::from("a")).unwrap().success);
    }

    #[test]
    fn test_record_after_finalize_is_rejected() {
        let aggregator = ResultAggregator::new();
        aggregator.record(ok("a", 1));
        let _ = aggregator.finalize();
        assert!(!aggregator.record(ok("b", 2)));
        assert_eq!(aggregator.len(), 1);
    }

    #[test]
    fn test_concurrent_records_are_all_kept() {
        let aggregator = Arc::new(ResultAggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let aggregator = Arc::clone(&aggregator);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let index = t * 50 + i;
                        aggregator.record(ok(&format!("item-{index}"), index));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let summary = aggregator.finalize();
        assert_eq!(summary.success_count() + summary.failure_count(), 400);
    }

    #[test]
    fn test_empty_summary() {
        let summary = ResultAggregator::new().finalize();
        assert_eq!(summary.total(), 0);
        assert!(summary.is_complete_success());
    }
}
