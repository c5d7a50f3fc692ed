//! Progress telemetry sink.
//!
//! The pipeline reports byte counts for fetches and elapsed seconds for merges
//! through [`ProgressReporter`]. Rendering is left to the implementor; the
//! library only ships [`NoopProgress`]. Every method has an empty default so
//! reporters can pick the events they care about.

use crate::item::{AssetKind, ItemId};

/// Receives advisory progress events from both pipeline stages.
///
/// Implementations must be cheap and must not panic: they are called from
/// download tasks and merge workers.
pub trait ProgressReporter: Send + Sync {
    /// A fetch for one asset of an item is starting.
    fn fetch_started(&self, _item_id: &ItemId, _kind: AssetKind) {}

    /// Cumulative bytes written for an asset, with the expected total if known.
    fn fetch_advanced(
        &self,
        _item_id: &ItemId,
        _kind: AssetKind,
        _transferred: u64,
        _expected: Option<u64>,
    ) {
    }

    /// A fetch finished, successfully or not.
    fn fetch_finished(&self, _item_id: &ItemId, _kind: AssetKind, _ok: bool) {}

    /// A merge worker picked up the item; `duration_secs` is the expected media length.
    fn merge_started(&self, _item_id: &ItemId, _title: &str, _duration_secs: u64) {}

    /// The merge tool reported having processed `elapsed_secs` of media.
    fn merge_advanced(&self, _item_id: &ItemId, _elapsed_secs: u64) {}

    /// The merge finished, successfully or not.
    fn merge_finished(&self, _item_id: &ItemId, _ok: bool) {}
}

/// Reporter that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {}
