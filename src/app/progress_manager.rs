//! Progress bars for fetches and merges.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use mediabatch_core::{AssetKind, ItemId, ProgressReporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Stage {
    Fetch(AssetKind),
    Merge,
}

/// Renders one bar per running fetch and merge.
pub(crate) struct IndicatifProgress {
    multi: MultiProgress,
    bars: Mutex<HashMap<(ItemId, Stage), ProgressBar>>,
}

impl IndicatifProgress {
    pub(crate) fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn start_bar(&self, key: (ItemId, Stage), bar: ProgressBar) {
        let bar = self.multi.add(bar);
        let previous = self
            .bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, bar);
        if let Some(previous) = previous {
            previous.finish_and_clear();
        }
    }

    fn with_bar(&self, key: &(ItemId, Stage), f: impl FnOnce(&ProgressBar)) {
        let bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = bars.get(key) {
            f(bar);
        }
    }

    fn finish_bar(&self, key: &(ItemId, Stage), ok: bool) {
        let bar = self
            .bars
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if let Some(bar) = bar {
            if ok {
                bar.finish_and_clear();
            } else {
                bar.abandon_with_message("failed");
            }
            self.multi.remove(&bar);
        }
    }
}

fn bytes_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:>24} [{bar:30}] {bytes}/{total_bytes} {msg}")
        .map(|style| style.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn unknown_size_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner} {prefix:>22} {bytes} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn merge_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:>24} [{bar:30}] {pos}/{len}s merging {msg}")
        .map(|style| style.progress_chars("#> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

impl ProgressReporter for IndicatifProgress {
    fn fetch_started(&self, item_id: &ItemId, kind: AssetKind) {
        let bar = ProgressBar::no_length()
            .with_style(unknown_size_style())
            .with_prefix(format!("{item_id} {kind}"));
        self.start_bar((item_id.clone(), Stage::Fetch(kind)), bar);
    }

    fn fetch_advanced(
        &self,
        item_id: &ItemId,
        kind: AssetKind,
        transferred: u64,
        expected: Option<u64>,
    ) {
        self.with_bar(&(item_id.clone(), Stage::Fetch(kind)), |bar| {
            if let Some(total) = expected
                && bar.length() != Some(total)
            {
                bar.set_length(total);
                bar.set_style(bytes_style());
            }
            bar.set_position(transferred);
        });
    }

    fn fetch_finished(&self, item_id: &ItemId, kind: AssetKind, ok: bool) {
        self.finish_bar(&(item_id.clone(), Stage::Fetch(kind)), ok);
    }

    fn merge_started(&self, item_id: &ItemId, title: &str, duration_secs: u64) {
        let bar = ProgressBar::new(duration_secs.max(1))
            .with_style(merge_style())
            .with_prefix(item_id.to_string())
            .with_message(title.to_string());
        self.start_bar((item_id.clone(), Stage::Merge), bar);
    }

    fn merge_advanced(&self, item_id: &ItemId, elapsed_secs: u64) {
        self.with_bar(&(item_id.clone(), Stage::Merge), |bar| {
            bar.set_position(elapsed_secs.min(bar.length().unwrap_or(u64::MAX)));
        });
    }

    fn merge_finished(&self, item_id: &ItemId, ok: bool) {
        self.finish_bar(&(item_id.clone(), Stage::Merge), ok);
    }
}
