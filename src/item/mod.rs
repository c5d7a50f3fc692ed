//! Item model and per-item lifecycle tracking.
//!
//! An [`Item`] is one logical unit of content: a video-only asset and an
//! audio-only asset that are merged into a single output file. Each item moves
//! through [`ItemState`] exactly once; the [`StateBoard`] owned by a pipeline
//! run enforces that transitions are monotonic and records how many items were
//! in the `Fetching` state at the same time.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

/// Stable identifier of an item as reported by the item source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Creates an identifier from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Descriptor of one item. Immutable once obtained from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Source identifier.
    pub id: ItemId,
    /// 1-based display position within the run.
    pub index: usize,
    /// Human-readable title, used for the output file name.
    pub title: String,
    /// Playback duration in seconds (0 when unknown).
    pub duration_secs: u64,
}

impl Item {
    /// Creates a new item descriptor.
    #[must_use]
    pub fn new(
        id: impl Into<ItemId>,
        index: usize,
        title: impl Into<String>,
        duration_secs: u64,
    ) -> Self {
        Self {
            id: id.into(),
            index,
            title: title.into(),
            duration_secs,
        }
    }
}

/// Resolved remote locations of an item's two streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPair {
    /// Location of the video-only stream.
    pub video: String,
    /// Location of the audio-only stream.
    pub audio: String,
}

impl StreamPair {
    /// Creates a stream pair.
    #[must_use]
    pub fn new(video: impl Into<String>, audio: impl Into<String>) -> Self {
        Self {
            video: video.into(),
            audio: audio.into(),
        }
    }

    /// Returns the location for the given asset kind.
    #[must_use]
    pub fn location(&self, kind: AssetKind) -> &str {
        match kind {
            AssetKind::Audio => &self.audio,
            AssetKind::Video => &self.video,
        }
    }
}

/// Which half of an item an asset is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// Audio-only stream.
    Audio,
    /// Video-only stream.
    Video,
}

impl AssetKind {
    /// Fetch order used by the pipeline.
    pub const ALL: [AssetKind; 2] = [AssetKind::Audio, AssetKind::Video];

    /// Returns the lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an item within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Listed but not yet admitted to the download stage.
    Pending,
    /// Holding a download slot and fetching assets.
    Fetching,
    /// Terminal: resolution, fetch or validation failed.
    FetchFailed,
    /// Both assets fetched; merge job submitted and waiting for a worker.
    MergeQueued,
    /// A merge worker is running the external tool.
    Merging,
    /// Terminal: output produced and verified.
    Merged,
    /// Terminal: merge failed or output failed verification.
    MergeFailed,
}

impl ItemState {
    /// Returns the stable string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::FetchFailed => "fetch_failed",
            Self::MergeQueued => "merge_queued",
            Self::Merging => "merging",
            Self::Merged => "merged",
            Self::MergeFailed => "merge_failed",
        }
    }

    /// Returns true for states an item never leaves.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::FetchFailed | Self::Merged | Self::MergeFailed)
    }

    /// Returns true when moving from `self` to `next` is a legal, forward-only transition.
    #[must_use]
    pub fn can_transition_to(self, next: ItemState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Fetching | Self::FetchFailed)
                | (Self::Fetching, Self::FetchFailed | Self::MergeQueued)
                | (Self::MergeQueued, Self::Merging | Self::MergeFailed)
                | (Self::Merging, Self::Merged | Self::MergeFailed)
        )
    }

    /// The failure state an item in this state ends in when it is abandoned.
    ///
    /// Returns `None` for terminal states.
    #[must_use]
    pub fn failure_state(self) -> Option<ItemState> {
        match self {
            Self::Pending | Self::Fetching => Some(Self::FetchFailed),
            Self::MergeQueued | Self::Merging => Some(Self::MergeFailed),
            Self::FetchFailed | Self::Merged | Self::MergeFailed => None,
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors returned by [`StateBoard::transition`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// The item was never registered with this board.
    #[error("unknown item {0}")]
    UnknownItem(ItemId),

    /// The requested transition would revisit or skip a state.
    #[error("illegal transition for item {item_id}: {from} -> {to}")]
    IllegalTransition {
        /// Item whose transition was rejected.
        item_id: ItemId,
        /// Current state.
        from: ItemState,
        /// Requested state.
        to: ItemState,
    },
}

#[derive(Debug, Default)]
struct BoardInner {
    states: HashMap<ItemId, ItemState>,
    fetching: usize,
    peak_fetching: usize,
}

/// Per-run table of item states.
///
/// All mutation goes through [`transition`](Self::transition), which rejects
/// anything other than a forward move in the lifecycle.
#[derive(Debug, Default)]
pub struct StateBoard {
    inner: Mutex<BoardInner>,
}

impl StateBoard {
    /// Creates an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BoardInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an item in the `Pending` state. Re-registering is a no-op.
    pub fn register(&self, item_id: &ItemId) {
        self.lock()
            .states
            .entry(item_id.clone())
            .or_insert(ItemState::Pending);
    }

    /// Returns the current state of an item.
    #[must_use]
    pub fn state(&self, item_id: &ItemId) -> Option<ItemState> {
        self.lock().states.get(item_id).copied()
    }

    /// Moves an item to `next`, returning the previous state.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownItem`] for unregistered items and
    /// [`StateError::IllegalTransition`] when the move is not forward-only.
    pub fn transition(&self, item_id: &ItemId, next: ItemState) -> Result<ItemState, StateError> {
        let mut inner = self.lock();
        let current = *inner
            .states
            .get(item_id)
            .ok_or_else(|| StateError::UnknownItem(item_id.clone()))?;

        if !current.can_transition_to(next) {
            return Err(StateError::IllegalTransition {
                item_id: item_id.clone(),
                from: current,
                to: next,
            });
        }

        inner.states.insert(item_id.clone(), next);
        if current == ItemState::Fetching {
            inner.fetching = inner.fetching.saturating_sub(1);
        }
        if next == ItemState::Fetching {
            inner.fetching += 1;
            inner.peak_fetching = inner.peak_fetching.max(inner.fetching);
        }
        trace!(item_id = %item_id, from = %current, to = %next, "item state changed");
        Ok(current)
    }

    /// Moves a non-terminal item into the failure state matching its stage.
    ///
    /// Returns the terminal state the item ended in, or `None` if it was
    /// already terminal or unknown.
    pub fn abandon(&self, item_id: &ItemId) -> Option<ItemState> {
        let failure = self.state(item_id)?.failure_state()?;
        self.transition(item_id, failure).ok().map(|_| failure)
    }

    /// Number of items currently in the `Fetching` state.
    #[must_use]
    pub fn fetching(&self) -> usize {
        self.lock().fetching
    }

    /// Highest number of items observed in `Fetching` at the same time.
    #[must_use]
    pub fn peak_fetching(&self) -> usize {
        self.lock().peak_fetching
    }

    /// Number of items currently in `state`.
    #[must_use]
    pub fn count(&self, state: ItemState) -> usize {
        self.lock().states.values().filter(|s| **s == state).count()
    }
}
