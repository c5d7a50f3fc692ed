//! Item sources: where the list of items and their stream locations come from.
//!
//! [`ItemSource`] is the seam the pipeline depends on. [`ManifestSource`] is
//! the bundled implementation, reading a JSON manifest:
//!
//! ```json
//! {
//!   "items": [
//!     {
//!       "id": "ep1",
//!       "title": "Episode 1",
//!       "duration": 1520,
//!       "video_url": "https://cdn.example.com/ep1/video.m4s",
//!       "audio_url": "https://cdn.example.com/ep1/audio.m4s"
//!     }
//!   ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::item::{Item, ItemId, StreamPair};

/// Errors raised by an item source.
///
/// A failure of [`ItemSource::list_items`] is fatal to a run; a failure of
/// [`ItemSource::resolve_streams`] only fails the affected item.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The manifest could not be read.
    #[error("failed to read manifest {path}: {source}")]
    Read {
        /// Manifest path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid JSON of the expected shape.
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),

    /// An entry is unusable (empty or duplicate id).
    #[error("manifest entry {index} is invalid: {reason}")]
    InvalidEntry {
        /// 1-based position of the entry.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// Stream locations for an item could not be resolved.
    #[error("cannot resolve streams for {item_id}: {reason}")]
    Unresolvable {
        /// Item whose streams were requested.
        item_id: ItemId,
        /// What went wrong.
        reason: String,
    },
}

/// Supplies items and their stream locations.
///
/// Any authentication or session state lives inside the implementation.
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Returns every item of the batch, in display order.
    async fn list_items(&self) -> Result<Vec<Item>, SourceError>;

    /// Returns the video and audio locations of one item.
    async fn resolve_streams(&self, item: &Item) -> Result<StreamPair, SourceError>;
}

/// One entry of a JSON manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Item identifier, unique within the manifest.
    pub id: String,
    /// Title used for the output file name.
    #[serde(default)]
    pub title: String,
    /// Playback duration in seconds.
    #[serde(default)]
    pub duration: u64,
    /// Location of the video-only stream.
    pub video_url: String,
    /// Location of the audio-only stream.
    pub audio_url: String,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    items: Vec<ManifestEntry>,
}

/// [`ItemSource`] over a static list of entries.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    entries: Vec<ManifestEntry>,
    streams: HashMap<ItemId, StreamPair>,
}

impl ManifestSource {
    /// Builds a source from entries already in memory.
    #[must_use]
    pub fn from_entries(entries: Vec<ManifestEntry>) -> Self {
        let streams = entries
            .iter()
            .map(|e| {
                (
                    ItemId::new(e.id.clone()),
                    StreamPair::new(e.video_url.clone(), e.audio_url.clone()),
                )
            })
            .collect();
        Self { entries, streams }
    }

    /// Parses a manifest from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Parse`] if the text is not a valid manifest.
    pub fn from_json(json: &str) -> Result<Self, SourceError> {
        let manifest: Manifest = serde_json::from_str(json)?;
        Ok(Self::from_entries(manifest.items))
    }

    /// Reads and parses a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Read`] or [`SourceError::Parse`].
    #[instrument(fields(path = %path.display()))]
    pub async fn from_path(path: &Path) -> Result<Self, SourceError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SourceError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let source = Self::from_json(&text)?;
        debug!(entries = source.entries.len(), "manifest loaded");
        Ok(source)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the manifest has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ItemSource for ManifestSource {
    async fn list_items(&self) -> Result<Vec<Item>, SourceError> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let index = i + 1;
                if entry.id.trim().is_empty() {
                    return Err(SourceError::InvalidEntry {
                        index,
                        reason: "empty id".to_string(),
                    });
                }
                // Ids are compared exactly as they are keyed everywhere else.
                if !seen.insert(entry.id.as_str()) {
                    return Err(SourceError::InvalidEntry {
                        index,
                        reason: format!("duplicate id {:?}", entry.id),
                    });
                }
                Ok(Item::new(entry.id.clone(), index, entry.title.clone(), entry.duration))
            })
            .collect()
    }

    async fn resolve_streams(&self, item: &Item) -> Result<StreamPair, SourceError> {
        let pair = self
            .streams
            .get(&item.id)
            .ok_or_else(|| SourceError::Unresolvable {
                item_id: item.id.clone(),
                reason: "not in manifest".to_string(),
            })?;

        for location in [&pair.video, &pair.audio] {
            Url::parse(location).map_err(|e| SourceError::Unresolvable {
                item_id: item.id.clone(),
                reason: format!("invalid location {location}: {e}"),
            })?;
        }
        Ok(pair.clone())
    }
}
