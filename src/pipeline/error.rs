//! Run-level errors.
//!
//! Only preconditions checked before any item is processed are fatal; every
//! per-item problem ends up as a failed result instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::item::ItemId;
use crate::merge::MergeError;
use crate::source::SourceError;

/// Errors that stop a run before any item is processed.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The external merge tool cannot be run.
    #[error("merge tool unavailable: {0}")]
    MergerUnavailable(#[source] MergeError),

    /// The item list could not be obtained.
    #[error("failed to list items: {0}")]
    Source(#[from] SourceError),

    /// The item source returned no items.
    #[error("item source returned no items")]
    EmptyItemList,

    /// Two items share an id, so their outcomes could not be told apart.
    #[error("item {index} reuses id {item_id}")]
    DuplicateItem {
        /// The repeated id.
        item_id: ItemId,
        /// Display index of the second item carrying it.
        index: usize,
    },

    /// An output or temp directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    Io {
        /// Directory that could not be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}
