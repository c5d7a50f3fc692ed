//! Error types for the merge stage.

use std::path::PathBuf;

use thiserror::Error;

use crate::item::ItemId;

/// Errors that can occur while merging one item.
///
/// Everything except [`MergeError::Unavailable`] is a per-item failure.
/// `Unavailable` is checked once before any work starts and aborts the run.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The merge tool cannot be run at all.
    #[error("merge tool {program} is unavailable: {detail}")]
    Unavailable {
        /// Program that was probed.
        program: PathBuf,
        /// What went wrong.
        detail: String,
    },

    /// The merge process could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The merge process exited unsuccessfully.
    #[error("merge tool exited with {}: {detail}", .code.map_or_else(|| "signal".to_string(), |c| format!("status {c}")))]
    ExitStatus {
        /// Exit code (`None` if terminated by a signal).
        code: Option<i32>,
        /// Last diagnostic lines from the tool.
        detail: String,
    },

    /// The tool reported success but the output file is missing.
    #[error("merge produced no output at {path}")]
    MissingOutput {
        /// Expected output path.
        path: PathBuf,
    },

    /// The tool reported success but the output file is empty.
    #[error("merge produced an empty output at {path}")]
    EmptyOutput {
        /// Output path.
        path: PathBuf,
    },

    /// File system error around the merge.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The merge task panicked.
    #[error("merge of {item_id} panicked")]
    Panicked {
        /// Item being merged.
        item_id: ItemId,
    },

    /// The merge scheduler stopped accepting jobs.
    #[error("merge scheduler closed before {item_id} could be queued")]
    SchedulerClosed {
        /// Item that could not be queued.
        item_id: ItemId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_display() {
        let error = MergeError::ExitStatus {
            code: Some(1),
            detail: "Invalid data found".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "merge tool exited with status 1: Invalid data found"
        );

        let killed = MergeError::ExitStatus {
            code: None,
            detail: String::new(),
        };
        assert!(killed.to_string().contains("signal"));
    }

    #[test]
    fn test_unavailable_display_names_program() {
        let error = MergeError::Unavailable {
            program: PathBuf::from("/opt/ffmpeg"),
            detail: "not found".to_string(),
        };
        assert!(error.to_string().contains("/opt/ffmpeg"));
    }
}
