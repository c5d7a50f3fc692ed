//! Merge stage: combining a fetched video stream and audio stream into one file.
//!
//! - [`Merger`] is the seam over the external tool; [`FfmpegMerger`] drives ffmpeg
//! - [`MergeScheduler`] runs a fixed number of workers fed through a FIFO channel
//!
//! The merge stage owns the temp inputs of every job handed to it and removes
//! them whether the merge succeeds or not.

mod error;
mod ffmpeg;
pub mod progress;
mod scheduler;

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;

use crate::item::{Item, ItemId};

pub use error::MergeError;
pub use ffmpeg::{DEFAULT_PROGRAM, FfmpegMerger};
pub use scheduler::{MergeContext, MergeHandle, MergeScheduler, MergeStats, SubmitError};

/// Work unit handed from the download stage to the merge stage.
///
/// Both input files exist and are non-empty when a job is created.
#[derive(Debug, Clone)]
pub struct MergeJob {
    /// Item being merged.
    pub item_id: ItemId,
    /// Display index.
    pub index: usize,
    /// Item title.
    pub title: String,
    /// Fetched video-only stream.
    pub video_path: PathBuf,
    /// Fetched audio-only stream.
    pub audio_path: PathBuf,
    /// Destination of the merged file.
    pub output_path: PathBuf,
    /// Expected media length in seconds (0 if unknown).
    pub duration_secs: u64,
    /// When the job was queued.
    pub submitted_at: Instant,
}

impl MergeJob {
    /// Creates a job for `item`, stamped with the current time.
    #[must_use]
    pub fn new(item: &Item, video_path: PathBuf, audio_path: PathBuf, output_path: PathBuf) -> Self {
        Self {
            item_id: item.id.clone(),
            index: item.index,
            title: item.title.clone(),
            video_path,
            audio_path,
            output_path,
            duration_secs: item.duration_secs,
            submitted_at: Instant::now(),
        }
    }
}

/// Combines two single-stream inputs into one output file.
#[async_trait]
pub trait Merger: Send + Sync {
    /// Checks that the merge tool can be run. Called once before any work starts.
    async fn ensure_available(&self) -> Result<(), MergeError>;

    /// Merges `job.video_path` and `job.audio_path` into `job.output_path`,
    /// reporting elapsed media seconds through `on_progress`.
    ///
    /// Implementations do not remove inputs or partial outputs; the scheduler does.
    async fn merge(
        &self,
        job: &MergeJob,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<(), MergeError>;
}
