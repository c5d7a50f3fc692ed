//! Mediabatch Core Library
//!
//! This library batch-acquires paired media assets (one audio stream and one
//! video stream per item), merges each pair into a single playable file with an
//! external tool, and reports a per-item outcome.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`item`] - Item model and per-item lifecycle state tracking
//! - [`source`] - The [`ItemSource`] seam and a JSON manifest implementation
//! - [`download`] - Admission gate, streaming asset fetcher and retry policy
//! - [`merge`] - Merge jobs, the bounded merge worker pool and the ffmpeg adapter
//! - [`pipeline`] - The coordinator that connects both stages
//! - [`report`] - Thread-safe result aggregation and the final summary
//! - [`progress`] - Progress telemetry sink
//! - [`config`] - File configuration
//! - [`shutdown`] - Signal handling for graceful interruption
//!
//! Downloads run as cooperative tokio tasks bounded by a [`DownloadGate`];
//! merges run on a separate, independently sized pool of workers fed through a
//! channel, so a slow merge never stalls network fetches.

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod item;
pub mod merge;
pub mod paths;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod shutdown;
pub mod source;
mod user_agent;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::{ConfigError, FileConfig};
pub use download::{
    ClientOptions, DEFAULT_MAX_RETRIES, DownloadError, DownloadGate, FailureType, FetchOutcome,
    FetchProgress, GatePermit, HttpClient, RetryDecision, RetryPolicy, classify_error,
};
pub use item::{AssetKind, Item, ItemId, ItemState, StateBoard, StreamPair};
pub use merge::{FfmpegMerger, MergeError, MergeJob, MergeScheduler, MergeStats, Merger};
pub use pipeline::{
    DEFAULT_DOWNLOAD_CONCURRENCY, DEFAULT_MERGE_CONCURRENCY, PipelineConfig, PipelineCoordinator,
    PipelineError, RunReport,
};
pub use progress::{NoopProgress, ProgressReporter};
pub use report::{FailureKind, PipelineResult, PipelineSummary, ResultAggregator};
pub use source::{ItemSource, ManifestEntry, ManifestSource, SourceError};
pub use user_agent::BROWSER_USER_AGENT;
