//! Download stage building blocks.
//!
//! - [`DownloadGate`] bounds how many items may be fetching at once
//! - [`HttpClient`] streams one asset to disk in bounded increments
//! - [`RetryPolicy`] and [`classify_error`] decide whether a failed fetch is retried
//!
//! # Example
//!
//! ```no_run
//! use mediabatch_core::download::{DownloadGate, HttpClient};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gate = DownloadGate::new(2);
//! let client = HttpClient::new()?;
//!
//! let permit = gate.acquire().await?;
//! client
//!     .fetch("https://example.com/a.m4s", Path::new("/tmp/a.m4s"), |_| {})
//!     .await?;
//! drop(permit);
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
mod gate;
mod retry;

pub use client::{ClientOptions, FetchOutcome, FetchProgress, HttpClient, verify_body_length};
pub use constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
pub use error::DownloadError;
pub use gate::{DownloadGate, GateClosed, GatePermit};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};
