//! HTTP client wrapper for fetching media assets.
//!
//! This module provides the `HttpClient` struct which streams one remote asset
//! to a local destination in bounded increments, reporting cumulative bytes as
//! it goes. Cleanup of a partially written destination is the caller's job.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, WRITE_CHUNK_BYTES};
use super::error::DownloadError;
use crate::user_agent;

/// Settings for building an [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Maximum idle time between body reads in seconds.
    pub read_timeout_secs: u64,
    /// User-Agent override; the tool's own agent string is used when `None`.
    pub user_agent: Option<String>,
    /// Referer header sent with every request (some media hosts require one).
    pub referer: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            user_agent: None,
            referer: None,
        }
    }
}

/// Cumulative transfer state reported while a fetch is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    /// Bytes written to the destination so far.
    pub bytes_transferred: u64,
    /// Size advertised by the server, if any.
    pub expected_bytes: Option<u64>,
}

/// Result of a completed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Destination that now holds the asset.
    pub path: PathBuf,
    /// Total bytes written.
    pub bytes_written: u64,
    /// Size advertised by the server, if any.
    pub expected_bytes: Option<u64>,
}

/// HTTP client for fetching assets with streaming support.
///
/// Designed to be created once and shared by all item tasks, taking advantage
/// of connection pooling. Cloning is cheap.
///
/// # Example
///
/// ```no_run
/// use mediabatch_core::download::HttpClient;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new()?;
/// let outcome = client
///     .fetch("https://example.com/stream.m4s", Path::new("/tmp/stream.m4s"), |_| {})
///     .await?;
/// println!("wrote {} bytes", outcome.bytes_written);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with default timeouts and headers.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend or system
    /// configuration prevents building the client.
    pub fn new() -> Result<Self, DownloadError> {
        Self::with_options(&ClientOptions::default())
    }

    /// Creates a client from explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the client cannot be built.
    #[instrument(level = "debug")]
    pub fn with_options(options: &ClientOptions) -> Result<Self, DownloadError> {
        let mut headers = HeaderMap::new();
        if let Some(referer) = options.referer.as_deref() {
            match HeaderValue::from_str(referer) {
                Ok(value) => {
                    headers.insert(REFERER, value);
                }
                Err(_) => warn!(referer, "ignoring referer that is not a valid header value"),
            }
        }

        let agent = options
            .user_agent
            .clone()
            .unwrap_or_else(user_agent::default_user_agent);

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(options.connect_timeout_secs))
            .read_timeout(Duration::from_secs(options.read_timeout_secs))
            .gzip(true)
            .user_agent(agent)
            .default_headers(headers)
            .build()
            .map_err(|source| DownloadError::ClientBuild { source })?;

        Ok(Self { client })
    }

    /// Streams `url` into `destination`, calling `on_progress` after every write.
    ///
    /// The expected size comes from the response's `Content-Length`; a missing
    /// or zero value means "unknown" and disables the completeness checks.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The location is not a valid URL
    /// - The request fails (network error, timeout) or the body is cut off
    /// - The server returns an error status (4xx, 5xx)
    /// - Fewer bytes than advertised were received, or none at all
    /// - Writing to disk fails
    ///
    /// On error the destination may hold a partial file; removing it is the
    /// caller's responsibility.
    #[instrument(skip(self, on_progress), fields(url = %url, path = %destination.display()))]
    pub async fn fetch<F>(
        &self,
        url: &str,
        destination: &Path,
        mut on_progress: F,
    ) -> Result<FetchOutcome, DownloadError>
    where
        F: FnMut(FetchProgress) + Send,
    {
        debug!("starting fetch");

        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let expected_bytes = response.content_length().filter(|len| *len > 0);
        debug!(expected_bytes = ?expected_bytes, "response headers received");

        let mut file = File::create(destination)
            .await
            .map_err(|e| DownloadError::io(destination, e))?;

        on_progress(FetchProgress {
            bytes_transferred: 0,
            expected_bytes,
        });

        let bytes_written = stream_to_file(
            &mut file,
            response,
            url,
            destination,
            expected_bytes,
            &mut on_progress,
        )
        .await?;

        verify_body_length(url, expected_bytes, bytes_written)?;

        info!(bytes = bytes_written, "fetch complete");

        Ok(FetchOutcome {
            path: destination.to_path_buf(),
            bytes_written,
            expected_bytes,
        })
    }
}

/// Streams response body to file in slices of at most [`WRITE_CHUNK_BYTES`],
/// returning bytes written.
async fn stream_to_file<F>(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
    expected_bytes: Option<u64>,
    on_progress: &mut F,
) -> Result<u64, DownloadError>
where
    F: FnMut(FetchProgress) + Send,
{
    let mut writer = BufWriter::with_capacity(WRITE_CHUNK_BYTES, file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url, e))?;

        for slice in chunk.chunks(WRITE_CHUNK_BYTES) {
            writer
                .write_all(slice)
                .await
                .map_err(|e| DownloadError::io(file_path, e))?;
            bytes_written += slice.len() as u64;
            on_progress(FetchProgress {
                bytes_transferred: bytes_written,
                expected_bytes,
            });
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}

/// Checks the written size against the advertised size.
///
/// An unknown expected size always passes; an empty body for a nonzero
/// expected size and any shortfall are failures.
///
/// # Errors
///
/// Returns [`DownloadError::EmptyBody`] or [`DownloadError::Truncated`].
pub fn verify_body_length(
    url: &str,
    expected_bytes: Option<u64>,
    written: u64,
) -> Result<(), DownloadError> {
    match expected_bytes {
        Some(expected) if expected > 0 && written == 0 => {
            Err(DownloadError::empty_body(url, expected))
        }
        Some(expected) if written < expected => {
            Err(DownloadError::truncated(url, expected, written))
        }
        _ => Ok(()),
    }
}
