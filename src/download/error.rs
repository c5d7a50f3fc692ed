//! Error types for the download module.
//!
//! Every variant is a `DownloadFailure` in pipeline terms: it is caught at the
//! item boundary and turned into a failed result for that item only.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching one asset.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, reset mid-body, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The location that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Connect or read timed out.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The location that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The location that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while writing the destination.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The location is not a valid absolute URL.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid location string.
        url: String,
    },

    /// The body ended before the advertised size was reached.
    #[error("truncated body from {url}: expected {expected_bytes} bytes, got {actual_bytes}")]
    Truncated {
        /// The location being fetched.
        url: String,
        /// Size advertised by the server.
        expected_bytes: u64,
        /// Bytes actually written.
        actual_bytes: u64,
    },

    /// Nothing was written although the server advertised a nonzero size.
    #[error("empty body from {url}: expected {expected_bytes} bytes")]
    EmptyBody {
        /// The location being fetched.
        url: String,
        /// Size advertised by the server.
        expected_bytes: u64,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error, promoting timeouts.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::timeout(url);
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a truncated-body error.
    pub fn truncated(url: impl Into<String>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Truncated {
            url: url.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates an empty-body error.
    pub fn empty_body(url: impl Into<String>, expected_bytes: u64) -> Self {
        Self::EmptyBody {
            url: url.into(),
            expected_bytes,
        }
    }
}
