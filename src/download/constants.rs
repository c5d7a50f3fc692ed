//! Constants for the download module (timeouts, write sizes).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout between body chunks (5 minutes).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Largest slice written to disk (and reported as progress) in one step.
pub const WRITE_CHUNK_BYTES: usize = 64 * 1024;
