//! Parsing of the merge tool's progress output.
//!
//! ffmpeg writes periodic statistics lines to stderr, e.g.
//! `size=    1024kB time=00:01:05.20 bitrate= 128.0kbits/s speed=2.1x`,
//! terminated by `\r` rather than `\n`. [`LineSplitter`] turns the raw byte
//! stream into lines and [`parse_progress_line`] extracts the elapsed media time.

use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::expect_used)]
static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{2}):(\d{2}):(\d{2})").expect("timestamp regex is valid")
});

/// Returns true for a statistics line (as opposed to a diagnostic).
#[must_use]
pub fn is_progress_line(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("size=") || line.contains("time=")
}

/// Extracts the elapsed media time, in whole seconds, from a statistics line.
///
/// Returns `None` for lines that carry no timestamp or report `time=N/A`.
#[must_use]
pub fn parse_progress_line(line: &str) -> Option<u64> {
    if !is_progress_line(line) {
        return None;
    }

    let haystack = match line.find("time=") {
        Some(pos) => &line[pos + "time=".len()..],
        None => line,
    };
    if haystack.trim_start().starts_with("N/A") {
        return None;
    }

    let caps = TIMESTAMP.captures(haystack)?;
    let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
    Some(field(1)? * 3600 + field(2)? * 60 + field(3)?)
}

/// Longest line kept before it is emitted unterminated.
pub const MAX_LINE_BYTES: usize = 4 * 1024;

/// Incremental splitter treating both `\r` and `\n` as line terminators.
///
/// A line longer than [`MAX_LINE_BYTES`] is emitted in pieces of that size.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    /// Creates an empty splitter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds bytes and returns every line completed by them. Empty lines are dropped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\r' || byte == b'\n' {
                if !self.pending.is_empty() {
                    lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                    self.pending.clear();
                }
            } else {
                self.pending.push(byte);
                if self.pending.len() >= MAX_LINE_BYTES {
                    lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                    self.pending.clear();
                }
            }
        }
        lines
    }

    /// Returns the unterminated remainder, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stats_line() {
        let line = "frame= 1200 fps=300 q=-1.0 size=    2048kB time=00:01:05.20 bitrate= 257.3kbits/s speed=16x";
        assert_eq!(parse_progress_line(line), Some(65));
    }

    #[test]
    fn test_parse_size_prefixed_line() {
        assert_eq!(
            parse_progress_line("size=     512kB time=01:02:03.00 bitrate=N/A"),
            Some(3723)
        );
    }

    #[test]
    fn test_time_not_available() {
        assert_eq!(parse_progress_line("size=N/A time=N/A bitrate=N/A"), None);
    }

    #[test]
    fn test_diagnostics_are_not_progress() {
        assert_eq!(parse_progress_line("Duration: 00:03:00.00, start: 0.000"), None);
        assert_eq!(parse_progress_line("Stream #0:0: Video: h264"), None);
        assert!(!is_progress_line("Invalid data found when processing input"));
    }

    #[test]
    fn test_line_splitter_handles_carriage_returns_and_partial_chunks() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.push(b"size=1 time=00:00").is_empty());
        let lines = splitter.push(b":01.00\rsize=2 time=00:00:02.00\r\nerror line\n");
        assert_eq!(
            lines,
            vec![
                "size=1 time=00:00:01.00".to_string(),
                "size=2 time=00:00:02.00".to_string(),
                "error line".to_string(),
            ]
        );
        assert!(splitter.push(b"tail").is_empty());
        assert_eq!(splitter.finish().as_deref(), Some("tail"));
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_line_splitter_caps_unterminated_output() {
        let mut splitter = LineSplitter::new();
        let noise = vec![b'x'; MAX_LINE_BYTES * 2 + 10];
        let lines = splitter.push(&noise);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.len() == MAX_LINE_BYTES));
        assert_eq!(splitter.finish().map(|l| l.len()), Some(10));
    }
}
