//! Temp and output path naming, plus best-effort file cleanup.
//!
//! Every item gets one random identifier for both of its temp files, so items
//! sharing a temp directory never collide. Output names are derived from the
//! display index and a sanitized title.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::item::{AssetKind, Item};

/// Extension of the merged output container.
pub const OUTPUT_EXTENSION: &str = "mp4";

/// Extension of fetched stream segments.
const TEMP_EXTENSION: &str = "m4s";

/// Maximum number of characters kept from a title.
const MAX_TITLE_CHARS: usize = 120;

/// The two temp files owned by one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempAssets {
    /// Destination of the audio-only stream.
    pub audio: PathBuf,
    /// Destination of the video-only stream.
    pub video: PathBuf,
}

impl TempAssets {
    /// Allocates a fresh, collision-free pair of temp paths under `temp_dir`.
    #[must_use]
    pub fn allocate(temp_dir: &Path) -> Self {
        let prefix = Uuid::new_v4().simple().to_string();
        Self {
            audio: temp_dir.join(format!("{prefix}_audio.{TEMP_EXTENSION}")),
            video: temp_dir.join(format!("{prefix}_video.{TEMP_EXTENSION}")),
        }
    }

    /// Returns the path for one asset kind.
    #[must_use]
    pub fn path(&self, kind: AssetKind) -> &Path {
        match kind {
            AssetKind::Audio => &self.audio,
            AssetKind::Video => &self.video,
        }
    }

    /// Removes both temp files, ignoring files that were never created.
    pub async fn remove_all(&self) {
        remove_file_best_effort(&self.audio).await;
        remove_file_best_effort(&self.video).await;
    }
}

/// Builds `<output_dir>/<index>.<title>.mp4` for an item.
#[must_use]
pub fn output_path(output_dir: &Path, item: &Item) -> PathBuf {
    let mut title = sanitize_title(&item.title);
    if title.is_empty() {
        title = sanitize_title(item.id.as_str());
    }
    if title.is_empty() {
        title = "untitled".to_string();
    }
    output_dir.join(format!("{}.{title}.{OUTPUT_EXTENSION}", item.index))
}

/// Makes a title safe to use as a single path segment.
///
/// Path separators, reserved characters and control characters become `_`;
/// leading/trailing whitespace and dots are trimmed and the result is capped
/// in length. May return an empty string.
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let mapped: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_TITLE_CHARS)
        .collect();
    mapped
        .trim_matches(|c: char| c.is_whitespace() || c == '.')
        .to_string()
}

/// Removes a file, logging (not returning) any error other than "not found".
///
/// Returns true when a file was actually removed.
pub async fn remove_file_best_effort(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed file");
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove file");
            false
        }
    }
}

/// Returns the size of a file, or `None` if it does not exist or cannot be read.
pub async fn file_len(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path).await.ok().map(|m| m.len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_temp_assets_are_unique_and_share_prefix() {
        let dir = Path::new("/tmp/work");
        let first = TempAssets::allocate(dir);
        let second = TempAssets::allocate(dir);
        assert_ne!(first, second);

        let audio = first.audio.file_name().unwrap().to_str().unwrap();
        let video = first.video.file_name().unwrap().to_str().unwrap();
        assert!(audio.ends_with("_audio.m4s"));
        assert!(video.ends_with("_video.m4s"));
        assert_eq!(audio.split('_').next(), video.split('_').next());
        assert_eq!(first.path(AssetKind::Audio), first.audio.as_path());
    }

    #[test]
    fn test_output_path_uses_index_and_title() {
        let item = Item::new("ep1", 3, "Intro: part 1/2", 60);
        let path = output_path(Path::new("out"), &item);
        assert_eq!(path, PathBuf::from("out/3.Intro_ part 1_2.mp4"));
    }

    #[test]
    fn test_output_path_falls_back_to_id() {
        let item = Item::new("ep-7", 7, "  ...  ", 0);
        let path = output_path(Path::new("out"), &item);
        assert_eq!(path, PathBuf::from("out/7.ep-7.mp4"));
    }

    #[test]
    fn test_sanitize_title_strips_controls_and_caps_length() {
        assert_eq!(sanitize_title("a\u{0}b\nc"), "a_b_c");
        assert_eq!(sanitize_title(&"x".repeat(500)).chars().count(), MAX_TITLE_CHARS);
        assert_eq!(sanitize_title(".."), "");
    }

    #[tokio::test]
    async fn test_remove_file_best_effort_handles_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.m4s");
        assert!(!remove_file_best_effort(&path).await);

        std::fs::write(&path, b"data").unwrap();
        assert_eq!(file_len(&path).await, Some(4));
        assert!(remove_file_best_effort(&path).await);
        assert!(!path.exists());
        assert_eq!(file_len(&path).await, None);
    }

    #[tokio::test]
    async fn test_remove_all_removes_both_files() {
        let dir = TempDir::new().unwrap();
        let temps = TempAssets::allocate(dir.path());
        std::fs::write(&temps.audio, b"a").unwrap();
        temps.remove_all().await;
        assert!(!temps.audio.exists());
        assert!(!temps.video.exists());
    }
}
