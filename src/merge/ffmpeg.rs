//! [`Merger`] backed by an external ffmpeg process.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, instrument, trace};

use super::progress::{LineSplitter, is_progress_line, parse_progress_line};
use super::{MergeError, MergeJob, Merger};

/// Program name looked up on `PATH` when no explicit path is configured.
pub const DEFAULT_PROGRAM: &str = "ffmpeg";

/// Diagnostic lines kept for the error message of a failed merge.
const DIAGNOSTIC_TAIL_LINES: usize = 8;

const STDERR_READ_BYTES: usize = 4096;

/// Runs `ffmpeg -i <video> -i <audio>` with stream copy into the output container.
#[derive(Debug, Clone)]
pub struct FfmpegMerger {
    program: PathBuf,
}

impl Default for FfmpegMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegMerger {
    /// Uses `ffmpeg` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program(DEFAULT_PROGRAM)
    }

    /// Uses an explicit executable.
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The executable this merger invokes.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command-line arguments for one job.
    ///
    /// Video is copied from the first input and audio from the second; the
    /// output stops at the shorter of the two and overwrites any existing file.
    #[must_use]
    pub fn build_args(job: &MergeJob) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(job.video_path.clone().into_os_string());
        args.push("-i".into());
        args.push(job.audio_path.clone().into_os_string());
        args.extend(
            [
                "-c:v", "copy", "-c:a", "copy", "-map", "0:v:0", "-map", "1:a:0", "-shortest", "-y",
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(job.output_path.clone().into_os_string());
        args
    }
}

#[async_trait]
impl Merger for FfmpegMerger {
    #[instrument(skip(self), fields(program = %self.program.display()))]
    async fn ensure_available(&self) -> Result<(), MergeError> {
        let output = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| MergeError::Unavailable {
                program: self.program.clone(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MergeError::Unavailable {
                program: self.program.clone(),
                detail: format!("`-version` exited with {}: {}", output.status, stderr.trim()),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(
            version = stdout.lines().next().unwrap_or_default(),
            "merge tool available"
        );
        Ok(())
    }

    #[instrument(skip(self, job, on_progress), fields(item_id = %job.item_id))]
    async fn merge(
        &self,
        job: &MergeJob,
        on_progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<(), MergeError> {
        let mut child = Command::new(&self.program)
            .args(Self::build_args(job))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MergeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut diagnostics: VecDeque<String> = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);
        let mut keep = |line: String| {
            if let Some(elapsed) = parse_progress_line(&line) {
                trace!(elapsed, "merge progress");
                on_progress(elapsed);
            } else if !is_progress_line(&line) {
                if diagnostics.len() == DIAGNOSTIC_TAIL_LINES {
                    diagnostics.pop_front();
                }
                diagnostics.push_back(line);
            }
        };

        if let Some(mut stderr) = child.stderr.take() {
            let mut splitter = LineSplitter::new();
            let mut buf = vec![0u8; STDERR_READ_BYTES];
            loop {
                match stderr.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => splitter.push(&buf[..n]).into_iter().for_each(&mut keep),
                    Err(e) => {
                        debug!(error = %e, "stopped reading merge tool stderr");
                        break;
                    }
                }
            }
            if let Some(rest) = splitter.finish() {
                keep(rest);
            }
        }

        let status = child.wait().await.map_err(|source| MergeError::Io {
            path: self.program.clone(),
            source,
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(MergeError::ExitStatus {
                code: status.code(),
                detail: Vec::from(diagnostics).join("; "),
            })
        }
    }
}
