//! Resolution of run settings: CLI flag > config file > built-in default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mediabatch_core::download::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use mediabatch_core::merge::DEFAULT_PROGRAM;
use mediabatch_core::{
    BROWSER_USER_AGENT, ClientOptions, DEFAULT_MAX_RETRIES, FileConfig, PipelineConfig,
    RetryPolicy,
};
use tracing::debug;

use crate::cli::Args;

/// Everything the runtime needs to build a coordinator.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedSettings {
    pub(crate) pipeline: PipelineConfig,
    pub(crate) client: ClientOptions,
    pub(crate) ffmpeg: PathBuf,
}

/// Loads the explicit config file, or the default one if it exists.
pub(crate) fn load_file_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        let config = FileConfig::load(path)
            .with_context(|| format!("Failed to load config file '{}'", path.display()))?;
        return Ok(Some(config));
    }
    let config = FileConfig::load_default().context("Failed to load default config file")?;
    if config.is_some() {
        debug!("using default config file");
    }
    Ok(config)
}

/// Merges CLI flags over file values over defaults.
pub(crate) fn resolve_settings(args: &Args, file: Option<&FileConfig>) -> ResolvedSettings {
    let file = file.cloned().unwrap_or_default();
    let defaults = PipelineConfig::default();

    let max_retries = args
        .max_retries
        .or(file.max_retries)
        .unwrap_or(DEFAULT_MAX_RETRIES);

    let output_dir = args
        .output_dir
        .clone()
        .or(file.output_dir)
        .unwrap_or(defaults.output_dir);
    // Without an explicit temp dir, streams are staged next to the outputs.
    let temp_dir = args
        .temp_dir
        .clone()
        .or(file.temp_dir)
        .unwrap_or_else(|| output_dir.join("temp"));

    let pipeline = PipelineConfig {
        download_concurrency: args
            .download_concurrency
            .map(usize::from)
            .or(file.download_concurrency)
            .unwrap_or(defaults.download_concurrency),
        merge_concurrency: args
            .merge_concurrency
            .map(usize::from)
            .or(file.merge_concurrency)
            .unwrap_or(defaults.merge_concurrency),
        output_dir,
        temp_dir,
        retry_policy: RetryPolicy::with_max_attempts(max_retries),
    };

    let user_agent = if args.browser_user_agent {
        Some(BROWSER_USER_AGENT.to_string())
    } else {
        args.user_agent.clone().or(file.user_agent)
    };

    let client = ClientOptions {
        connect_timeout_secs: file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
        read_timeout_secs: file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
        user_agent,
        referer: args.referer.clone().or(file.referer),
    };

    ResolvedSettings {
        pipeline,
        client,
        ffmpeg: args
            .ffmpeg
            .clone()
            .or(file.ffmpeg)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRAM)),
    }
}

/// Default log level for the given flags; `RUST_LOG` still takes precedence.
pub(crate) fn resolve_default_log_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}
