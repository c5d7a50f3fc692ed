use std::io::{self, IsTerminal};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mediabatch_core::shutdown::install_signal_handler;
use mediabatch_core::{FfmpegMerger, HttpClient, ManifestSource, PipelineCoordinator};
use tracing::{debug, info};

use crate::app::exit_handler::{self, ProcessExit};
use crate::app::{config_runtime, progress_manager, terminal};
use crate::cli::Args;

pub(crate) async fn run() -> Result<ProcessExit> {
    // Parsed before tracing so that --help prints without log noise.
    let args = Args::parse();

    terminal::init_tracing(config_runtime::resolve_default_log_level(
        args.verbose,
        args.quiet,
    ));
    debug!(?args, "CLI arguments parsed");

    let file_config = config_runtime::load_file_config(args.config.as_deref())?;
    let settings = config_runtime::resolve_settings(&args, file_config.as_ref());

    let source = ManifestSource::from_path(&args.manifest)
        .await
        .with_context(|| format!("Failed to load manifest '{}'", args.manifest.display()))?;
    info!(
        manifest = %args.manifest.display(),
        items = source.len(),
        download_concurrency = settings.pipeline.download_concurrency,
        merge_concurrency = settings.pipeline.merge_concurrency,
        "mediabatch starting"
    );

    let client =
        HttpClient::with_options(&settings.client).context("Failed to build HTTP client")?;
    let merger = FfmpegMerger::with_program(settings.ffmpeg.clone());
    let cancel = install_signal_handler();

    let mut coordinator =
        PipelineCoordinator::new(settings.pipeline, client, Arc::new(source), Arc::new(merger))
            .with_cancellation(cancel);

    if terminal::should_use_progress(
        io::stderr().is_terminal(),
        args.quiet,
        args.no_progress,
        terminal::is_dumb_terminal(),
    ) {
        coordinator =
            coordinator.with_progress(Arc::new(progress_manager::IndicatifProgress::new()));
    }

    let report = coordinator.run().await?;
    debug!(
        peak_fetching = report.peak_fetching,
        peak_gate = report.peak_gate,
        peak_merging = report.merge_stats.peak_active,
        "concurrency peaks"
    );

    for path in report
        .summary
        .results
        .iter()
        .filter_map(|result| result.output_path.as_ref())
    {
        println!("{}", path.display());
    }

    Ok(exit_handler::determine_exit_outcome(&report))
}
