//! CLI argument definitions using clap derive macros.
//!
//! Run settings are `Option`s so that an unset flag falls back to the config
//! file and then to the built-in default.

use std::path::PathBuf;

use clap::Parser;

/// Batch-download paired audio/video streams and merge each pair into one file.
///
/// MANIFEST is a JSON document listing the items to process, each with an id,
/// a title, a duration and the locations of its video and audio streams.
#[derive(Parser, Debug)]
#[command(name = "mediabatch")]
#[command(author, version, about)]
pub struct Args {
    /// JSON manifest of items to process
    #[arg(value_name = "MANIFEST")]
    pub manifest: PathBuf,

    /// Items fetching at the same time (1-64) [default: 1]
    #[arg(short = 'd', long, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub download_concurrency: Option<u8>,

    /// Merges running at the same time (1-64) [default: 1]
    #[arg(short = 'm', long, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub merge_concurrency: Option<u8>,

    /// Directory for merged files [default: ./download]
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Directory for fetched streams [default: ./download/temp]
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Attempts per stream, including the first (1-10) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_retries: Option<u32>,

    /// Merge tool executable [default: ffmpeg]
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,

    /// Referer header sent with every fetch
    #[arg(long)]
    pub referer: Option<String>,

    /// User-Agent sent with every fetch
    #[arg(long, conflicts_with = "browser_user_agent")]
    pub user_agent: Option<String>,

    /// Send a desktop browser User-Agent
    #[arg(long)]
    pub browser_user_agent: bool,

    /// Config file [default: $XDG_CONFIG_HOME/mediabatch/config.toml]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_manifest_only() {
        let args = Args::try_parse_from(["mediabatch", "batch.json"]).unwrap();
        assert_eq!(args.manifest, PathBuf::from("batch.json"));
        assert_eq!(args.download_concurrency, None);
        assert_eq!(args.merge_concurrency, None);
        assert_eq!(args.max_retries, None);
        assert!(!args.no_progress);
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
    }

    #[test]
    fn test_cli_manifest_is_required() {
        let err = Args::try_parse_from(["mediabatch"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_concurrency_flags() {
        let args = Args::try_parse_from(["mediabatch", "-d", "4", "-m", "2", "b.json"]).unwrap();
        assert_eq!(args.download_concurrency, Some(4));
        assert_eq!(args.merge_concurrency, Some(2));

        let args = Args::try_parse_from([
            "mediabatch",
            "--download-concurrency",
            "64",
            "--merge-concurrency",
            "1",
            "b.json",
        ])
        .unwrap();
        assert_eq!(args.download_concurrency, Some(64));
        assert_eq!(args.merge_concurrency, Some(1));
    }

    #[test]
    fn test_cli_concurrency_out_of_range_rejected() {
        for bad in [["-d", "0"], ["-d", "65"], ["-m", "0"]] {
            let err = Args::try_parse_from(["mediabatch", bad[0], bad[1], "b.json"]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn test_cli_max_retries_range() {
        let args = Args::try_parse_from(["mediabatch", "-r", "1", "b.json"]).unwrap();
        assert_eq!(args.max_retries, Some(1));

        let err = Args::try_parse_from(["mediabatch", "-r", "11", "b.json"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_paths_and_headers() {
        let args = Args::try_parse_from([
            "mediabatch",
            "-o",
            "out",
            "--temp-dir",
            "tmp",
            "--ffmpeg",
            "/opt/ffmpeg",
            "--referer",
            "https://www.example.com/",
            "--config",
            "cfg.toml",
            "b.json",
        ])
        .unwrap();
        assert_eq!(args.output_dir, Some(PathBuf::from("out")));
        assert_eq!(args.temp_dir, Some(PathBuf::from("tmp")));
        assert_eq!(args.ffmpeg, Some(PathBuf::from("/opt/ffmpeg")));
        assert_eq!(args.referer.as_deref(), Some("https://www.example.com/"));
        assert_eq!(args.config, Some(PathBuf::from("cfg.toml")));
    }

    #[test]
    fn test_cli_user_agent_conflicts_with_browser_flag() {
        let err = Args::try_parse_from([
            "mediabatch",
            "--user-agent",
            "x",
            "--browser-user-agent",
            "b.json",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_verbose_and_quiet() {
        let args = Args::try_parse_from(["mediabatch", "-vv", "b.json"]).unwrap();
        assert_eq!(args.verbose, 2);
        let args = Args::try_parse_from(["mediabatch", "-q", "--no-progress", "b.json"]).unwrap();
        assert!(args.quiet);
        assert!(args.no_progress);
    }

    #[test]
    fn test_cli_help_and_version() {
        let err = Args::try_parse_from(["mediabatch", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        let err = Args::try_parse_from(["mediabatch", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
