//! CLI 定义
//!
//! clap derive 的命令行参数；CLI 标志覆盖配置文件同名项

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "sonovel",
    version,
    about = "Convert speaker-tagged scripts into stitched audiobooks via a TTS service"
)]
pub struct Cli {
    /// Path to a config file (defaults to sonovel.toml / sonovel.local.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate the audiobook for a script (incremental, cache-aware)
    Generate {
        /// Speaker-tagged script file
        script: PathBuf,

        /// Output root directory (overrides config)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Max concurrent TTS requests (overrides config)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Ignore the cache and regenerate every segment
        #[arg(long)]
        force: bool,

        /// Use the offline fake TTS client instead of the remote service
        #[arg(long)]
        fake_tts: bool,

        /// Generate segments only, skip final assembly
        #[arg(long)]
        skip_assembly: bool,
    },

    /// Show the cache partition and aggregate stats for a script
    Status {
        script: PathBuf,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Regenerate only the segments whose voice configuration drifted
    RefreshVoices {
        script: PathBuf,

        /// Restrict to the given speakers (repeatable)
        #[arg(long = "speaker")]
        speakers: Vec<String>,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        #[arg(long)]
        fake_tts: bool,
    },

    /// Remove cached entries (and audio) for the given speakers
    Invalidate {
        script: PathBuf,

        /// Speakers to invalidate (repeatable, case-insensitive)
        #[arg(long = "speaker", required = true)]
        speakers: Vec<String>,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Delete the script's entire cache directory
    Clear {
        script: PathBuf,

        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}
