use std::num::NonZeroU64;
use std::path::PathBuf;

use clap::Parser;

use crate::application::data::LogLevel;

/// Periodically mirror a source directory tree onto a replica.
#[derive(Parser, Debug, Clone)]
#[command(version)]
pub struct Cli {
    /// Directory to mirror from
    pub source: PathBuf,
    /// Directory kept identical to the source
    pub replica: PathBuf,
    /// Seconds to wait between the end of one run and the start of the next
    #[clap(value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,
    /// File that every action is appended to
    pub log_file: PathBuf,

    #[clap(long, short, default_value = "info", value_enum)]
    pub log_level: LogLevel,

    /// Stop after this many runs instead of running forever
    #[clap(long)]
    pub max_runs: Option<NonZeroU64>,
}
