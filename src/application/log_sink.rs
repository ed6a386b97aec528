use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use snafu::{ResultExt, Snafu};
use supports_color::Stream;
use tracing::{Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::prelude::*;

use crate::application::data::LogLevel;
use crate::ext::BestEffortPathExt;

/// Opens the log file for appending, creating it if needed. Earlier runs'
/// lines are kept.
pub fn open_log_file(path: &Path) -> Result<File, LogSinkError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .context(OpenLogFileSnafu {
            path: path.to_path_buf(),
        })
}

/// Builds the two-sink subscriber: `console` gets coloured output when
/// `console_ansi` is set, `file` always gets plain lines. Every line starts
/// with its timestamp.
pub fn log_subscriber<W>(
    level: Level,
    console: W,
    console_ansi: bool,
    file: File,
) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let console_layer = fmt::layer()
        .with_target(false)
        .with_ansi(console_ansi)
        .with_writer(console);
    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(LevelFilter::from_level(level))
        .with(console_layer)
        .with(file_layer)
}

/// Sends every event both to stdout and to `log_file`. `LogLevel::Silent`
/// installs nothing.
pub fn install_log_sink(level: &LogLevel, log_file: &Path) -> Result<(), LogSinkError> {
    let file = open_log_file(log_file)?;

    let Some(level) = level.to_tracing_level() else {
        return Ok(());
    };

    log_subscriber(
        level,
        io::stdout,
        supports_color::on(Stream::Stdout).is_some(),
        file,
    )
    .try_init()
    .map_err(|err| LogSinkError::InstallError {
        error: err.to_string(),
    })
}

#[derive(Debug, Snafu)]
pub enum LogSinkError {
    #[snafu(display("Failed to open log file {}", path.best_effort_path_display()))]
    OpenLogFileError { path: PathBuf, source: io::Error },
    #[snafu(display("Failed to install log subscriber: {}", error))]
    InstallError { error: String },
}
