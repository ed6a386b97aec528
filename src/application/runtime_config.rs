use std::num::NonZeroU64;
use std::path::PathBuf;
use std::time::Duration;

use snafu::{Snafu, ensure};

use crate::application::data::LogLevel;
use crate::cli::Cli;
use crate::ext::{BestEffortPathExt, lexical_absolute};

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub source: PathBuf,
    pub replica: PathBuf,
    pub interval: Duration,
    pub log_file: PathBuf,
    pub log_level: LogLevel,
    pub max_runs: Option<NonZeroU64>,
}

impl From<Cli> for RuntimeConfig {
    fn from(cli: Cli) -> Self {
        Self {
            source: cli.source,
            replica: cli.replica,
            interval: Duration::from_secs(cli.interval),
            log_file: cli.log_file,
            log_level: cli.log_level,
            max_runs: cli.max_runs,
        }
    }
}

impl RuntimeConfig {
    /// Rejects configurations where one tree would mirror into the other.
    ///
    /// The check is lexical so it works before the replica exists. Whether
    /// the source exists is left to each run.
    pub fn validate(&self) -> Result<(), RuntimeConfigError> {
        ensure!(!self.interval.is_zero(), ZeroIntervalSnafu);

        let source = lexical_absolute(&self.source);
        let replica = lexical_absolute(&self.replica);

        ensure!(
            source != replica,
            SameTreeSnafu {
                path: source.clone()
            }
        );
        ensure!(
            !replica.starts_with(&source),
            ReplicaInsideSourceSnafu {
                source_root: source.clone(),
                replica_root: replica.clone(),
            }
        );
        ensure!(
            !source.starts_with(&replica),
            SourceInsideReplicaSnafu {
                source_root: source,
                replica_root: replica,
            }
        );

        Ok(())
    }
}

#[derive(Debug, Snafu)]
pub enum RuntimeConfigError {
    #[snafu(display("Synchronization interval must be at least one second"))]
    ZeroInterval,
    #[snafu(display(
        "Source and replica are the same directory: {}",
        path.best_effort_path_display()
    ))]
    SameTree { path: PathBuf },
    #[snafu(display(
        "Replica {} lies inside source {}",
        replica_root.best_effort_path_display(),
        source_root.best_effort_path_display()
    ))]
    ReplicaInsideSource {
        source_root: PathBuf,
        replica_root: PathBuf,
    },
    #[snafu(display(
        "Source {} lies inside replica {}",
        source_root.best_effort_path_display(),
        replica_root.best_effort_path_display()
    ))]
    SourceInsideReplica {
        source_root: PathBuf,
        replica_root: PathBuf,
    },
}
