use std::fs::{self, File, FileTimes};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use snafu::{ResultExt, Snafu};

use crate::ext::BestEffortPathExt;

/// A replica file is stale only when its source is strictly newer. Equal
/// timestamps count as up to date.
pub fn is_stale(source_modified: SystemTime, replica_modified: SystemTime) -> bool {
    source_modified > replica_modified
}

/// Copies `from` over `to`, then stamps `to` with the source's modification
/// (and access, where the platform reports it) time and permissions.
///
/// Times are applied through the destination handle before permissions are
/// copied, so a read-only source still produces a correctly stamped replica.
pub fn copy_preserving_times(from: &Path, to: &Path) -> Result<u64, CopyError> {
    let mut reader = File::open(from).context(OpenSourceSnafu {
        path: from.to_path_buf(),
    })?;
    let metadata = reader.metadata().context(SourceMetadataSnafu {
        path: from.to_path_buf(),
    })?;
    let modified = metadata.modified().context(SourceMetadataSnafu {
        path: from.to_path_buf(),
    })?;

    let mut writer = File::create(to).context(CreateDestinationSnafu {
        path: to.to_path_buf(),
    })?;
    let bytes = io::copy(&mut reader, &mut writer).context(TransferSnafu {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
    })?;

    let mut times = FileTimes::new().set_modified(modified);
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    writer.set_times(times).context(TimestampSnafu {
        path: to.to_path_buf(),
    })?;
    drop(writer);

    fs::set_permissions(to, metadata.permissions()).context(PermissionsSnafu {
        path: to.to_path_buf(),
    })?;

    Ok(bytes)
}

#[derive(Debug, Snafu)]
pub enum CopyError {
    #[snafu(display("Failed to open source file {}", path.best_effort_path_display()))]
    OpenSourceError { path: PathBuf, source: io::Error },
    #[snafu(display("Failed to read metadata of source file {}", path.best_effort_path_display()))]
    SourceMetadataError { path: PathBuf, source: io::Error },
    #[snafu(display("Failed to create destination file {}", path.best_effort_path_display()))]
    CreateDestinationError { path: PathBuf, source: io::Error },
    #[snafu(display(
        "Failed to transfer contents of {} to {}",
        from.best_effort_path_display(),
        to.best_effort_path_display()
    ))]
    TransferError {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[snafu(display("Failed to apply timestamps to {}", path.best_effort_path_display()))]
    TimestampError { path: PathBuf, source: io::Error },
    #[snafu(display("Failed to apply permissions to {}", path.best_effort_path_display()))]
    PermissionsError { path: PathBuf, source: io::Error },
}
