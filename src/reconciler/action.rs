use std::path::PathBuf;

use derive_more::Display;

/// A single change applied to the replica tree.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SyncAction {
    #[display("Created directory: {}", path.display())]
    DirectoryCreated { path: PathBuf },
    #[display("Copied file: {} to {}", source.display(), replica.display())]
    FileCreated { source: PathBuf, replica: PathBuf },
    #[display("Updated file: {} to {}", source.display(), replica.display())]
    FileUpdated { source: PathBuf, replica: PathBuf },
    #[display("Removed file: {}", path.display())]
    FileRemoved { path: PathBuf },
    #[display("Removed directory: {}", path.display())]
    DirectoryRemoved { path: PathBuf },
}

impl SyncAction {
    /// Event kind attached to the log line of this action.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncAction::DirectoryCreated { .. } => "directory-created",
            SyncAction::FileCreated { .. } => "file-created",
            SyncAction::FileUpdated { .. } => "file-updated",
            SyncAction::FileRemoved { .. } => "file-removed",
            SyncAction::DirectoryRemoved { .. } => "directory-removed",
        }
    }
}
