use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf, StripPrefixError};

use snafu::{ResultExt, Snafu};
use walkdir::DirEntry;

use crate::ext::BestEffortPathExt;

/// Represents the type of a filesystem node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    pub fn of(metadata: &Metadata) -> Self {
        if metadata.is_dir() {
            NodeKind::Directory
        } else {
            NodeKind::File
        }
    }
}

/// A node of either tree, identified by its path relative to the tree root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    relative: PathBuf,
    kind: NodeKind,
}

impl TreeNode {
    pub fn new(relative: impl Into<PathBuf>, kind: NodeKind) -> Self {
        Self {
            relative: relative.into(),
            kind,
        }
    }

    pub fn from_entry(root: &Path, entry: &DirEntry) -> Result<Self, TreeNodeError> {
        let relative = entry
            .path()
            .strip_prefix(root)
            .context(OutsideRootSnafu {
                path: entry.path().to_path_buf(),
                root: root.to_path_buf(),
            })?
            .to_path_buf();

        let kind = if entry.file_type().is_dir() {
            NodeKind::Directory
        } else {
            NodeKind::File
        };

        Ok(Self::new(relative, kind))
    }

    /// Like [`TreeNode::from_entry`], but a symlink takes the kind of its
    /// target. Walks that do not follow links use this so a link to a
    /// directory is mirrored as a directory without being descended into.
    pub fn resolving_links(root: &Path, entry: &DirEntry) -> Result<Self, TreeNodeError> {
        let node = Self::from_entry(root, entry)?;
        if !entry.path_is_symlink() {
            return Ok(node);
        }

        let target = fs::metadata(entry.path()).context(ResolveLinkSnafu {
            path: entry.path().to_path_buf(),
        })?;
        Ok(Self::new(node.relative, NodeKind::of(&target)))
    }

    pub fn relative(&self) -> &Path {
        &self.relative
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The path this node maps to inside another tree rooted at `root`.
    pub fn under(&self, root: &Path) -> PathBuf {
        root.join(&self.relative)
    }
}

/// Inspects `path` without following symlinks. Returns `Ok(None)` if nothing
/// exists there.
pub fn probe(path: &Path) -> io::Result<Option<Metadata>> {
    match fs::symlink_metadata(path) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

#[derive(Debug, Snafu)]
pub enum TreeNodeError {
    #[snafu(display(
        "Entry {} is not located under {}",
        path.best_effort_path_display(),
        root.best_effort_path_display()
    ))]
    OutsideRoot {
        path: PathBuf,
        root: PathBuf,
        source: StripPrefixError,
    },
    #[snafu(display("Failed to resolve link {}", path.best_effort_path_display()))]
    ResolveLink { path: PathBuf, source: io::Error },
}
