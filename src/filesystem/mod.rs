//! Filesystem primitives used by the reconciler.
//!
//! This module maps traversal entries to tree nodes relative to their root,
//! inspects replica paths without following links, and copies files while
//! keeping the source's timestamps so later runs can compare them.

mod copy;
mod tree;

pub use copy::{CopyError, copy_preserving_times, is_stale};
pub use tree::{NodeKind, TreeNode, TreeNodeError, probe};
