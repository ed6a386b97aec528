//! One-way reconciliation of a replica tree against its source tree.
//!
//! A run first propagates the source onto the replica (directories, new and
//! stale files) and then prunes replica entries that no longer exist in the
//! source. Nothing is remembered between runs.

mod action;
mod reconciler;
mod report;

pub use action::SyncAction;
pub use reconciler::{ReconcileError, Reconciler};
pub use report::RunReport;
