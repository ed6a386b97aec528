use std::time::Duration;

use tracing::info;

use crate::reconciler::SyncAction;

/// Everything a single run changed, in the order it was applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    actions: Vec<SyncAction>,
    elapsed: Duration,
}

impl RunReport {
    /// Logs the action to the sink and keeps it for the caller.
    pub fn record(&mut self, action: SyncAction) {
        info!(event = action.kind(), "{}", action);
        self.actions.push(action);
    }

    pub(crate) fn finish(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    pub fn actions(&self) -> &[SyncAction] {
        &self.actions
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// True when the replica was already in sync.
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.actions
            .iter()
            .filter(|action| action.kind() == kind)
            .count()
    }
}
