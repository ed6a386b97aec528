use std::time::Duration;

use snafu::Report;
use tracing::{debug, error, info};

use crate::reconciler::{Reconciler, RunReport};
use crate::scheduler::{RunForever, StopCondition};

/// Totals across every run the scheduler has performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleSummary {
    successful_runs: u64,
    failed_runs: u64,
    actions: u64,
}

impl ScheduleSummary {
    pub fn runs(&self) -> u64 {
        self.successful_runs + self.failed_runs
    }

    pub fn successful_runs(&self) -> u64 {
        self.successful_runs
    }

    pub fn failed_runs(&self) -> u64 {
        self.failed_runs
    }

    pub fn actions(&self) -> u64 {
        self.actions
    }

    pub(crate) fn record_success(&mut self, report: &RunReport) {
        self.successful_runs += 1;
        self.actions += report.actions().len() as u64;
    }

    pub(crate) fn record_failure(&mut self) {
        self.failed_runs += 1;
    }
}

/// Runs the reconciler, then sleeps for the interval, until the stop
/// condition says otherwise.
///
/// The interval is measured from the end of one run to the start of the
/// next, so runs never overlap and the period between run starts is the
/// interval plus the run duration.
pub struct Scheduler {
    reconciler: Reconciler,
    interval: Duration,
    stop_condition: Box<dyn StopCondition>,
}

impl Scheduler {
    pub fn new(reconciler: Reconciler, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
            stop_condition: Box::new(RunForever),
        }
    }

    pub fn with_stop_condition(mut self, stop_condition: impl StopCondition + 'static) -> Self {
        self.stop_condition = Box::new(stop_condition);
        self
    }

    pub async fn run(mut self) -> ScheduleSummary {
        let mut summary = ScheduleSummary::default();
        info!(
            "Mirroring {} to {} every {:?}",
            self.reconciler.source().display(),
            self.reconciler.replica().display(),
            self.interval
        );

        loop {
            match self.reconciler.run() {
                Ok(report) => {
                    if report.is_noop() {
                        debug!("Replica already up to date");
                    }
                    summary.record_success(&report);
                }
                Err(err) => {
                    // The next tick retries the whole run from scratch
                    error!(
                        event = "run-failed",
                        "Synchronization run failed: {}",
                        Report::from_error(err)
                    );
                    summary.record_failure();
                }
            }

            if self.stop_condition.should_stop(&summary) {
                info!(
                    "Stopping after {} runs ({} succeeded, {} failed, {} actions)",
                    summary.runs(),
                    summary.successful_runs(),
                    summary.failed_runs(),
                    summary.actions()
                );
                return summary;
            }

            debug!("Sleeping for {:?}", self.interval);
            compio::time::sleep(self.interval).await;
        }
    }
}
