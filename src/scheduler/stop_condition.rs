use std::num::NonZeroU64;

use crate::scheduler::ScheduleSummary;

/// Decides, after every run, whether the scheduler should exit.
pub trait StopCondition {
    fn should_stop(&mut self, summary: &ScheduleSummary) -> bool;
}

/// Never stops. This is what the binary uses unless `--max-runs` is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunForever;

impl StopCondition for RunForever {
    fn should_stop(&mut self, _summary: &ScheduleSummary) -> bool {
        false
    }
}

/// Stops once the given number of runs, failed or not, has completed.
#[derive(Debug, Clone, Copy)]
pub struct MaxRuns(pub NonZeroU64);

impl StopCondition for MaxRuns {
    fn should_stop(&mut self, summary: &ScheduleSummary) -> bool {
        summary.runs() >= self.0.get()
    }
}

impl<F> StopCondition for F
where
    F: FnMut(&ScheduleSummary) -> bool,
{
    fn should_stop(&mut self, summary: &ScheduleSummary) -> bool {
        self(summary)
    }
}
