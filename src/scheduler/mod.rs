mod scheduler;
mod stop_condition;

pub use scheduler::{ScheduleSummary, Scheduler};
pub use stop_condition::{MaxRuns, RunForever, StopCondition};
