use snafu::Snafu;
use snafu::prelude::*;
use tracing::debug;

use crate::application::{
    LogSinkError, RuntimeConfig, RuntimeConfigError, install_log_sink,
};
use crate::reconciler::Reconciler;
use crate::scheduler::{MaxRuns, ScheduleSummary, Scheduler};

pub struct Application;

impl Application {
    /// Sets up the log sink, validates the configuration and then hands
    /// control to the scheduler. Without `max_runs` this never returns.
    pub async fn run(
        app_config: impl Into<RuntimeConfig>,
    ) -> Result<ScheduleSummary, ApplicationError> {
        let app_config: RuntimeConfig = app_config.into();
        install_log_sink(&app_config.log_level, &app_config.log_file).context(LogSinkSnafu)?;
        debug!("Loaded config: {:?}", app_config);

        app_config.validate().context(ConfigSnafu)?;

        let reconciler = Reconciler::new(&app_config.source, &app_config.replica);
        let scheduler = Scheduler::new(reconciler, app_config.interval);
        let scheduler = match app_config.max_runs {
            Some(runs) => scheduler.with_stop_condition(MaxRuns(runs)),
            None => scheduler,
        };

        Ok(scheduler.run().await)
    }
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered while setting up logging"))]
    LogSinkError { source: LogSinkError },
    #[snafu(display("Critical failure encountered during configuration stage"))]
    ConfigError { source: RuntimeConfigError },
}
