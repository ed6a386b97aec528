mod application;
pub mod data;
mod log_sink;
mod runtime_config;

pub use application::{Application, ApplicationError};
pub use log_sink::{LogSinkError, install_log_sink};
pub use runtime_config::{RuntimeConfig, RuntimeConfigError};
