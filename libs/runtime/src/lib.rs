//! Host runtime for RepoKit applications: layered configuration, logging setup and
//! home directory resolution.

pub mod config;
pub mod logging;
pub mod paths;

pub use config::{AppConfig, CliArgs, DatabaseConfig, LoggingConfig, PagingConfig, Section};
pub use logging::init_logging_from_config;
