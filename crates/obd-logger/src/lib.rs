//! OBD-II Logger
//!
//! Command-line front end: configuration, logging setup, port discovery,
//! the live logging session and log replay.

pub mod cli;
pub mod config;
pub mod ports;
pub mod replay;
pub mod run;
pub mod status;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Initialize logging. `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}
