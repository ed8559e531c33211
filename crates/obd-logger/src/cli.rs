//! Command-line interface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(
    name = "obd-logger",
    version,
    about = "Stream, record and replay OBD-II data from ELM327 adapters"
)]
pub struct Cli {
    /// Configuration file (default: ./obd-logger.toml if present).
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Minimum log level.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Log JSON lines instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream from an adapter and record to a log file.
    Run(RunArgs),
    /// Print the responses stored in a log file.
    Replay(ReplayArgs),
    /// List serial ports.
    Ports,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Serial port, `auto` to discover one, or `mock` for the emulator.
    #[arg(value_name = "DEVICE")]
    pub device: Option<String>,

    /// Serial baud rate.
    #[arg(short = 'b', long = "baudrate", value_name = "BAUD")]
    pub baud_rate: Option<u32>,

    /// Log file to append to.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Log file to read (default: the configured recording path).
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl Cli {
    /// Let flags override the loaded configuration
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(level) = self.log_level {
            config.logging.level = level.as_str().to_string();
        }
        if self.json {
            config.logging.json = true;
        }

        match &self.command {
            Command::Run(args) => {
                if let Some(device) = &args.device {
                    config.adapter.device = device.clone();
                }
                if let Some(baud_rate) = args.baud_rate {
                    config.adapter.baud_rate = baud_rate;
                }
                if let Some(output) = &args.output {
                    config.recording.path = output.clone();
                }
            }
            Command::Replay(args) => {
                if let Some(path) = &args.path {
                    config.recording.path = path.clone();
                }
            }
            Command::Ports => {}
        }
    }
}
