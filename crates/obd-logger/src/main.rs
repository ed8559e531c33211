//! OBD-II Logger - Main Entry Point

use anyhow::Context;
use clap::Parser;
use obd_logger::cli::{Cli, Command};
use obd_logger::config::AppConfig;
use obd_logger::{init_logging, ports, replay, run};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);
    init_logging(&config.logging);

    info!("=== OBD Logger v{} ===", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Run(_) => run::run(&config).await,
        Command::Replay(_) => {
            let mut stdout = std::io::stdout().lock();
            replay::replay(&config.recording.path, &mut stdout).map(|_| ())
        }
        Command::Ports => {
            for port in ports::available()? {
                println!("{}", ports::describe(&port));
            }
            Ok(())
        }
    }
}
