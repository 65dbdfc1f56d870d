// Fire E2E - Entry point

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = cli::config::harness_config(&cli).map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    fire_e2e::logging::init(&config.log_level).map_err(|e| anyhow::anyhow!("Logging setup failed: {}", e))?;

    let result = match &cli.command {
        Commands::Devnet(cmd) => match cli::config::apply_devnet(config, cmd) {
            Ok(config) => cli::runner::run_devnet(config, cmd).await,
            Err(e) => Err(e.into()),
        },
        Commands::Purge => cli::runner::purge(&config),
        Commands::Info(args) => cli::runner::info(&config, args).await,
        Commands::WaitEvent(cmd) => cli::runner::wait_event(&config, cmd).await,
        Commands::WaitBlocks(cmd) => cli::runner::wait_blocks(&config, cmd).await,
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}
