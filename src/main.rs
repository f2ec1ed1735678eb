use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use ragstore::cli::commands::{
    handle_config, handle_delete, handle_get, handle_insert, handle_search, handle_status,
};
use ragstore::cli::{Cli, Commands};
use ragstore::models::{Config, OutputFormat};
use ragstore::services::BlockingPool;

fn init_tracing(verbose: bool) {
    let default = if verbose { "ragstore=debug" } else { "ragstore=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load()?;
    let format = cli.format.unwrap_or(config.search.default_format);

    // One pool for every storage call this process makes.
    let pool = BlockingPool::new(
        config.vector_store.worker_threads,
        config.retry.to_retry_config(),
    );

    tokio::select! {
        result = run_command(cli.command, &config, &pool, format) => {
            result?;
        }
        _ = shutdown_signal() => {
            eprintln!("\nReceived shutdown signal, cleaning up...");
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    }

    Ok(())
}

async fn run_command(
    command: Commands,
    config: &Config,
    pool: &BlockingPool,
    format: OutputFormat,
) -> Result<()> {
    match command {
        Commands::Status => handle_status(config, pool, format).await?,
        Commands::Insert(args) => handle_insert(args, config, pool, format).await?,
        Commands::Get(args) => handle_get(args, config, pool, format).await?,
        Commands::Delete(args) => handle_delete(args, config, pool, format).await?,
        Commands::Search(args) => handle_search(args, config, pool, format).await?,
        Commands::Config(cmd) => handle_config(cmd, config, format).await?,
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
