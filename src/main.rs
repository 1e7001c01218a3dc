use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mcp_qa::{
    cli::{execute_command, Cli},
    config::{Config, LogFormat},
    storage::StoreRegistry,
    workflow::QaTools,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "mcp-qa starting");

    let registry = StoreRegistry::new(config.database.clone());
    let name = cli.db.clone().unwrap_or_else(|| config.database.name.clone());
    let store = match registry.get(&name).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, db = %name, "Failed to open database");
            return Err(e.into());
        }
    };

    let tools = QaTools::new(Arc::clone(&store));
    let result = execute_command(cli.command, &tools, &store, config.listing.page_limit).await;

    registry.close_all().await;

    println!("{}", result.message);
    if result.exit_code != 0 {
        std::process::exit(result.exit_code);
    }
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
