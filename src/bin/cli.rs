// src/bin/cli.rs

//! mirrorgate CLI
//!
//! Runs the HTTP gateway, or resolves entries once from the command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mirrorgate::{
    api::{self, AppState},
    config,
    error::{AppError, Result},
    models::SourceKind,
    services::{Aggregator, HealthHarness, Resolution, ResolveOptions},
};

/// mirrorgate - multi-source manga gateway
#[derive(Parser, Debug)]
#[command(
    name = "mirrorgate",
    version,
    about = "Resolves manga entries across several upstream mirrors"
)]
struct Cli {
    /// Path to the configuration file (default: $MIRRORGATE_CONFIG or data/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },

    /// Resolve one id across all sources
    Get {
        id: i64,

        /// Keep only the first N images
        #[arg(long)]
        thumbnail: Option<usize>,
    },

    /// Fetch one listing page from a source
    Page { source: SourceKind, page: u32 },

    /// Run the health probes
    Health,

    /// Validate configuration files
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = config::config_path(cli.config.as_deref());
    let mut config = match config::load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Config validation failed: {}", e);
            return Err(e);
        }
    };

    match cli.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            let state = AppState::from_config(config)?;
            log::info!("Sources in priority order: {:?}", state.aggregator.pool().kinds());
            api::start_server(state).await?;
        }

        Command::Get { id, thumbnail } => {
            let aggregator = Aggregator::from_config(&config)?;
            let options = thumbnail.map_or_else(ResolveOptions::full, ResolveOptions::thumbnail);

            match aggregator.resolve(id, options).await {
                Resolution::Found(manga) => print_json(&manga)?,
                miss => {
                    for failure in miss.failures() {
                        log::warn!("{}", failure);
                    }
                    return miss.into_result(id).map(|_| ());
                }
            }
        }

        Command::Page { source, page } => {
            let aggregator = Aggregator::from_config(&config)?;
            let items = aggregator.fetch_page(source, page).await?;
            log::info!("{} returned {} entries for page {}", source, items.len(), page);
            print_json(&items)?;
        }

        Command::Health => {
            let aggregator = Aggregator::from_config(&config)?;
            let harness = HealthHarness::for_sources(aggregator.pool(), &config)?;
            let report = harness.run().await;
            print_json(&report)?;
            if !report.ok {
                return Err(AppError::validation("One or more health probes failed"));
            }
        }

        Command::Validate => {
            // load_config already validated; building the pool also reads id tables
            Aggregator::from_config(&config)?;
            log::info!("✓ Config OK ({})", config_path.display());
        }
    }

    Ok(())
}
