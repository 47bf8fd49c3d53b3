//! putscan - bearish put candidate scanner
//!
//! Screens a symbol universe through market regime, dealer positioning and
//! microstructure layers, then ranks the survivors and picks put contracts.
//! Output is analysis only; no orders are placed.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use put_scanner::cli::commands;
use put_scanner::config::Config;

/// Bearish put candidate scanner
#[derive(Parser)]
#[command(name = "putscan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Market snapshot (JSON) overriding data.snapshot_path
    #[arg(short, long, env = "PUTSCAN_DATA")]
    data: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the universe (or the given symbols) and rank candidates
    Scan {
        /// Symbols to scan instead of the configured universe
        symbols: Vec<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Refresh the market regime even if cached
        #[arg(long)]
        force: bool,
    },

    /// Analyze one symbol without the shortlist screen
    Symbol {
        symbol: String,

        #[arg(long)]
        json: bool,
    },

    /// Show the current market regime
    Regime {
        /// Bypass the regime cache
        #[arg(long)]
        force: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show current configuration
    Config,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("put_scanner=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let data = cli.data.as_deref();
    let result = match cli.command {
        Commands::Scan { symbols, json, force } => commands::scan(&config, data, symbols, json, force).await,
        Commands::Symbol { symbol, json } => commands::symbol(&config, data, &symbol, json).await,
        Commands::Regime { force, json } => commands::regime(&config, data, force, json).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
