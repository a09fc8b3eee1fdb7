//! `mcp-host` demo binary: run a configured set of MCP servers, validate a
//! config file, or list the servers a config declares.

use clap::{Parser, Subcommand};
use mcp_host::config::loader::discover_paths;
use mcp_host::{Config, Host, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "mcp-host")]
#[command(about = "Supervises MCP capability servers over stdio", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "MCP_HOST_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "MCP_HOST_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every configured server and wait for Ctrl+C
    Run,

    /// Validate a configuration file without starting anything
    Validate {
        /// Configuration file to validate
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// List the servers a configuration declares
    ListServers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Run => {
            let config_path = resolve_config_path(cli.config.as_deref())?;
            info!(config = %config_path.display(), "loading configuration");

            let host = Host::from_file(&config_path)?;
            host.initialize().await?;
            info!("all servers ready, press Ctrl+C to shut down");

            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
            host.shutdown().await;
        }

        Commands::Validate { config } => match Config::validate_file(&config) {
            Ok(()) => {
                println!("configuration valid");
            }
            Err(e) => {
                eprintln!("configuration error: {e}");
                std::process::exit(1);
            }
        },

        Commands::ListServers => {
            let config_path = resolve_config_path(cli.config.as_deref())?;
            let config = Config::from_file(&config_path)?;

            let mut names: Vec<&String> = config.servers.keys().collect();
            names.sort();
            for name in names {
                let descriptor = &config.servers[name];
                println!("{name} ({}): {:?}", descriptor.transport, descriptor.command);
            }
        }
    }

    Ok(())
}

fn resolve_config_path(explicit: Option<&std::path::Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    discover_paths()
        .into_iter()
        .find(|p| p.exists())
        .ok_or_else(|| mcp_host::Error::Config("no configuration file found".to_string()))
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}
