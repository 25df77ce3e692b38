//! fleetgated — the fleetgate daemon.
//!
//! Single binary that assembles the controller:
//! - Request and response queues
//! - Result store
//! - Queue poller, fleet scaler and result drain, each supervised
//! - Submission gateway and HTTP API
//!
//! # Usage
//!
//! ```text
//! fleetgated run --config /etc/fleetgate/fleetgate.toml --port 8080
//! fleetgated config --config fleetgate.toml
//! ```

mod standalone;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use fleetgate_core::FleetgateConfig;

#[derive(Parser)]
#[command(name = "fleetgated", about = "fleetgate daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway and the fleet controller.
    Run {
        /// Path to fleetgate.toml. Built-in defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the port from `server.listen`.
        #[arg(long)]
        port: Option<u16>,

        /// Log output format.
        #[arg(long, value_enum, default_value = "text")]
        log_format: LogFormat,
    },
    /// Print the resolved configuration as TOML.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            port,
            log_format,
        } => {
            init_tracing(log_format);
            let mut config = load_config(config.as_deref())?;
            if let Some(port) = port {
                config.server.listen.set_port(port);
            }
            standalone::run(config).await
        }
        Command::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info,fleetgated=debug,fleetgate=debug")
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<FleetgateConfig> {
    match path {
        Some(path) => Ok(FleetgateConfig::from_file(path)?),
        None => {
            let config = FleetgateConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}
