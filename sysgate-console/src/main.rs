//! SYSGATE operator console
//!
//! Hosts one gatekeeper session for wrong-plate approvals, and exposes the
//! activity log viewer and the connectivity probe as subcommands.

mod logs;
mod notifier;
mod watch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use sysgate_common::{load_config, resolve_config_path};
use sysgate_gatekeeper::ConnectivityProbe;

#[derive(Parser, Debug)]
#[command(name = "sysgate-console", version)]
#[command(about = "SYSGATE gatekeeper operator console")]
struct Cli {
    /// Path to sysgate.toml (or use SYSGATE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to the gatekeeper and answer approvals from stdin
    Watch {
        /// Session token, sent as the socket client_id (or SYSGATE_TOKEN)
        #[arg(long)]
        token: Option<String>,

        /// Operator name used in rejection reasons (or SYSGATE_OPERATOR)
        #[arg(long)]
        operator: Option<String>,
    },
    /// Browse, clear or export the activity log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommand,
    },
    /// Check internet connectivity; exits 1 when offline
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config_path = resolve_config_path(cli.config.clone());
    let mut cfg = load_config(config_path.as_deref());
    cfg.apply_env_overrides();
    debug!("Effective config: {:?}", cfg);

    match cli.command {
        Commands::Watch { token, operator } => {
            if let Some(token) = token {
                cfg.operator.auth_token = Some(token);
            }
            if let Some(operator) = operator {
                cfg.operator.username = operator;
            }
            watch::run(cfg).await
        }
        Commands::Logs { command } => logs::run(&cfg, command),
        Commands::Probe => {
            let probe = ConnectivityProbe::from_config(&cfg.network);
            let online = probe.check().await;
            info!("Probe finished: {}", if online { "online" } else { "offline" });
            println!("{}", if online { "online" } else { "offline" });
            if !online {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
