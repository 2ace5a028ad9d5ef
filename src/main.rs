//! ATN command-line entry point
//!
//! Runs an ATN node against its SCADA until SIGINT or SIGTERM.

use clap::{Parser, Subcommand};
use spaceheat_proactor::actors::atn::{Atn, AtnPayload, AtnSettings};
use spaceheat_proactor::config::ProactorConfig;
use spaceheat_proactor::observability::{init_default_logging, init_logging, LogFormat};
use spaceheat_proactor::proactor::Proactor;
use spaceheat_proactor::transport::mqtt::MqttTransport;
use std::path::PathBuf;
use std::process;
use tokio::signal;
use tracing::{error, info, Level};

/// Supervisory node client for a home-heating SCADA
#[derive(Parser)]
#[command(name = "atn")]
#[command(about = "Run an ATN node against its SCADA over MQTT")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "ATN_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the SCADA and run until interrupted
    Run {
        /// Request a snapshot as soon as the node starts
        #[arg(long)]
        snapshot: bool,
    },
    /// Validate configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.verbose {
        0 => init_default_logging(),
        1 => init_logging(Level::DEBUG, LogFormat::Pretty, false),
        _ => init_logging(Level::TRACE, LogFormat::Pretty, true),
    }

    info!("Starting atn v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { snapshot } => run_atn(config, snapshot).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<ProactorConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(ProactorConfig::load_from_file(path)?);
    }

    for path_str in ["atn.toml", "config/atn.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(ProactorConfig::load_from_file(&path)?);
        }
    }

    Err("No configuration file found. Provide one with -c/--config or create atn.toml".into())
}

async fn run_atn(mut config: ProactorConfig, snapshot: bool) -> Result<(), Box<dyn std::error::Error>> {
    let settings = AtnSettings::from_config(&config)?;
    settings.configure_link(&mut config);
    let link = config
        .link(&settings.link)
        .cloned()
        .ok_or_else(|| format!("link '{}' is not configured", settings.link))?;

    info!(
        node = %config.node.name,
        scada = %settings.scada_alias,
        link = %link.name,
        "ATN starting"
    );

    let node_name = config.node.name.clone();
    let mut proactor = Proactor::new(config, AtnPayload::registry()?, Atn::new(settings));
    proactor.add_link(&link.name, MqttTransport::new(node_name, link.clone()))?;
    proactor.start()?;
    let handle = proactor.handle();

    if snapshot {
        handle.request_snapshot()?;
    }

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!("ATN is running; waiting for SCADA messages");

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }

    tokio::task::spawn_blocking(move || handle.stop()).await?;

    let stats = proactor.stats();
    info!(
        processed = stats.num_processed,
        ack_timeouts = stats.num_ack_timeouts,
        "ATN stopped"
    );
    Ok(())
}

fn handle_config_command(config: ProactorConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
