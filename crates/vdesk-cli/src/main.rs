//! vdesk CLI: forward local mice and keyboards into a GNOME remote desktop session.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use vdesk_daemon::setup::load_config;
use vdesk_daemon::{Config, Daemon, DaemonError, MutterSession};
use vdesk_input::discover;
use vdesk_input::linux::EvdevBackend;

#[derive(Parser)]
#[command(
    name = "vdesk",
    about = "Forward local input into a virtual desktop session",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a remote desktop session and forward input until interrupted.
    Run {
        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<String>,
    },

    /// List input devices and how they would be handled.
    Devices {
        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Print the default configuration.
    Config,
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let config = load_config(config.as_deref())?;
            init_tracing(&config.daemon.log_level);
            run(config).await?;
        }
        Commands::Devices { config } => {
            let config = load_config(config.as_deref())?;
            init_tracing(&config.daemon.log_level);
            list_devices(&config)?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&Config::default())?);
        }
    }

    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    let session_config = config.session.clone();
    let session = tokio::task::spawn_blocking(move || MutterSession::open(&session_config))
        .await?
        .map_err(DaemonError::Session)?;
    let session = Arc::new(session);
    info!(stream = %session.stream_path(), "virtual monitor ready");

    let backend = EvdevBackend::new(
        config.input.device_dir.clone(),
        config.input.device_prefix.clone(),
    );
    let daemon = Daemon::new(&config, backend, Arc::clone(&session));

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
        }
        let _ = stop_tx.send(true);
    });

    let result = daemon.run(stop_rx).await;

    let stopping = Arc::clone(&session);
    if let Err(e) = tokio::task::spawn_blocking(move || stopping.stop()).await? {
        warn!(error = %e, "failed to stop remote desktop session");
    }

    let exit = result?;
    info!(exit = ?exit, "vdesk stopped");
    Ok(())
}

fn list_devices(config: &Config) -> anyhow::Result<()> {
    let backend = EvdevBackend::new(
        config.input.device_dir.clone(),
        config.input.device_prefix.clone(),
    );
    let options = config.input.forwarder_options();
    let registry = discover(&backend, &options.filter)?;

    for device in registry.all() {
        println!(
            "{}\t{}\t{}",
            device.info.path.display(),
            device.info.kind,
            device.info.name
        );
    }
    for skipped in registry.skipped() {
        println!(
            "{}\tskipped ({})\t{}",
            skipped.path.display(),
            skipped.reason,
            skipped.name.as_deref().unwrap_or("?")
        );
    }
    Ok(())
}
