//! Wingbridge daemon
//!
//! Wires the console client, surface driver, and lighting sink to the
//! synchronization engine and runs until Ctrl-C.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wingbridge::bridge::Bridge;
use wingbridge::config::AppConfig;
use wingbridge::console::{ConsoleClient, ConsolePort};
use wingbridge::lighting::{DmxLink, LightPort};
use wingbridge::state::SharedState;
use wingbridge::surface::{self, SurfaceDriver};

/// Wingbridge - drive a Wing mixer and DMX dimmers from an X-Touch Extender
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI ports and exit
    #[arg(long)]
    list_ports: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level)?;

    if args.list_ports {
        let (inputs, outputs) = surface::list_ports()?;
        println!("MIDI input ports:");
        for name in inputs {
            println!("  - {name}");
        }
        println!("MIDI output ports:");
        for name in outputs {
            println!("  - {name}");
        }
        return Ok(());
    }

    info!("Starting wingbridge...");
    let config = AppConfig::load(&args.config)?;
    run(config).await
}

async fn run(config: AppConfig) -> Result<()> {
    // Console first: nothing works without it
    let console = Arc::new(ConsoleClient::new(&config.console).await?);
    info!(
        "Checking console connection to {}:{}...",
        config.console.host, config.console.port
    );
    if !console.check_connection().await {
        bail!(
            "Console at {}:{} is not answering OSC queries (remediation hints above)",
            config.console.host,
            config.console.port
        );
    }

    let state = Arc::new(SharedState::new());
    let (surface, events) = SurfaceDriver::new(&config.surface, state.clone());
    let surface = Arc::new(surface);
    if let Err(e) = surface.open().await {
        bail!(
            "Control surface not available: {e:#}. Check the USB connection, \
             or run with --list-ports to find the exact port name"
        );
    }

    // The installation can run without light control; keep going and
    // let the supervisor retry the link
    let lights = Arc::new(DmxLink::new(&config.lighting));
    if !lights.reopen().await {
        warn!("DMX dongle not found; lighting control disabled until reconnect");
    }

    let bridge = Arc::new(Bridge::new(
        console,
        surface.clone(),
        lights.clone(),
        state,
        config,
    ));

    // Seed the surface with live console state before the loops start
    bridge.full_refresh(bridge.current_page()).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_task = tokio::spawn(bridge.clone().run_sync(shutdown_rx.clone()));
    let dispatch_task = tokio::spawn(bridge.clone().run_dispatch(events, shutdown_rx.clone()));
    let supervisor_task = tokio::spawn(bridge.clone().run_supervisor(shutdown_rx));

    info!("=== All devices connected, bridge running ===");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install CTRL+C handler")?;
    info!("Shutdown signal received, stopping...");

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(sync_task, dispatch_task, supervisor_task);

    surface.close();
    lights.close();
    info!("Wingbridge shutdown complete");
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}
