//! Command-line host for hubsync device coordinators.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use hubsync_core::config::env_vars;
use hubsync_core::{DeviceEntry, EventBus, HubConfig, HubEvent};
use hubsync_devices::{
    ClientRequest, DeviceStateCoordinator, DeviceTransport, HttpDeviceConfig, HttpDeviceTransport,
    PollerExit, spawn_refresh_loop,
};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, warn};

/// hubsync - keep smart-home device state in sync.
#[derive(Parser, Debug)]
#[command(name = "hubsync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Hub config file.
    #[arg(short, long, global = true, default_value = "hubsync.toml")]
    config: PathBuf,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Poll every configured device until Ctrl-C.
    Poll,
    /// Refresh one device once and print its snapshot.
    Once {
        /// Device id from the config file.
        #[arg(short, long)]
        device: String,
    },
    /// Send a command to a device.
    Call {
        /// Device id from the config file.
        #[arg(short, long)]
        device: String,
        /// Method name relative to the device type (e.g. "setState").
        #[arg(short, long)]
        method: String,
        /// Parameters as a JSON object.
        #[arg(short, long)]
        params: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let hub = HubConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    match args.command {
        Command::Poll => run_poll(&hub).await,
        Command::Once { device } => run_once(&hub, &device).await,
        Command::Call {
            device,
            method,
            params,
        } => run_call(&hub, &device, &method, params.as_deref()).await,
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "hubsync={default_level},hubsync_core={default_level},hubsync_devices={default_level}"
        ))
        .add_directive(tracing::Level::WARN.into())
    });

    if env_vars::log_json() {
        // JSON format for production/container environments
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }
}

fn transport(hub: &HubConfig, entry: &DeviceEntry) -> Result<Arc<dyn DeviceTransport>> {
    let transport = HttpDeviceTransport::new(HttpDeviceConfig::from_hub(hub, entry))
        .with_context(|| format!("creating transport for {}", entry.id))?;
    Ok(Arc::new(transport))
}

fn build_coordinator(
    hub: &HubConfig,
    device_id: &str,
    bus: Option<&EventBus>,
) -> Result<DeviceStateCoordinator> {
    let entry = hub
        .device(device_id)
        .ok_or_else(|| anyhow!("device {} is not configured", device_id))?;

    let mut coordinator = DeviceStateCoordinator::new(transport(hub, entry)?, hub.coordinator.clone());

    if let Some(paired_id) = &entry.paired_device {
        let paired = hub.device(paired_id).ok_or_else(|| {
            anyhow!("paired device {} of {} is not configured", paired_id, entry.id)
        })?;
        coordinator = coordinator.with_paired_device(transport(hub, paired)?);
    }
    if let Some(bus) = bus {
        coordinator = coordinator.with_event_bus(bus.clone());
    }
    Ok(coordinator)
}

async fn run_poll(hub: &HubConfig) -> Result<()> {
    if hub.devices.is_empty() {
        bail!("no devices configured");
    }

    let bus = EventBus::new();
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        while let Some((event, _)) = events.recv().await {
            match event {
                HubEvent::StateUpdated {
                    device_id,
                    version,
                    source,
                    ..
                } => info!(%device_id, version, %source, "State updated"),
                HubEvent::StatusChanged {
                    device_id,
                    online,
                    net_type,
                    ..
                } => info!(%device_id, online, ?net_type, "Status changed"),
                HubEvent::ReauthRequired { device_id, .. } => {
                    warn!(%device_id, "Credentials rejected; update the access token and restart")
                }
                HubEvent::UpdateFailed { .. } => {}
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut loops = Vec::new();
    for entry in &hub.devices {
        let coordinator = Arc::new(build_coordinator(hub, &entry.id, Some(&bus))?);
        loops.push(spawn_refresh_loop(coordinator, shutdown_rx.clone()));
    }
    info!(devices = loops.len(), "Polling started");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("Shutting down");
    shutdown_tx.send(true).ok();

    let mut needs_reauth = 0;
    for exit in futures::future::join_all(loops).await {
        if matches!(exit.context("refresh loop panicked")?, PollerExit::ReauthRequired) {
            needs_reauth += 1;
        }
    }
    if needs_reauth > 0 {
        warn!(devices = needs_reauth, "Some devices stopped polling pending re-authentication");
    }
    Ok(())
}

async fn run_once(hub: &HubConfig, device_id: &str) -> Result<()> {
    let coordinator = build_coordinator(hub, device_id, None)?;
    let snapshot = coordinator.refresh().await?;
    println!("{}", serde_json::to_string_pretty(&*snapshot)?);
    Ok(())
}

async fn run_call(hub: &HubConfig, device_id: &str, method: &str, params: Option<&str>) -> Result<()> {
    let mut request = ClientRequest::new(method);
    if let Some(params) = params {
        match serde_json::from_str::<Value>(params).context("parsing --params")? {
            Value::Object(map) => request = request.with_params(map),
            other => bail!("--params must be a JSON object, got {}", other),
        }
    }

    let coordinator = build_coordinator(hub, device_id, None)?;
    let data = coordinator.call_device(request).await?;
    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}
