use std::collections::HashMap;
use std::sync::Arc;

use camhub::client::list_available_cameras;
use camhub::config::Settings;
use camhub::device::SystemProbe;
use camhub::enumerator::DeviceEnumerator;
use camhub::orchestrator::ReconciliationOrchestrator;
use camhub::pipeline::GstLaunchFactory;
use camhub::protocol::stream_base;
use camhub::registry::CameraRegistry;
use camhub::server::{self, AppState};
use camhub::{HubError, HubResult};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "camhub")]
#[command(about = "Publish local cameras as RTSP streams and keep them in sync with the hardware")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconciliation loop and the query service
    Serve {
        /// Host to bind the query service to
        #[arg(long)]
        host: Option<String>,
        /// Port to bind the query service to
        #[arg(long)]
        port: Option<u16>,
        /// Seconds between device scans
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Scan device slots once and print what would be published
    Detect,
    /// List the cameras published by a running hub
    List {
        /// Query service base URL
        #[arg(long, default_value = "http://127.0.0.1:5000")]
        server: Url,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Print the config file location
    Path,
    /// Write the default configuration to the config file
    Reset,
}

#[tokio::main]
async fn main() -> HubResult<()> {
    let cli = Cli::parse();

    let settings = match Settings::new() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let default_level = if cli.debug || settings.debug {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| HubError::App(format!("Failed to set tracing subscriber: {e}")))?;

    debug!("Loaded settings: {settings:?}");

    match cli.command {
        Commands::Serve {
            host,
            port,
            interval,
        } => {
            let mut settings = settings;
            if let Some(host) = host {
                settings.http_host = host;
            }
            if let Some(port) = port {
                settings.http_port = port;
            }
            if let Some(interval) = interval {
                settings.poll_interval_secs = interval;
            }
            settings.validate()?;
            serve(settings).await
        }
        Commands::Detect => detect(settings).await,
        Commands::List { server } => list(server, &settings).await,
        Commands::Config { action } => handle_config_command(action, &settings),
    }
}

fn build_enumerator(settings: &Settings) -> DeviceEnumerator<SystemProbe> {
    DeviceEnumerator::new(SystemProbe::new(), settings.naming.build(), settings.max_slots)
        .with_probe_timeout(settings.probe_timeout())
        .with_probing(settings.probe_enabled)
}

async fn serve(settings: Settings) -> HubResult<()> {
    info!("camhub starting up");

    let listener = server::bind(&settings.http_host, settings.http_port).await?;

    let registry = CameraRegistry::new();
    let orchestrator = ReconciliationOrchestrator::new(
        build_enumerator(&settings),
        GstLaunchFactory::new(&settings),
        registry.clone(),
        settings.poll_interval(),
    );

    let state = Arc::new(AppState {
        registry,
        stream_base: stream_base(&settings.stream_host, settings.stream_port)?,
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reconciler = tokio::spawn(orchestrator.run(shutdown_rx.clone()));

    let mut http_shutdown = shutdown_rx;
    let http = tokio::spawn(server::serve(listener, state, async move {
        let _ = http_shutdown.wait_for(|stop| *stop).await;
    }));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    if shutdown_tx.send(true).is_err() {
        debug!("All shutdown receivers already dropped");
    }

    match reconciler.await {
        Ok(Err(e)) => error!("Reconciliation loop error: {e}"),
        Err(e) => error!("Reconciliation task panicked: {e}"),
        Ok(Ok(())) => {}
    }
    http.await
        .map_err(|e| HubError::App(format!("Query service task failed: {e}")))?
}

async fn detect(settings: Settings) -> HubResult<()> {
    info!("Detecting cameras in /dev/video0..{}", settings.max_slots);
    let enumerator = build_enumerator(&settings);
    let devices = tokio::task::spawn_blocking(move || enumerator.enumerate(&HashMap::new()))
        .await
        .map_err(|e| HubError::App(format!("Enumeration task failed: {e}")))?;

    if devices.is_empty() {
        println!("No streamable cameras found.");
        return Ok(());
    }

    for device in devices.values() {
        println!(
            "{:<12} {:<14} slot {:<2} vendor {:<6} product {}",
            device.derived_name,
            device.device_path,
            device.slot_id,
            device.vendor_id.as_deref().unwrap_or("-"),
            device.product_id.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

async fn list(server: Url, settings: &Settings) -> HubResult<()> {
    let cameras =
        list_available_cameras(&server, &settings.stream_host, settings.stream_port).await?;

    if cameras.is_empty() {
        println!("No cameras available.");
        return Ok(());
    }

    println!("Available cameras:");
    for (idx, camera) in cameras.iter().enumerate() {
        println!("{idx}: {} {}", camera.name, camera.stream_url);
    }
    Ok(())
}

fn handle_config_command(action: ConfigAction, settings: &Settings) -> HubResult<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(settings)?);
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", Settings::get_config_path().display());
            Ok(())
        }
        ConfigAction::Reset => {
            let path = Settings::get_config_path();
            Settings::default().save(&path)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}
