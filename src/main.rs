//! picam-snapshot server
//!
//! Loads the YAML config, opens the camera, starts the capture scheduler and
//! serves snapshots until Ctrl-C or SIGTERM.

use clap::Parser;
use picam_snapshot::{
    capture::{create_backend, select_device, CameraError, CameraHandle},
    config::{CameraOverrides, ConfigError, ServiceConfig},
    metrics::{MetricsError, MetricsRegistry},
    scheduler::CaptureScheduler,
    server::{shutdown_signal, AppState, ServerConfig, ServerError, SnapshotServer},
    service::{load_placeholder, SnapshotService},
};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve Raspberry Pi camera snapshots over HTTP")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override the listen port from the config.
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Select the camera by id, overriding `camera.camera_id`.
    #[arg(long)]
    camera_id: Option<String>,
}

/// Startup failures; each one ends the process with status 1.
#[derive(Debug, Error)]
enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("camera initialization failed: {0}")]
    Camera(#[from] CameraError),
    #[error("metrics setup failed: {0}")]
    Metrics(#[from] MetricsError),
    #[error(transparent)]
    Server(#[from] ServerError),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    info!("picam-snapshot v{}", picam_snapshot::VERSION);

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }

    info!("Shutdown complete");
}

fn load_config(args: &Args) -> Result<ServiceConfig, ConfigError> {
    let mut config = ServiceConfig::from_file(&args.config)?;
    if let Some(port) = args.port {
        config.web.port = port;
    }
    if let Some(camera_id) = &args.camera_id {
        config.camera.camera_id = Some(camera_id.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: Args) -> Result<(), StartupError> {
    let config = load_config(&args)?;
    let bind_addr = config.bind_addr()?;
    let overrides = CameraOverrides::load_or_default(&config.camera_config_path);

    // Camera
    let backend = create_backend(config.camera.backend, &config.camera.command)?;
    let devices = backend.devices().unwrap_or_else(|e| {
        warn!("Failed to list cameras: {}", e);
        Vec::new()
    });
    for device in &devices {
        info!(
            index = device.index,
            model = %device.model,
            id = %device.id,
            "Found camera"
        );
    }
    let device_index = select_device(&devices, config.camera.camera_id.as_deref());
    let sensor = devices
        .iter()
        .find(|d| d.index == device_index)
        .and_then(|d| d.max_resolution);
    let capture_config = config.capture_config(&overrides, device_index, sensor);
    let camera = Arc::new(CameraHandle::open(backend, capture_config)?);

    // Service
    let interval = config.refresh_interval(&overrides);
    let serve_mode = config.effective_serve_mode(&overrides);
    if serve_mode != config.capture.serve {
        info!(
            configured = ?config.capture.serve,
            "No capture scheduler, serving live captures"
        );
    }
    let metrics = Arc::new(MetricsRegistry::new()?);
    let service = Arc::new(
        SnapshotService::new(Arc::clone(&camera), metrics, serve_mode)
            .with_exif_model(config.camera.model.clone())
            .with_placeholder(load_placeholder(config.web.placeholder_image.as_deref()))
            .with_health_threshold(config.health.max_consecutive_failures),
    );

    // Scheduler
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = interval
        .map(|interval| CaptureScheduler::new(Arc::clone(&service), interval).spawn(shutdown_rx));
    if scheduler.is_none() {
        info!("Capture scheduler disabled, capturing on demand");
    }

    // Server
    let state = AppState::new(Arc::clone(&service))
        .with_api_keys(config.web.api_keys.clone())
        .with_limits(config.limits.clone(), sensor)
        .with_overrides(config.camera_config_path.clone(), overrides)
        .with_logging(config.logging.clone());
    let server = SnapshotServer::new(
        ServerConfig {
            bind_addr,
            cors: config.web.cors,
        },
        state,
    );
    let served = server.run(shutdown_signal()).await;

    let _ = shutdown_tx.send(true);
    if let Some(task) = scheduler {
        if let Err(e) = task.await {
            warn!("Capture scheduler ended abnormally: {}", e);
        }
    }
    camera.close();

    served?;
    Ok(())
}
