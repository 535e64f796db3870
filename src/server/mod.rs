//! HTTP server: snapshot, control and observability routes.
//!
//! | Method | Path                | Description                                |
//! |--------|---------------------|--------------------------------------------|
//! | GET    | `/`                 | Index page                                 |
//! | GET    | `/snapshot.<ext>`   | Current frame as jpg/jpeg/png/bmp/gif      |
//! | GET    | `/camera`           | Device listing                             |
//! | GET    | `/set`              | Change resolution/quality (API key)        |
//! | GET    | `/focus`            | Focus control form                         |
//! | POST   | `/focus`            | Set autofocus mode or lock lens (API key)  |
//! | POST   | `/reboot`           | Close and reopen the camera                |
//! | GET    | `/metrics`          | Prometheus text format                     |
//! | GET    | `/health`           | Capture health                             |

mod access_log;
mod handlers;

use crate::config::{CameraOverrides, Limits, LoggingConfig};
use crate::service::SnapshotService;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

/// Pause between closing and reopening the camera on `/reboot`.
pub const REBOOT_PAUSE: Duration = Duration::from_secs(1);

/// Errors that can occur during server operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind to address: {0}")]
    Bind(#[from] std::io::Error),

    /// The server stopped with an error.
    #[error("server error: {0}")]
    Server(String),
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
    /// Attach a permissive CORS layer.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 8080).into(),
            cors: true,
        }
    }
}

/// State shared by every handler.
pub struct AppState {
    pub(crate) service: Arc<SnapshotService>,
    pub(crate) api_keys: Vec<String>,
    pub(crate) limits: Limits,
    /// Largest resolution the active sensor reports.
    pub(crate) sensor: Option<(u32, u32)>,
    pub(crate) overrides_path: PathBuf,
    pub(crate) overrides: Mutex<CameraOverrides>,
    pub(crate) logging: LoggingConfig,
    pub(crate) reboot_pause: Duration,
}

impl AppState {
    /// Creates state with defaults around `service`.
    pub fn new(service: Arc<SnapshotService>) -> Self {
        Self {
            service,
            api_keys: Vec::new(),
            limits: Limits::default(),
            sensor: None,
            overrides_path: PathBuf::from("config-camera.yaml"),
            overrides: Mutex::new(CameraOverrides::default()),
            logging: LoggingConfig::default(),
            reboot_pause: REBOOT_PAUSE,
        }
    }

    /// Keys accepted by `/set` and `/focus`.
    pub fn with_api_keys(mut self, keys: Vec<String>) -> Self {
        self.api_keys = keys;
        self
    }

    /// Bounds for `/set` and the active sensor's largest resolution.
    pub fn with_limits(mut self, limits: Limits, sensor: Option<(u32, u32)>) -> Self {
        self.limits = limits;
        self.sensor = sensor;
        self
    }

    /// Where `/set` and `/focus` persist overrides, and their current values.
    pub fn with_overrides(mut self, path: PathBuf, overrides: CameraOverrides) -> Self {
        self.overrides_path = path;
        self.overrides = Mutex::new(overrides);
        self
    }

    /// Access-log levels.
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Pause between close and reopen on `/reboot`.
    pub fn with_reboot_pause(mut self, pause: Duration) -> Self {
        self.reboot_pause = pause;
        self
    }

    pub(crate) fn authorized(&self, key: Option<&str>) -> bool {
        key.is_some_and(|key| self.api_keys.iter().any(|k| k == key))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("service", &self.service)
            .field("api_keys", &self.api_keys.len())
            .field("limits", &self.limits)
            .field("sensor", &self.sensor)
            .field("overrides_path", &self.overrides_path)
            .finish_non_exhaustive()
    }
}

/// Builds the application router.
pub fn router(state: Arc<AppState>, cors: bool) -> Router {
    let app = Router::new()
        .route("/", get(handlers::index))
        .route("/camera", get(handlers::camera))
        .route("/set", get(handlers::set))
        .route("/focus", get(handlers::focus_page).post(handlers::focus))
        .route("/reboot", post(handlers::reboot))
        .route("/metrics", get(handlers::metrics))
        .route("/health", get(handlers::health))
        .route("/:file", get(handlers::snapshot))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            access_log::log_request,
        ))
        .with_state(state);

    if cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// HTTP server for snapshots.
pub struct SnapshotServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl SnapshotServer {
    /// Creates a server; nothing binds until [`run`](Self::run).
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serves on an already bound listener.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = router(self.state, self.config.cors);

        tracing::info!(
            addr = %listener.local_addr()?,
            "Snapshot server listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;

        tracing::info!("Snapshot server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.cors);
    }
}
