//! Per-method access logging.

use super::AppState;
use crate::config::AccessLogLevel;
use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Logs one line per request at the level configured for its method.
pub(super) async fn log_request(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(level) = state.logging.level_for(request.method().as_str()) else {
        return next.run(request).await;
    };

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started = Instant::now();

    let response = next.run(request).await;

    let line = access_line(&method, &path, response.status().as_u16(), started.elapsed());
    match level {
        AccessLogLevel::Debug => tracing::debug!(target: "picam_snapshot::access", "{}", line),
        AccessLogLevel::Info => tracing::info!(target: "picam_snapshot::access", "{}", line),
        AccessLogLevel::Warning => tracing::warn!(target: "picam_snapshot::access", "{}", line),
        AccessLogLevel::Error => tracing::error!(target: "picam_snapshot::access", "{}", line),
    }
    response
}

/// `METHOD PATH - STATUS`, with the handling time appended for GET only.
fn access_line(method: &Method, path: &str, status: u16, elapsed: Duration) -> String {
    let mut line = format!("{} {} - {}", method, path, status);
    if method == Method::GET {
        line.push_str(&format!(" ({:.2}ms)", elapsed.as_secs_f64() * 1000.0));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_line_carries_timing() {
        let line = access_line(&Method::GET, "/snapshot.jpg", 200, Duration::from_micros(12_345));
        assert_eq!(line, "GET /snapshot.jpg - 200 (12.35ms)");
    }

    #[test]
    fn test_post_line_has_no_timing() {
        let line = access_line(&Method::POST, "/reboot", 200, Duration::from_millis(3));
        assert_eq!(line, "POST /reboot - 200");
    }
}
