//! Route handlers.

use super::AppState;
use crate::capture::{AfMode, CaptureConfig, CaptureError, DeviceInfo};
use crate::config::parse_requested;
use crate::service::Snapshot;
use crate::snapshot::{CachedFrame, SnapshotFormat};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Form,
};
use bytes::Bytes;
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>picam-snapshot</title></head>
<body>
<h1>picam-snapshot</h1>
<ul>
<li><a href="/snapshot.jpg">/snapshot.jpg</a> (also .png, .bmp, .gif)</li>
<li><a href="/snapshot.jpg?cached=1">/snapshot.jpg?cached=1</a></li>
<li><a href="/camera">/camera</a></li>
<li><a href="/focus">/focus</a></li>
<li><a href="/metrics">/metrics</a></li>
<li><a href="/health">/health</a></li>
</ul>
</body>
</html>
"#;

pub(super) async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct SnapshotQuery {
    cached: Option<String>,
}

impl SnapshotQuery {
    fn force_cached(&self) -> bool {
        self.cached
            .as_deref()
            .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
    }
}

/// `GET /snapshot.<ext>`
pub(super) async fn snapshot(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
    Query(query): Query<SnapshotQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(format) = file
        .strip_prefix("snapshot.")
        .and_then(SnapshotFormat::from_extension)
    else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let metrics = state.service.metrics();
    match state.service.snapshot(query.force_cached()).await {
        Ok(Snapshot::Frame { frame, source }) => {
            let etag = frame.etag_for(format);
            if if_none_match(&headers, &etag) {
                metrics.record_request("not_modified");
                return not_modified(&etag);
            }

            match encode(&state, &frame, format).await {
                Ok(body) => {
                    metrics.record_request(source.as_str());
                    frame_response(&frame, format, &etag, body)
                }
                Err(message) => {
                    tracing::error!(format = format.extension(), error = %message, "Transcoding failed");
                    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
                }
            }
        }
        Ok(Snapshot::Placeholder(bytes)) => {
            metrics.record_request("placeholder");
            let content_type = image::guess_format(&bytes)
                .map(|f| f.to_mime_type())
                .unwrap_or("image/jpeg");
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            metrics.record_request("unavailable");
            let message = match e {
                CaptureError::Busy => "Camera busy, no frame cached yet".to_string(),
                other => format!("Camera unavailable: {other}"),
            };
            (StatusCode::SERVICE_UNAVAILABLE, message).into_response()
        }
    }
}

fn if_none_match(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|value| {
            value.split(',').map(str::trim).any(|candidate| {
                candidate == "*" || candidate == etag || candidate.strip_prefix("W/") == Some(etag)
            })
        })
}

fn not_modified(etag: &str) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    if let Ok(value) = HeaderValue::from_str(etag) {
        response.headers_mut().insert(header::ETAG, value);
    }
    response
}

async fn encode(
    state: &AppState,
    frame: &CachedFrame,
    format: SnapshotFormat,
) -> Result<Bytes, String> {
    if format == SnapshotFormat::Jpeg {
        return Ok(frame.jpeg().clone());
    }
    let quality = state.service.camera().config().quality;
    let jpeg = frame.jpeg().clone();
    match tokio::task::spawn_blocking(move || format.encode(&jpeg, quality)).await {
        Ok(Ok(bytes)) => Ok(Bytes::from(bytes)),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(format!("transcode task failed: {e}")),
    }
}

fn frame_response(frame: &CachedFrame, format: SnapshotFormat, etag: &str, body: Bytes) -> Response {
    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::LAST_MODIFIED, frame.last_modified()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(etag) {
        response.headers_mut().insert(header::ETAG, value);
    }
    response
}

/// `GET /camera`
pub(super) async fn camera(State(state): State<Arc<AppState>>) -> Response {
    let camera = Arc::clone(state.service.camera());
    let active = camera.config().device_index;
    let backend = camera.backend_name();

    match tokio::task::spawn_blocking(move || camera.devices()).await {
        Ok(Ok(devices)) => Html(render_devices(backend, &devices, active)).into_response(),
        Ok(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to list cameras: {e}"),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_devices(backend: &str, devices: &[DeviceInfo], active: u32) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head><title>Cameras</title></head>\n<body>\n",
    );
    let _ = writeln!(html, "<h1>Cameras ({})</h1>", escape_html(backend));

    if devices.is_empty() {
        html.push_str("<p>No cameras reported.</p>\n");
    } else {
        html.push_str(
            "<table>\n<tr><th>Index</th><th>Model</th><th>ID</th><th>Max resolution</th><th>Active</th></tr>\n",
        );
        for device in devices {
            let resolution = device
                .max_resolution
                .map(|(w, h)| format!("{w}x{h}"))
                .unwrap_or_else(|| "unknown".into());
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                device.index,
                escape_html(&device.model),
                escape_html(&device.id),
                resolution,
                if device.index == active { "yes" } else { "" }
            );
        }
        html.push_str("</table>\n");

        if let Some(device) = devices.iter().find(|d| d.index == active) {
            let _ = writeln!(
                html,
                "<p>Selected in config with <code>camera_id: {}</code></p>",
                escape_html(&device.id)
            );
        }
    }

    html.push_str("</body>\n</html>\n");
    html
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct SetParams {
    apikey: Option<String>,
    width: Option<String>,
    height: Option<String>,
    quality: Option<String>,
}

/// `GET /set?apikey=K&width=W&height=H&quality=Q`
pub(super) async fn set(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SetParams>,
) -> Response {
    if !state.authorized(params.apikey.as_deref()) {
        tracing::warn!("Rejected /set request with invalid API key");
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    let camera = Arc::clone(state.service.camera());
    let current = camera.config();
    let width = state.limits.constrain_width(
        parse_requested(params.width.as_deref()),
        state.sensor.map(|s| s.0),
    );
    let height = state.limits.constrain_height(
        parse_requested(params.height.as_deref()),
        state.sensor.map(|s| s.1),
    );

    let mut next = current.clone();
    if width > 0 && height > 0 {
        next.width = width;
        next.height = height;
    }
    if let Some(quality) = parse_requested(params.quality.as_deref()) {
        next.quality = state.limits.constrain_quality(Some(quality)).max(1);
    }

    if next != current {
        let config = next.clone();
        match tokio::task::spawn_blocking(move || camera.reconfigure(config)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to reconfigure camera: {e}"),
                )
                    .into_response()
            }
            Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        }
    }

    let mut overrides = state.overrides.lock().await;
    overrides.width = Some(next.width);
    overrides.height = Some(next.height);
    overrides.quality = Some(next.quality);
    if let Err(e) = overrides.save(&state.overrides_path) {
        tracing::error!(error = %e, "Failed to persist camera overrides");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    tracing::info!(
        width = next.width,
        height = next.height,
        quality = next.quality,
        "Camera settings updated"
    );
    (StatusCode::OK, "OK").into_response()
}

fn render_focus(config: &CaptureConfig) -> String {
    let mode = config.af_mode.map_or("default", AfMode::as_arg);
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head><title>Focus</title></head>\n<body>\n",
    );
    let _ = writeln!(html, "<h1>Focus (mode: {mode})</h1>");
    if let Some(position) = config.lens_position {
        let _ = writeln!(html, "<p>Lens position: {position}</p>");
    }
    html.push_str(concat!(
        "<form method=\"post\" action=\"/focus\">\n",
        "<label>API key <input name=\"apikey\" type=\"password\"></label>\n",
        "<label>Lens position <input name=\"lens_position\"></label>\n",
        "<button name=\"mode\" value=\"manual\">Manual</button>\n",
        "<button name=\"mode\" value=\"auto\">Auto</button>\n",
        "<button name=\"mode\" value=\"continuous\">Continuous</button>\n",
        "</form>\n</body>\n</html>\n",
    ));
    html
}

/// `GET /focus`
pub(super) async fn focus_page(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(render_focus(&state.service.camera().config()))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct FocusParams {
    apikey: Option<String>,
    mode: Option<AfMode>,
    lens_position: Option<String>,
}

/// `POST /focus` with `apikey`, `mode` and/or `lens_position`.
///
/// A lens position locks the focus, so it is only accepted with manual mode.
pub(super) async fn focus(
    State(state): State<Arc<AppState>>,
    Form(params): Form<FocusParams>,
) -> Response {
    if !state.authorized(params.apikey.as_deref()) {
        tracing::warn!("Rejected /focus request with invalid API key");
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    let lens_position = match params.lens_position.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse::<f32>() {
            Ok(position) => Some(position),
            Err(_) => {
                return (StatusCode::BAD_REQUEST, format!("Invalid lens_position {raw}"))
                    .into_response()
            }
        },
    };

    let camera = Arc::clone(state.service.camera());
    let mut next = camera.config();
    match (params.mode, lens_position) {
        (None, None) => {
            return (StatusCode::BAD_REQUEST, "Expected mode or lens_position").into_response()
        }
        (Some(AfMode::Auto | AfMode::Continuous), Some(_)) => {
            return (
                StatusCode::BAD_REQUEST,
                "lens_position requires manual focus",
            )
                .into_response()
        }
        (Some(mode), None) => {
            next.af_mode = Some(mode);
            if mode != AfMode::Manual {
                next.lens_position = None;
            }
        }
        (_, Some(position)) => {
            next.af_mode = Some(AfMode::Manual);
            next.lens_position = Some(position);
        }
    }
    if let Err(e) = next.validate() {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }

    let config = next.clone();
    match tokio::task::spawn_blocking(move || camera.reconfigure(config)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to reconfigure camera: {e}"),
            )
                .into_response()
        }
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }

    let mut overrides = state.overrides.lock().await;
    overrides.af_mode = next.af_mode;
    overrides.lens_position = next.lens_position;
    if let Err(e) = overrides.save(&state.overrides_path) {
        tracing::error!(error = %e, "Failed to persist camera overrides");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    tracing::info!(
        mode = ?next.af_mode,
        lens_position = ?next.lens_position,
        "Focus updated"
    );
    (StatusCode::OK, "OK").into_response()
}

/// `POST /reboot`
pub(super) async fn reboot(State(state): State<Arc<AppState>>) -> Response {
    let camera = Arc::clone(state.service.camera());
    let pause = state.reboot_pause;
    tracing::info!("Camera reboot requested");

    match tokio::task::spawn_blocking(move || camera.restart(pause)).await {
        Ok(Ok(())) => (StatusCode::OK, "OK").into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Camera reboot failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to reopen camera: {e}"),
            )
                .into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// `GET /metrics`
pub(super) async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.service.metrics().encode() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {}", e),
        ),
    }
}

/// `GET /health`
pub(super) async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.service.health();
    if health.is_healthy {
        (StatusCode::OK, "OK".to_string())
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!(
                "UNHEALTHY: {} consecutive failures, last error: {}",
                health.consecutive_failures,
                health.last_error.as_deref().unwrap_or("unknown")
            ),
        )
    }
}
