//! HTTP entry point
//!
//! Every method on every path renders, except `/health` and (when enabled)
//! `/metrics`. Parameters come from the query string and the body; body values
//! win when both carry the same key.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    content_disposition, normalize, Config, RawParams, RenderError, RenderOutput, RenderService,
};

const INTERNAL_ERROR_MESSAGE: &str = "Oops, An expected error seems to have occurred.";

pub struct AppState {
    pub service: RenderService,
    pub config: Config,
    pub prometheus: Option<PrometheusHandle>,
    started: Instant,
}

impl AppState {
    pub fn new(service: RenderService, config: Config) -> Self {
        Self {
            service,
            config,
            prometheus: None,
            started: Instant::now(),
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;
    let metrics_enabled = state.prometheus.is_some();

    let mut router = Router::new().route("/health", get(health));
    if metrics_enabled {
        router = router.route("/metrics", get(prometheus_metrics));
    }

    router
        .fallback(render)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), RenderError> {
    let address = state.config.socket_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Listening on {}", address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn render(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let result = match collect_params(query.as_deref(), content_type, &body) {
        Ok(params) => match normalize(&params, &state.config) {
            Ok(request) => state.service.handle(request).await,
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(output) => output.into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started.elapsed().as_secs(),
    })
}

async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Merge query-string and body parameters.
///
/// JSON bodies must be objects; scalar values are stringified so `true` and
/// `"true"` mean the same thing. Anything that isn't JSON is read as a form.
pub fn collect_params(
    query: Option<&str>,
    content_type: Option<&str>,
    body: &[u8],
) -> Result<RawParams, RenderError> {
    let mut params: RawParams = query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    if body.is_empty() {
        return Ok(params);
    }

    let is_json = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
    if is_json {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| RenderError::InvalidOptions(format!("Malformed JSON body: {e}")))?;
        let serde_json::Value::Object(object) = value else {
            return Err(RenderError::InvalidOptions(
                "Request body must be a JSON object".to_string(),
            ));
        };
        for (key, value) in object {
            match value {
                serde_json::Value::Null => {}
                serde_json::Value::String(s) => {
                    params.insert(key, s);
                }
                other => {
                    params.insert(key, other.to_string());
                }
            }
        }
    } else {
        params.extend(url::form_urlencoded::parse(body).into_owned());
    }

    Ok(params)
}

impl IntoResponse for RenderOutput {
    fn into_response(self) -> Response {
        match self {
            RenderOutput::Html(html) => (
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                html,
            )
                .into_response(),
            RenderOutput::Image { bytes, mime_type } => (
                [
                    (header::CONTENT_TYPE, mime_type.to_string()),
                    (header::CONTENT_LENGTH, bytes.len().to_string()),
                ],
                bytes,
            )
                .into_response(),
            RenderOutput::Pdf {
                bytes,
                filename,
                disposition,
            } => (
                [
                    (header::CONTENT_TYPE, "application/pdf".to_string()),
                    (header::CONTENT_LENGTH, bytes.len().to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        content_disposition(&filename, disposition),
                    ),
                ],
                bytes,
            )
                .into_response(),
        }
    }
}

/// Maps a [`RenderError`] onto the wire: the message for client errors, a
/// generic one for everything else.
pub struct ApiError(pub RenderError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if self.0.is_client_error() {
            let message = match self.0 {
                RenderError::InvalidOptions(message) => message,
                other => other.to_string(),
            };
            (status, message).into_response()
        } else {
            error!("Request failed: {}", self.0);
            (status, INTERNAL_ERROR_MESSAGE).into_response()
        }
    }
}
