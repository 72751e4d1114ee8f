use metrics::{
    describe_counter, describe_histogram, increment_counter, register_counter,
    register_histogram, Counter, Histogram,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use tracing::info;

use crate::{OutputKind, RenderError};

/// Metric handles for the render pipeline.
///
/// Handles registered before a recorder is installed are no-ops, so install
/// the Prometheus recorder first when metrics are wanted.
pub struct Metrics {
    pub html_requests: Counter,
    pub screenshot_requests: Counter,
    pub pdf_requests: Counter,
    pub renders_failed: Counter,
    pub render_duration: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            html_requests: register_counter!("render_requests_total", "type" => "html"),
            screenshot_requests: register_counter!("render_requests_total", "type" => "screenshot"),
            pdf_requests: register_counter!("render_requests_total", "type" => "pdf"),
            renders_failed: register_counter!("render_failures_total"),
            render_duration: register_histogram!("render_duration_seconds"),
        }
    }

    pub fn noop() -> Self {
        Self {
            html_requests: Counter::noop(),
            screenshot_requests: Counter::noop(),
            pdf_requests: Counter::noop(),
            renders_failed: Counter::noop(),
            render_duration: Histogram::noop(),
        }
    }

    pub fn record_request(&self, kind: OutputKind) {
        match kind {
            OutputKind::Html => self.html_requests.increment(1),
            OutputKind::Screenshot => self.screenshot_requests.increment(1),
            OutputKind::Pdf => self.pdf_requests.increment(1),
        }
    }

    pub fn record_render(&self, duration: Duration, error: Option<&RenderError>) {
        self.render_duration.record(duration.as_secs_f64());

        if let Some(error) = error {
            self.renders_failed.increment(1);
            increment_counter!("render_errors_total", "kind" => error.kind());
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn describe_metrics() {
    describe_counter!("render_requests_total", "Render requests by output type");
    describe_counter!("render_failures_total", "Render requests that failed");
    describe_counter!("render_errors_total", "Render failures by error kind");
    describe_histogram!("render_duration_seconds", "End-to-end render time");
    describe_counter!(
        "overlay_generations_total",
        "Header/footer overlays rendered by the browser"
    );
    describe_counter!(
        "overlay_cache_hits_total",
        "Header/footer overlays reused from the slot cache"
    );
    describe_counter!("composed_pages_total", "Pages stamped with overlays");
}

/// Install the process-wide Prometheus recorder.
///
/// The returned handle renders the text exposition served at `/metrics`.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, RenderError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| RenderError::ConfigurationError(format!("metrics recorder: {e}")))?;
    describe_metrics();
    info!("Prometheus recorder installed");
    Ok(handle)
}
