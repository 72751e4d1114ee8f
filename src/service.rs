//! Render pipeline orchestration
//!
//! One call to [`RenderService::handle`] runs a normalized request through the
//! renderer and, for PDFs, the overlay compositor. Requests are independent:
//! nothing is shared between them except the renderer itself.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, Instrument};

use crate::{
    format_bytes, format_duration, ChromeRenderer, Config, ContentSource, Disposition, Metrics,
    OutputKind, OverlayCompositor, PageRenderer, PdfOptions, RenderError, RenderRequest,
};

/// What a request produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutput {
    Html(String),
    Image {
        bytes: Vec<u8>,
        mime_type: &'static str,
    },
    Pdf {
        bytes: Vec<u8>,
        filename: String,
        disposition: Disposition,
    },
}

impl RenderOutput {
    pub fn len(&self) -> usize {
        match self {
            RenderOutput::Html(html) => html.len(),
            RenderOutput::Image { bytes, .. } | RenderOutput::Pdf { bytes, .. } => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Render service shared by the HTTP server and the one-shot CLI
///
/// # Examples
///
/// ```rust,no_run
/// use pdf_overlay_renderer::{normalize, Config, Metrics, RawParams, RenderService};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let service = RenderService::launch(&config, Arc::new(Metrics::noop())).await?;
///
///     let mut params = RawParams::new();
///     params.insert("url".to_string(), "example.com".to_string());
///     params.insert("type".to_string(), "pdf".to_string());
///
///     let output = service.handle(normalize(&params, &config)?).await?;
///     println!("Rendered {} bytes", output.len());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RenderService {
    renderer: Arc<dyn PageRenderer>,
    compositor: Arc<OverlayCompositor>,
    metrics: Arc<Metrics>,
    chrome: Option<Arc<ChromeRenderer>>,
}

impl RenderService {
    pub fn new(renderer: Arc<dyn PageRenderer>, metrics: Arc<Metrics>) -> Self {
        Self {
            compositor: Arc::new(OverlayCompositor::new(renderer.clone())),
            renderer,
            metrics,
            chrome: None,
        }
    }

    /// Launch Chrome and build a service on top of it.
    pub async fn launch(config: &Config, metrics: Arc<Metrics>) -> Result<Self, RenderError> {
        let chrome = Arc::new(ChromeRenderer::launch(config.clone()).await?);
        let mut service = Self::new(chrome.clone(), metrics);
        service.chrome = Some(chrome);
        Ok(service)
    }

    pub async fn handle(&self, request: RenderRequest) -> Result<RenderOutput, RenderError> {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!(
            "render",
            %request_id,
            kind = ?request.kind,
            source = %request.source.describe()
        );

        async move {
            let started = Instant::now();
            self.metrics.record_request(request.kind);

            let result = self.run(request).await;
            let elapsed = started.elapsed();
            self.metrics.record_render(elapsed, result.as_ref().err());

            match &result {
                Ok(output) => info!(
                    size = %format_bytes(output.len()),
                    elapsed = %format_duration(elapsed),
                    "Render completed"
                ),
                Err(e) => error!(
                    error = %e,
                    kind = e.kind(),
                    severity = ?e.severity(),
                    "Render failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: RenderRequest) -> Result<RenderOutput, RenderError> {
        let RenderRequest {
            source,
            kind,
            filename,
            disposition,
            options,
        } = request;

        match kind {
            OutputKind::Html => {
                let html = self.renderer.html(&source, &options.navigation).await?;
                Ok(RenderOutput::Html(html))
            }
            OutputKind::Screenshot => {
                let bytes = self
                    .renderer
                    .screenshot(&source, &options.navigation, &options.screenshot)
                    .await?;
                Ok(RenderOutput::Image {
                    bytes,
                    mime_type: options.screenshot.image_type.mime_type(),
                })
            }
            OutputKind::Pdf => {
                let filename = filename.ok_or_else(|| match &source {
                    ContentSource::InlineMarkup(_) => RenderError::InvalidOptions(
                        "Please specify the filename to use for the rendered html".to_string(),
                    ),
                    ContentSource::Url(url) => {
                        RenderError::InvalidOptions(format!("Cannot derive a filename from {url}"))
                    }
                })?;

                let base = self
                    .renderer
                    .pdf(&source, &options.navigation, &PdfOptions::for_document(&options))
                    .await?;
                let bytes = self.compositor.compose(base, &options).await?;

                Ok(RenderOutput::Pdf {
                    bytes,
                    filename: format!("{filename}.pdf"),
                    disposition,
                })
            }
        }
    }

    pub async fn shutdown(&self) {
        info!("Shutting down render service...");
        if let Some(chrome) = &self.chrome {
            chrome.shutdown().await;
        }
        info!("Render service shutdown complete");
    }
}
