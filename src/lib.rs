//! # PDF Overlay Renderer
//!
//! Renders a URL or inline markup to HTML text, a screenshot, or a PDF through
//! headless Chrome. PDFs can carry headers and footers written as full markup
//! (styles, images, layout) instead of the browser's built-in templating: each
//! header/footer is printed as its own one-page PDF and stamped onto every page
//! of the document.
//!
//! ## Pipeline
//!
//! 1. [`normalize`] turns loose string parameters into a typed [`RenderRequest`].
//! 2. A [`PageRenderer`] (Chrome in production) produces the base output.
//! 3. For PDFs, the [`OverlayCompositor`] asks the [`OverlayGenerator`] for
//!    header/footer overlays and stamps them with the [`PdfEditor`].
//!
//! Templates may use `{pageNumber}` and `{totalPages}`. A template that uses
//! `{pageNumber}` is printed once per page; any other template is printed once
//! per document and reused.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_overlay_renderer::{normalize, Config, Metrics, RawParams, RenderService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let service = RenderService::launch(&config, Arc::new(Metrics::noop())).await?;
//!
//!     let params: RawParams = [
//!         ("url", "https://example.com"),
//!         ("type", "pdf"),
//!         ("displayHeaderFooter", "true"),
//!         ("fullHtmlFooter", "<p style='font-size:10px'>Page {pageNumber} of {totalPages}</p>"),
//!     ]
//!     .into_iter()
//!     .map(|(k, v)| (k.to_string(), v.to_string()))
//!     .collect();
//!
//!     let output = service.handle(normalize(&params, &config)?).await?;
//!     println!("Rendered {} bytes", output.len());
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! pdf-overlay-renderer serve --port 3000 --metrics
//! pdf-overlay-renderer render -p url=example.com -p type=pdf --output example.pdf
//! pdf-overlay-renderer validate --config config.json
//! ```

/// Configuration and settings
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Request parameter normalization
pub mod options;

/// Page renderer seam and print options
pub mod renderer;

/// Chrome implementation of the page renderer
pub mod browser;

/// Page-level PDF editing
pub mod pdf;

/// Header/footer overlay generation
pub mod overlay;

/// Overlay compositing onto base PDFs
pub mod compositor;

/// Per-request render pipeline
pub mod service;

/// HTTP server
pub mod server;

/// Command-line interface implementation
pub mod cli;

/// Metrics collection and Prometheus export
pub mod metrics;

/// Utility functions and helpers
pub mod utils;

#[cfg(test)]
mod testing;


pub use self::metrics::{install_prometheus_recorder, Metrics};
pub use browser::*;
pub use cli::*;
pub use compositor::*;
pub use config::*;
pub use error::*;
pub use options::*;
pub use overlay::*;
pub use pdf::*;
pub use renderer::*;
pub use server::{collect_params, router, AppState, ApiError};
pub use service::*;
pub use utils::*;
