use std::time::Duration;
use thiserror::Error;

use crate::pdf::PdfEditError;

#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("Composition failed: {0}")]
    CompositionFailed(String),

    #[error("Navigation timeout after {0:?}")]
    Timeout(Duration),

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Browser instance unavailable")]
    BrowserUnavailable,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl RenderError {
    /// Whether the caller can fix the request and try again.
    pub fn is_client_error(&self) -> bool {
        matches!(self, RenderError::InvalidOptions(_))
    }

    /// HTTP status the server answers with for this error.
    pub fn status_code(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RenderError::InvalidOptions(_) => ErrorSeverity::Low,
            RenderError::Timeout(_) | RenderError::RenderFailed(_) => ErrorSeverity::Medium,
            RenderError::CompositionFailed(_) => ErrorSeverity::Medium,
            RenderError::ConfigurationError(_) => ErrorSeverity::High,
            RenderError::BrowserLaunchFailed(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Medium,
        }
    }

    /// Short label used for metric and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::InvalidOptions(_) => "invalid_options",
            RenderError::RenderFailed(_) => "render_failed",
            RenderError::CompositionFailed(_) => "composition_failed",
            RenderError::Timeout(_) => "timeout",
            RenderError::BrowserLaunchFailed(_) => "browser_launch_failed",
            RenderError::BrowserUnavailable => "browser_unavailable",
            RenderError::ConfigurationError(_) => "configuration",
            RenderError::IoError(_) => "io",
            RenderError::SerializationError(_) => "serialization",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl From<std::io::Error> for RenderError {
    fn from(err: std::io::Error) -> Self {
        RenderError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for RenderError {
    fn from(err: serde_json::Error) -> Self {
        RenderError::SerializationError(err.to_string())
    }
}

impl From<PdfEditError> for RenderError {
    fn from(err: PdfEditError) -> Self {
        RenderError::CompositionFailed(err.to_string())
    }
}

impl From<lopdf::Error> for RenderError {
    fn from(err: lopdf::Error) -> Self {
        RenderError::CompositionFailed(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for RenderError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        RenderError::RenderFailed(err.to_string())
    }
}
