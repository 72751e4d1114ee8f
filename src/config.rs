//! Service configuration with serde serialization/deserialization
//!
//! Holds the settings that live for the whole process: where the HTTP server
//! binds, how Chrome is launched, and the defaults applied to requests that
//! don't override them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::RenderError;

/// Main configuration structure for the render service
///
/// # Examples
///
/// ```rust
/// use pdf_overlay_renderer::Config;
///
/// let config = Config {
///     port: 8080,
///     metrics_enabled: true,
///     ..Default::default()
/// };
/// assert_eq!(config.navigation_timeout.as_secs(), 30);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to (default: 0.0.0.0)
    pub bind_address: String,

    /// HTTP port (default: 3000, overridden by the `PORT` environment variable)
    pub port: u16,

    /// Navigation timeout used when a request doesn't carry its own (default: 30 seconds)
    pub navigation_timeout: Duration,

    /// Largest request body accepted, in bytes (default: 500 MB)
    ///
    /// Inline markup and full-markup templates travel in the body, so this
    /// needs to be generous.
    pub max_body_bytes: usize,

    /// Browser window size used at launch
    pub viewport: Viewport,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Custom User-Agent string for page loads
    pub user_agent: Option<String>,

    /// Memory limit handed to Chrome's V8 heap in bytes (default: 1GB)
    pub memory_limit: Option<usize>,

    /// Expose Prometheus metrics at `/metrics` (default: false)
    pub metrics_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            navigation_timeout: Duration::from_secs(30),
            max_body_bytes: 500 * 1024 * 1024,
            viewport: Viewport::default(),
            chrome_path: None,
            user_agent: None,
            memory_limit: Some(1024 * 1024 * 1024), // 1GB
            metrics_enabled: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), RenderError> {
        if self.navigation_timeout.is_zero() {
            return Err(RenderError::ConfigurationError(
                "Navigation timeout must be greater than 0".to_string(),
            ));
        }

        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(RenderError::ConfigurationError(
                "Viewport dimensions must be greater than 0".to_string(),
            ));
        }

        if self.max_body_bytes == 0 {
            return Err(RenderError::ConfigurationError(
                "Body limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Browser viewport, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Viewport {
    /// Viewport width in pixels (default: 800)
    pub width: u32,

    /// Viewport height in pixels (default: 600)
    pub height: u32,

    /// Device pixel ratio (default: 1.0)
    pub device_scale_factor: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            device_scale_factor: 1.0,
        }
    }
}

/// Generate Chrome command-line arguments based on configuration
///
/// # Examples
///
/// ```rust
/// use pdf_overlay_renderer::{Config, get_chrome_args, new_profile_dir};
///
/// let args = get_chrome_args(&Config::default(), &new_profile_dir());
/// assert!(args.contains(&"--no-sandbox".to_string()));
/// ```
pub fn get_chrome_args(config: &Config, profile_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-features=TranslateUI".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--ignore-certificate-errors".to_string(),
        "--ignore-ssl-errors".to_string(),
        format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ),
        format!("--user-data-dir={}", profile_dir.display()),
    ];

    if let Some(memory_limit) = config.memory_limit {
        args.push(format!(
            "--js-flags=--max-old-space-size={}",
            memory_limit / 1024 / 1024
        ));
    }

    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args
}

/// Fresh Chrome profile directory, unique per launch.
///
/// The directory is created by Chrome; whoever launched it removes it.
pub fn new_profile_dir() -> PathBuf {
    std::env::temp_dir().join(format!(
        "chromium-render-{}-{}",
        std::process::id(),
        uuid::Uuid::new_v4()
    ))
}

pub fn create_browser_config(
    config: &Config,
    profile_dir: &Path,
) -> Result<chromiumoxide::browser::BrowserConfig, RenderError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .window_size(config.viewport.width, config.viewport.height)
        .args(get_chrome_args(config, profile_dir));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(RenderError::BrowserLaunchFailed)
}
