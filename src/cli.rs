use crate::{
    install_prometheus_recorder, normalize, server, AppState, Config, Metrics, RawParams,
    RenderOutput, RenderService,
};
use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::{fs, signal};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pdf-overlay-renderer")]
#[command(about = "Render web pages to HTML, images and PDFs with full-markup headers and footers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Configuration file path (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Default navigation timeout in milliseconds")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP render server
    Serve {
        #[arg(short, long, help = "Server port (overrides PORT)")]
        port: Option<u16>,

        #[arg(long, help = "Bind address")]
        bind: Option<String>,

        #[arg(long, help = "Expose Prometheus metrics at /metrics")]
        metrics: bool,
    },

    /// Render once and write the result to a file
    Render {
        #[arg(
            short = 'p',
            long = "param",
            value_parser = parse_param,
            help = "Request parameter as key=value (repeatable)"
        )]
        params: Vec<(String, String)>,

        #[arg(short, long, help = "Output file path")]
        output: PathBuf,
    },

    /// Validate configuration
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

fn parse_param(input: &str) -> Result<(String, String), String> {
    input
        .split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got `{input}`"))
}

impl Cli {
    /// Build the effective configuration: file, then `PORT`, then flags.
    pub async fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => Config::default(),
        };

        apply_port_env(&mut config, std::env::var("PORT").ok().as_deref());

        if let Some(timeout) = self.timeout {
            config.navigation_timeout = Duration::from_millis(timeout);
        }
        if let Some(chrome_path) = &self.chrome_path {
            config.chrome_path = Some(chrome_path.clone());
        }

        config.validate()?;

        info!("Configuration loaded successfully");
        info!("Navigation timeout: {:?}", config.navigation_timeout);
        Ok(config)
    }
}

fn apply_port_env(config: &mut Config, port: Option<&str>) {
    if let Some(port) = port.and_then(|p| p.trim().parse::<u16>().ok()) {
        config.port = port;
    }
}

pub struct CliRunner {
    pub config: Config,
}

impl CliRunner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(&self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Serve {
                port,
                bind,
                metrics,
            } => self.run_server(port, bind, metrics).await,
            Commands::Render { params, output } => self.run_render(params, output).await,
            Commands::Validate { config } => self.validate_config(config).await,
        }
    }

    pub async fn run_server(
        &self,
        port: Option<u16>,
        bind: Option<String>,
        metrics: bool,
    ) -> anyhow::Result<()> {
        let mut config = self.config.clone();
        if let Some(port) = port {
            config.port = port;
        }
        if let Some(bind) = bind {
            config.bind_address = bind;
        }
        config.metrics_enabled |= metrics;

        // The recorder has to exist before any metric handle is registered.
        let prometheus = if config.metrics_enabled {
            Some(install_prometheus_recorder()?)
        } else {
            None
        };

        let service = RenderService::launch(&config, Arc::new(Metrics::new())).await?;

        let mut state = AppState::new(service.clone(), config);
        if let Some(handle) = prometheus {
            state = state.with_prometheus(handle);
        }

        let result = server::serve(state, shutdown_signal()).await;
        service.shutdown().await;
        result.map_err(Into::into)
    }

    pub async fn run_render(
        &self,
        params: Vec<(String, String)>,
        output: PathBuf,
    ) -> anyhow::Result<()> {
        let params: RawParams = params.into_iter().collect();
        let request = normalize(&params, &self.config)?;
        info!("Rendering {}", request.source.describe());

        let service = RenderService::launch(&self.config, Arc::new(Metrics::noop())).await?;
        let result = service.handle(request).await;
        service.shutdown().await;

        let (bytes, label) = match result? {
            RenderOutput::Html(html) => (html.into_bytes(), "text/html".to_string()),
            RenderOutput::Image { bytes, mime_type } => (bytes, mime_type.to_string()),
            RenderOutput::Pdf {
                bytes, filename, ..
            } => (bytes, format!("application/pdf ({filename})")),
        };

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&output, &bytes).await?;
        info!("Output saved to: {}", output.display());

        println!("Rendered successfully:");
        println!("  Output: {}", output.display());
        println!("  Type: {label}");
        println!("  Size: {}", crate::format_bytes(bytes.len()));

        Ok(())
    }

    pub async fn validate_config(&self, config_path: PathBuf) -> anyhow::Result<()> {
        println!("Validating configuration: {}", config_path.display());

        let config_content = fs::read_to_string(&config_path).await?;
        let config: Config = serde_json::from_str(&config_content)?;
        config.validate()?;

        println!("Configuration is valid:");
        println!("  Listen: {}", config.socket_address());
        println!("  Navigation timeout: {:?}", config.navigation_timeout);
        println!("  Body limit: {}", crate::format_bytes(config.max_body_bytes));
        println!(
            "  Viewport: {}x{}",
            config.viewport.width, config.viewport.height
        );
        println!("  Metrics: {}", config.metrics_enabled);

        Ok(())
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`.
pub fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {e}"))?;

    Ok(())
}
