use clap::Parser;
use pdf_overlay_renderer::{setup_logging, Cli, CliRunner};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    setup_logging(args.verbose)?;

    info!("Starting pdf-overlay-renderer v{}", env!("CARGO_PKG_VERSION"));

    let config = args.load_config().await?;
    let runner = CliRunner::new(config);

    if let Err(e) = runner.run(args.command).await {
        error!("Application error: {:#}", e);
        std::process::exit(1);
    }

    info!("pdf-overlay-renderer stopped");
    Ok(())
}
