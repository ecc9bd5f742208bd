use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use webcam_harvester::{setup_logging, Cli, CliRunner, Config};

/// Shell convention for termination by SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    setup_logging(args.verbose)?;

    info!("Starting webcam-harvester v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args).await?;
    let runner = CliRunner::new(config);

    // Dropping the run future on a signal aborts the workers first, then
    // releases the instance lock.
    let result = tokio::select! {
        result = runner.run(args.command) => Some(result),
        _ = signal::ctrl_c() => None,
    };

    match result {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => {
            error!("Application error: {:#}", e);
            std::process::exit(1);
        }
        None => {
            warn!("Interrupted, run aborted");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    }
}

async fn load_config(args: &Cli) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => Config::default(),
    };

    args.apply_overrides(&mut config);
    config.validate()?;

    info!("Configuration loaded successfully");
    info!("Index URL: {}", config.index_url);
    info!("Pool size: {}", config.pool_size);
    info!("Request timeout: {:?}", config.request_timeout);

    Ok(config)
}
