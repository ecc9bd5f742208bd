use crate::{
    build_http_client, collect_frames, fetch_catalog, write_timelapse, CameraCatalog,
    CameraSelector, ConcatManifestSink, Config, FetchCoordinator, HarvestMetrics,
    HarvestService, InstanceGuard, MetricsExporter,
};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "webcam-harvester")]
#[command(about = "Periodic snapshot harvester for public webcams")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Configuration file path (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Number of concurrent camera workers")]
    pub pool_size: Option<usize>,

    #[arg(long, global = true, help = "Request timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download the current frame of every selected camera
    Harvest {
        #[arg(short, long, help = "Output root, one directory per camera")]
        output: PathBuf,

        #[arg(long, help = "Index page URL")]
        url: Option<String>,

        #[arg(long, num_args = 1.., help = "Only these cameras (positions or names)")]
        only: Vec<String>,

        #[arg(long, num_args = 1.., help = "Skip these cameras (positions or names)")]
        exclude: Vec<String>,

        #[arg(long, help = "Write Prometheus metrics to this file")]
        metrics_file: Option<PathBuf>,
    },

    /// Print the cameras listed on the index page
    Catalog {
        #[arg(long, help = "Index page URL")]
        url: Option<String>,

        #[arg(long, help = "Print the catalog as JSON")]
        json: bool,
    },

    /// Write an ffmpeg concat manifest from a camera's stored frames
    Timelapse {
        #[arg(short, long, help = "Camera directory holding the frames")]
        frames: PathBuf,

        #[arg(short, long, help = "Manifest output path")]
        manifest: PathBuf,

        #[arg(long, default_value = "30", help = "Frames per second")]
        fps: u32,

        #[arg(long, default_value = "jpg", help = "Frame file extension")]
        extension: String,
    },

    /// Validate configuration
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

impl Cli {
    /// Layer the global flags over a loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(pool_size) = self.pool_size {
            config.pool_size = pool_size;
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout = Duration::from_secs(timeout);
            config.connect_timeout = Duration::from_secs(timeout);
        }

        match &self.command {
            Commands::Harvest {
                url,
                only,
                exclude,
                metrics_file,
                ..
            } => {
                if let Some(url) = url {
                    config.index_url = url.clone();
                }
                if let Some(selector) = CameraSelector::from_tokens(only) {
                    config.include = Some(selector);
                }
                if let Some(selector) = CameraSelector::from_tokens(exclude) {
                    config.exclude = Some(selector);
                }
                if metrics_file.is_some() {
                    config.metrics_file = metrics_file.clone();
                }
            }
            Commands::Catalog { url: Some(url), .. } => config.index_url = url.clone(),
            _ => {}
        }
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
            Commands::Harvest { output, .. } => self.run_harvest(&output).await,
            Commands::Catalog { json, .. } => self.run_catalog(json).await,
            Commands::Timelapse {
                frames,
                manifest,
                fps,
                extension,
            } => self.run_timelapse(&frames, &manifest, fps, &extension),
            Commands::Validate { config } => self.validate_config(&config).await,
        }
    }

    pub async fn run_harvest(&self, output: &Path) -> anyhow::Result<()> {
        let started = Instant::now();
        let _guard = InstanceGuard::acquire(output)?;

        let exporter = match &self.config.metrics_file {
            Some(path) => Some(MetricsExporter::install(path)?),
            None => None,
        };
        let metrics = Arc::new(HarvestMetrics::new());

        let service = Arc::new(HarvestService::new(self.config.clone(), output)?);
        let catalog = service.fetch_catalog().await?;
        println!("Got {} indexes", catalog.len());

        let tasks = service.plan_tasks(&catalog);
        metrics.record_catalog(catalog.len(), tasks.len());
        info!(
            "{} of {} cameras selected, {} with an image",
            tasks.len(),
            catalog.len(),
            catalog.with_url_count()
        );

        let coordinator =
            FetchCoordinator::new(service, self.config.pool_size).with_metrics(metrics);
        let summary = coordinator
            .run_with(tasks, |report| println!("{report}"))
            .await;

        println!(
            "Downloaded: {}, Skipped: {}, Failed: {} ({})",
            summary.downloaded,
            summary.skipped,
            summary.failed,
            crate::format_duration(started.elapsed())
        );

        if let Some(exporter) = exporter {
            if let Err(e) = exporter.write() {
                warn!("Could not write metrics to {}: {}", exporter.path().display(), e);
            }
        }

        Ok(())
    }

    pub async fn run_catalog(&self, json: bool) -> anyhow::Result<()> {
        let client = build_http_client(&self.config)?;
        let catalog = fetch_catalog(&client, &self.config.index_url).await?;

        if json {
            println!("{}", render_catalog_json(&catalog)?);
            return Ok(());
        }

        println!("Got {} indexes", catalog.len());
        for entry in catalog.entries() {
            println!(
                "  {:>3}  {}  {}",
                entry.position,
                entry.unique_name(),
                entry.image_url.as_deref().unwrap_or("(no image)")
            );
        }

        Ok(())
    }

    pub fn run_timelapse(
        &self,
        frames_dir: &Path,
        manifest: &Path,
        fps: u32,
        extension: &str,
    ) -> anyhow::Result<()> {
        if fps == 0 {
            bail!("fps must be greater than 0");
        }

        let frames = collect_frames(frames_dir, extension)
            .with_context(|| format!("listing frames in {}", frames_dir.display()))?;
        if frames.is_empty() {
            bail!(
                "no .{} frames found in {}",
                extension.trim_start_matches('.'),
                frames_dir.display()
            );
        }

        let mut sink = ConcatManifestSink::create(manifest, fps)?;
        let summary = write_timelapse(&frames, &mut sink, fps)?;

        println!("Manifest written to: {}", manifest.display());
        println!("  Frames: {}", summary.frames);
        println!("  Skipped: {}", summary.skipped);
        println!("  Duration: {}", crate::format_duration(summary.duration));

        Ok(())
    }

    pub async fn validate_config(&self, config_path: &Path) -> anyhow::Result<()> {
        println!("Validating configuration: {}", config_path.display());

        let content = tokio::fs::read_to_string(config_path)
            .await
            .with_context(|| format!("reading {}", config_path.display()))?;
        let config = Config::from_json(&content)?;

        println!("Configuration is valid:");
        println!("  Index URL: {}", config.index_url);
        println!("  Pool size: {}", config.pool_size);
        println!("  Request timeout: {:?}", config.request_timeout);
        println!("  Connect timeout: {:?}", config.connect_timeout);
        println!("  Include: {:?}", config.include);
        println!("  Exclude: {:?}", config.exclude);

        Ok(())
    }
}

pub fn render_catalog_json(catalog: &CameraCatalog) -> anyhow::Result<String> {
    serde_json::to_string_pretty(catalog).context("serializing catalog")
}

pub fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing log subscriber: {e}"))?;

    Ok(())
}
