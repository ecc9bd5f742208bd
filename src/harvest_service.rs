//! Harvest service driving the per-camera pipeline
//!
//! `HarvestService` owns the HTTP client, the frame fetcher and the
//! storage root. It fetches the index page once per run and takes every
//! camera task through fetch, verification and deduplication, turning
//! whatever happens into a terminal [`FetchOutcome`].

use crate::{
    build_http_client, frame_filename, select_tasks, verify_image, CameraCatalog, Config,
    DedupStore, ErrorKind, ExtensionMap, FetchTask, FetchedImage, HarvestError,
    HttpImageFetcher, ImageFetcher, IndexParser, StoreDecision,
};
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

/// Lifecycle of one camera task. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Fetching,
    Verifying,
    Deduplicating,
    Downloaded,
    Skipped,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Downloaded | TaskState::Skipped | TaskState::Failed
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskState::Pending => "pending",
            TaskState::Fetching => "fetching",
            TaskState::Verifying => "verifying",
            TaskState::Deduplicating => "deduplicating",
            TaskState::Downloaded => "downloaded",
            TaskState::Skipped => "skipped",
            TaskState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// New frame stored under this filename
    Downloaded(String),
    /// Identical to this latest stored frame
    Skipped(String),
    Failed { kind: ErrorKind, detail: String },
}

impl FetchOutcome {
    pub fn failed(error: &HarvestError) -> Self {
        FetchOutcome::Failed {
            kind: error.kind(),
            detail: error.to_string(),
        }
    }

    pub fn state(&self) -> TaskState {
        match self {
            FetchOutcome::Downloaded(_) => TaskState::Downloaded,
            FetchOutcome::Skipped(_) => TaskState::Skipped,
            FetchOutcome::Failed { .. } => TaskState::Failed,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FetchOutcome::Failed { .. })
    }
}

impl std::fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchOutcome::Downloaded(filename) => write!(f, "Downloaded as: {filename}"),
            FetchOutcome::Skipped(latest) => write!(f, "Not Downloaded. Latest Image: {latest}"),
            FetchOutcome::Failed { detail, .. } => write!(f, "Error: {detail}"),
        }
    }
}

/// Terminal result of one camera task.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub unique_name: String,
    pub outcome: FetchOutcome,
    pub elapsed: Duration,
}

impl TaskReport {
    pub fn is_failure(&self) -> bool {
        self.outcome.is_failure()
    }
}

impl std::fmt::Display for TaskReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.unique_name, self.outcome)
    }
}

pub struct HarvestService {
    config: Config,
    client: Client,
    fetcher: Arc<dyn ImageFetcher>,
    store: DedupStore,
}

impl HarvestService {
    pub fn new(config: Config, output_dir: impl Into<PathBuf>) -> Result<Self, HarvestError> {
        let client = build_http_client(&config)?;
        // Resolved once here; workers only read it.
        let extensions = Arc::new(ExtensionMap::new());
        let fetcher = Arc::new(HttpImageFetcher::new(client.clone(), extensions));
        Ok(Self::with_fetcher(config, output_dir, client, fetcher))
    }

    pub fn with_fetcher(
        config: Config,
        output_dir: impl Into<PathBuf>,
        client: Client,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Self {
        Self {
            config,
            client,
            fetcher,
            store: DedupStore::new(output_dir),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &DedupStore {
        &self.store
    }

    /// Fetch and parse the index page. Any failure here is fatal to the run.
    pub async fn fetch_catalog(&self) -> Result<CameraCatalog, HarvestError> {
        fetch_catalog(&self.client, &self.config.index_url).await
    }

    /// Tasks for this run, after the configured include/exclude filters.
    pub fn plan_tasks(&self, catalog: &CameraCatalog) -> Vec<FetchTask> {
        select_tasks(
            catalog,
            self.config.include.as_ref(),
            self.config.exclude.as_ref(),
        )
    }

    /// Run one camera through fetch, verify and deduplicate. Never fails:
    /// errors become a `Failed` outcome.
    pub async fn process_task(&self, task: &FetchTask) -> TaskReport {
        let started = Instant::now();
        debug!(camera = %task.unique_name, state = %TaskState::Pending, url = %task.url, "Task state");

        let outcome = match self.run_pipeline(task).await {
            Ok(StoreDecision::Stored(filename)) => FetchOutcome::Downloaded(filename),
            Ok(StoreDecision::Duplicate(latest)) => FetchOutcome::Skipped(latest),
            Err(e) => FetchOutcome::failed(&e),
        };

        debug!(camera = %task.unique_name, state = %outcome.state(), "Task state");
        TaskReport {
            unique_name: task.unique_name.clone(),
            outcome,
            elapsed: started.elapsed(),
        }
    }

    async fn run_pipeline(&self, task: &FetchTask) -> Result<StoreDecision, HarvestError> {
        debug!(camera = %task.unique_name, state = %TaskState::Fetching, "Task state");
        let image = self.fetcher.fetch(&task.url).await?;

        let store = self.store.clone();
        let unique_name = task.unique_name.clone();
        tokio::task::spawn_blocking(move || store_frame(&store, &unique_name, image))
            .await
            .map_err(|e| HarvestError::TaskPanicked(e.to_string()))?
    }
}

pub async fn fetch_catalog(client: &Client, index_url: &str) -> Result<CameraCatalog, HarvestError> {
    let base = Url::parse(index_url)
        .map_err(|e| HarvestError::IndexFetchFailure(format!("{index_url}: {e}")))?;

    info!("Querying index page: {}", index_url);
    let response = client
        .get(base.clone())
        .send()
        .await
        .map_err(|e| HarvestError::IndexFetchFailure(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(HarvestError::IndexFetchFailure(format!(
            "{index_url} returned status {}",
            status.as_u16()
        )));
    }

    // Relative image links resolve against the page actually served.
    let final_url = response.url().clone();
    if final_url != base {
        debug!("Index page redirected to {}", final_url);
    }

    let html = response
        .text()
        .await
        .map_err(|e| HarvestError::IndexFetchFailure(e.to_string()))?;

    Ok(IndexParser::new()?.parse(&html, &final_url))
}

/// Local half of the pipeline: stage, verify, deduplicate. The staged file
/// is removed on every path that does not persist it.
fn store_frame(
    store: &DedupStore,
    unique_name: &str,
    image: FetchedImage,
) -> Result<StoreDecision, HarvestError> {
    let dir = store.ensure_camera_dir(unique_name)?;
    let staged = store.stage(&dir, &image.data)?;

    debug!(camera = %unique_name, state = %TaskState::Verifying, "Task state");
    verify_image(staged.path())?;

    debug!(camera = %unique_name, state = %TaskState::Deduplicating, "Task state");
    let filename = frame_filename(&image.captured_at, image.extension);
    store.deduplicate(&dir, staged, &filename)
}
