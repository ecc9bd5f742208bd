use crate::{FetchOutcome, HarvestError, TaskReport};
use metrics::{register_counter, register_gauge, register_histogram, Counter, Gauge, Histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct HarvestMetrics {
    pub frames_downloaded: Counter,
    pub frames_skipped: Counter,
    pub task_duration: Histogram,
    pub cameras_in_catalog: Gauge,
    pub tasks_planned: Gauge,
}

impl HarvestMetrics {
    /// Handles bound to the installed recorder, or no-ops if none is.
    pub fn new() -> Self {
        Self {
            frames_downloaded: register_counter!("webcam_frames_downloaded_total"),
            frames_skipped: register_counter!("webcam_frames_skipped_total"),
            task_duration: register_histogram!("webcam_task_duration_seconds"),
            cameras_in_catalog: register_gauge!("webcam_catalog_cameras"),
            tasks_planned: register_gauge!("webcam_tasks_planned"),
        }
    }

    pub fn noop() -> Self {
        Self {
            frames_downloaded: Counter::noop(),
            frames_skipped: Counter::noop(),
            task_duration: Histogram::noop(),
            cameras_in_catalog: Gauge::noop(),
            tasks_planned: Gauge::noop(),
        }
    }

    pub fn record_report(&self, report: &TaskReport) {
        match &report.outcome {
            FetchOutcome::Downloaded(_) => self.frames_downloaded.increment(1),
            FetchOutcome::Skipped(_) => self.frames_skipped.increment(1),
            FetchOutcome::Failed { kind, .. } => {
                register_counter!("webcam_frames_failed_total", "kind" => kind.to_string())
                    .increment(1);
            }
        }

        self.task_duration.record(report.elapsed.as_secs_f64());
    }

    pub fn record_catalog(&self, cameras: usize, planned: usize) {
        self.cameras_in_catalog.set(cameras as f64);
        self.tasks_planned.set(planned as f64);
    }
}

impl Default for HarvestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders the process-wide recorder into a Prometheus textfile once the
/// run is over, for a node exporter to pick up.
pub struct MetricsExporter {
    handle: PrometheusHandle,
    path: PathBuf,
}

impl MetricsExporter {
    /// Install the Prometheus recorder. Only one recorder can exist per
    /// process, so this fails on a second call.
    pub fn install(path: impl Into<PathBuf>) -> Result<Self, HarvestError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| HarvestError::ConfigurationError(format!("metrics recorder: {e}")))?;

        let path = path.into();
        info!("Metrics will be written to {}", path.display());
        Ok(Self { handle, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Replace the textfile in one rename so scrapers never see a partial file.
    pub fn write(&self) -> Result<(), HarvestError> {
        let rendered = self.render();
        write_textfile(&self.path, &rendered)?;
        debug!("Wrote {} bytes of metrics", rendered.len());
        Ok(())
    }
}

fn write_textfile(path: &Path, contents: &str) -> Result<(), HarvestError> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    std::fs::write(&temp, contents).map_err(|e| {
        HarvestError::FilesystemError(format!("writing {}: {e}", temp.display()))
    })?;
    std::fs::rename(&temp, path).map_err(|e| {
        crate::silent_remove(&temp);
        HarvestError::FilesystemError(format!("replacing {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_noop_metrics_accept_every_outcome() {
        let metrics = HarvestMetrics::noop();
        for outcome in [
            FetchOutcome::Downloaded("a.jpg".to_string()),
            FetchOutcome::Skipped("a.jpg".to_string()),
            FetchOutcome::failed(&HarvestError::HttpStatus(503)),
        ] {
            metrics.record_report(&TaskReport {
                unique_name: "000.Port".to_string(),
                outcome,
                elapsed: Duration::from_millis(120),
            });
        }
        metrics.record_catalog(12, 4);
    }

    #[test]
    fn test_write_textfile_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.prom");
        std::fs::write(&path, "stale").unwrap();

        write_textfile(&path, "webcam_frames_downloaded_total 3\n").unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "webcam_frames_downloaded_total 3\n"
        );
        assert!(!dir.path().join("harvest.prom.tmp").exists());
    }
}
