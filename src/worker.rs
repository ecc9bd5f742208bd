use crate::{FetchOutcome, FetchTask, HarvestError, HarvestMetrics, HarvestService, TaskReport};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

pub struct FetchWorker {
    id: usize,
    service: Arc<HarvestService>,
    is_running: Arc<std::sync::atomic::AtomicBool>,
    processed_count: Arc<std::sync::atomic::AtomicUsize>,
    error_count: Arc<std::sync::atomic::AtomicUsize>,
}

impl FetchWorker {
    pub fn new(id: usize, service: Arc<HarvestService>) -> Self {
        Self {
            id,
            service,
            is_running: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            processed_count: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            error_count: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        }
    }

    pub async fn run_with_shared_receiver(
        &self,
        tasks: Arc<Mutex<mpsc::Receiver<FetchTask>>>,
        results: mpsc::Sender<TaskReport>,
    ) {
        debug!("Starting fetch worker {}", self.id);
        self.is_running.store(true, std::sync::atomic::Ordering::Relaxed);

        loop {
            let task = {
                let mut receiver = tasks.lock().await;
                receiver.recv().await
            };

            let Some(task) = task else { break };
            let report = self.process_task(task).await;

            if report.is_failure() {
                self.error_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                warn!("Worker {} failed {}: {}", self.id, report.unique_name, report.outcome);
            } else {
                self.processed_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                debug!("Worker {} finished {}", self.id, report.unique_name);
            }

            if let Err(e) = results.send(report).await {
                error!("Worker {} failed to send result: {}", self.id, e);
                break;
            }
        }

        self.is_running.store(false, std::sync::atomic::Ordering::Relaxed);
        debug!("Fetch worker {} stopped", self.id);
    }

    /// A panic inside one task is folded into that task's outcome.
    async fn process_task(&self, task: FetchTask) -> TaskReport {
        let started = std::time::Instant::now();

        match AssertUnwindSafe(self.service.process_task(&task))
            .catch_unwind()
            .await
        {
            Ok(report) => report,
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!("Worker {} panicked on {}: {}", self.id, task.unique_name, detail);

                TaskReport {
                    unique_name: task.unique_name,
                    outcome: FetchOutcome::failed(&HarvestError::TaskPanicked(detail)),
                    elapsed: started.elapsed(),
                }
            }
        }
    }

    pub fn get_stats(&self) -> WorkerStats {
        WorkerStats {
            id: self.id,
            is_running: self.is_running.load(std::sync::atomic::Ordering::Relaxed),
            processed_count: self.processed_count.load(std::sync::atomic::Ordering::Relaxed),
            error_count: self.error_count.load(std::sync::atomic::Ordering::Relaxed),
        }
    }
}

impl Clone for FetchWorker {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            service: self.service.clone(),
            is_running: self.is_running.clone(),
            processed_count: self.processed_count.clone(),
            error_count: self.error_count.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub id: usize,
    pub is_running: bool,
    pub processed_count: usize,
    pub error_count: usize,
}

/// Aggregate of one run, reports in completion order.
#[derive(Debug, Clone, Default)]
pub struct HarvestSummary {
    pub reports: Vec<TaskReport>,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl HarvestSummary {
    fn push(&mut self, report: TaskReport) {
        match report.outcome {
            FetchOutcome::Downloaded(_) => self.downloaded += 1,
            FetchOutcome::Skipped(_) => self.skipped += 1,
            FetchOutcome::Failed { .. } => self.failed += 1,
        }
        self.reports.push(report);
    }

    pub fn total(&self) -> usize {
        self.reports.len()
    }

    pub fn report_for(&self, unique_name: &str) -> Option<&TaskReport> {
        self.reports.iter().find(|r| r.unique_name == unique_name)
    }
}

/// Fans tasks out over a bounded pool of workers sharing one queue.
pub struct FetchCoordinator {
    service: Arc<HarvestService>,
    pool_size: usize,
    metrics: Option<Arc<HarvestMetrics>>,
}

impl FetchCoordinator {
    pub fn new(service: Arc<HarvestService>, pool_size: usize) -> Self {
        Self {
            service,
            pool_size,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<HarvestMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn run(&self, tasks: Vec<FetchTask>) -> HarvestSummary {
        self.run_with(tasks, |_| {}).await
    }

    /// Execute every task once. `on_complete` sees each report as soon as
    /// its task finishes, so the order is completion order.
    pub async fn run_with<F>(&self, tasks: Vec<FetchTask>, mut on_complete: F) -> HarvestSummary
    where
        F: FnMut(&TaskReport),
    {
        let mut summary = HarvestSummary::default();
        let total = tasks.len();
        if total == 0 {
            return summary;
        }

        let worker_count = self.pool_size.min(total).max(1);
        info!("Processing {} cameras with {} workers", total, worker_count);

        let (task_sender, task_receiver) = mpsc::channel(total);
        let (result_sender, mut result_receiver) = mpsc::channel(total);

        for task in tasks {
            if let Err(e) = task_sender.send(task).await {
                error!("Failed to queue task: {}", e);
            }
        }
        // Workers stop once the queue drains.
        drop(task_sender);

        let shared_receiver = Arc::new(Mutex::new(task_receiver));
        let mut workers = Vec::with_capacity(worker_count);
        let mut handles = WorkerHandles(Vec::with_capacity(worker_count));
        for id in 0..worker_count {
            let worker = FetchWorker::new(id, self.service.clone());
            let handle = worker.clone();
            let rx = shared_receiver.clone();
            let tx = result_sender.clone();
            handles.0.push(tokio::spawn(async move {
                handle.run_with_shared_receiver(rx, tx).await;
            }));
            workers.push(worker);
        }
        drop(result_sender);

        let tracker = ProgressTracker::new(total);
        while let Some(report) = result_receiver.recv().await {
            tracker.record_completion(!report.is_failure());
            if let Some(metrics) = &self.metrics {
                metrics.record_report(&report);
            }
            on_complete(&report);
            summary.push(report);

            let progress = tracker.get_progress();
            debug!(
                "Progress: {}/{} - Success: {}, Errors: {}",
                progress.completed, progress.total, progress.success, progress.errors
            );
        }

        // Every sender is gone, so the workers have left their loops.
        for handle in std::mem::take(&mut handles.0) {
            if let Err(e) = handle.await {
                warn!("Worker task ended abnormally: {}", e);
            }
        }

        let stats: Vec<WorkerStats> = workers.iter().map(|w| w.get_stats()).collect();
        debug!(?stats, "Workers finished");
        info!(
            "Harvest completed. Downloaded: {}, Skipped: {}, Failed: {}",
            summary.downloaded, summary.skipped, summary.failed
        );

        summary
    }
}

/// Aborts still-running workers when a run is dropped before it finishes,
/// e.g. on shutdown. A frame already handed to the blocking pool completes
/// its local store step; its staged file is cleaned up either way.
struct WorkerHandles(Vec<tokio::task::JoinHandle<()>>);

impl Drop for WorkerHandles {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

pub struct ProgressTracker {
    total: usize,
    completed: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    errors: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    start_time: std::time::Instant,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            errors: std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn record_completion(&self, success: bool) {
        self.completed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if !success {
            self.errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    }

    pub fn get_progress(&self) -> ProgressInfo {
        let completed = self.completed.load(std::sync::atomic::Ordering::Relaxed);
        let errors = self.errors.load(std::sync::atomic::Ordering::Relaxed);
        let elapsed = self.start_time.elapsed();

        ProgressInfo {
            total: self.total,
            completed,
            errors,
            success: completed - errors,
            elapsed,
            percent: if self.total > 0 {
                completed as f64 / self.total as f64 * 100.0
            } else {
                100.0
            },
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(std::sync::atomic::Ordering::Relaxed) >= self.total
    }
}

#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub total: usize,
    pub completed: usize,
    pub errors: usize,
    pub success: usize,
    pub elapsed: Duration,
    pub percent: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_tracker() {
        let tracker = ProgressTracker::new(10);
        assert!(!tracker.is_complete());

        for i in 0..10 {
            tracker.record_completion(i % 5 != 0);
        }

        let progress = tracker.get_progress();
        assert!(tracker.is_complete());
        assert_eq!(progress.completed, 10);
        assert_eq!(progress.errors, 2);
        assert_eq!(progress.success, 8);
        assert_eq!(progress.percent, 100.0);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = HarvestSummary::default();
        for (name, outcome) in [
            ("000.A", FetchOutcome::Downloaded("1.jpg".to_string())),
            ("001.B", FetchOutcome::Skipped("0.jpg".to_string())),
            ("002.C", FetchOutcome::failed(&HarvestError::HttpStatus(500))),
        ] {
            summary.push(TaskReport {
                unique_name: name.to_string(),
                outcome,
                elapsed: Duration::ZERO,
            });
        }

        assert_eq!(summary.total(), 3);
        assert_eq!((summary.downloaded, summary.skipped, summary.failed), (1, 1, 1));
        assert!(summary.report_for("002.C").unwrap().is_failure());
        assert!(summary.report_for("003.D").is_none());
    }
}
