use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Events emitted while sheet jobs are encoded.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted { jobs: usize },
    JobStarted { index: usize },
    JobFinished { index: usize, records: usize, warnings: usize },
    JobFailed { index: usize, error: String },
    RunFinished {
        elapsed: Duration,
        metrics: ExecutionMetricsSnapshot,
    },
}

/// Observer hook for execution events.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// Forwards execution events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingExecutionObserver;

impl ExecutionObserver for TracingExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::RunStarted { jobs } => tracing::info!(jobs, "encoding sheet jobs"),
            ExecutionEvent::JobStarted { index } => tracing::trace!(index, "job started"),
            ExecutionEvent::JobFinished {
                index,
                records,
                warnings,
            } => tracing::debug!(index, records, warnings, "job finished"),
            ExecutionEvent::JobFailed { index, error } => tracing::warn!(index, %error, "job failed"),
            ExecutionEvent::RunFinished { elapsed, metrics } => {
                tracing::info!(elapsed = ?elapsed, %metrics, "sheet jobs encoded")
            }
        }
    }
}

/// Real-time metrics for an execution run.
///
/// The engine updates these counters during execution; callers can snapshot them at any time.
pub struct ExecutionMetrics {
    run_id: AtomicU64,
    elapsed_ns: AtomicU64,

    jobs_started: AtomicU64,
    jobs_finished: AtomicU64,
    jobs_failed: AtomicU64,
    records_encoded: AtomicU64,
    warnings: AtomicU64,

    active_jobs: AtomicUsize,
    max_active_jobs: AtomicUsize,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            run_id: AtomicU64::new(0),
            elapsed_ns: AtomicU64::new(0),
            jobs_started: AtomicU64::new(0),
            jobs_finished: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            records_encoded: AtomicU64::new(0),
            warnings: AtomicU64::new(0),
            active_jobs: AtomicUsize::new(0),
            max_active_jobs: AtomicUsize::new(0),
        }
    }

    pub fn begin_run(&self) {
        let _ = self.run_id.fetch_add(1, Ordering::SeqCst);
        self.elapsed_ns.store(0, Ordering::SeqCst);
        self.jobs_started.store(0, Ordering::SeqCst);
        self.jobs_finished.store(0, Ordering::SeqCst);
        self.jobs_failed.store(0, Ordering::SeqCst);
        self.records_encoded.store(0, Ordering::SeqCst);
        self.warnings.store(0, Ordering::SeqCst);
        self.active_jobs.store(0, Ordering::SeqCst);
        self.max_active_jobs.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns
            .store(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }

    pub fn on_job_start(&self) {
        let _ = self.jobs_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_jobs.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active_jobs, now);
    }

    pub fn on_job_end(&self, records: usize, warnings: usize) {
        let _ = self.jobs_finished.fetch_add(1, Ordering::SeqCst);
        let _ = self.records_encoded.fetch_add(records as u64, Ordering::SeqCst);
        let _ = self.warnings.fetch_add(warnings as u64, Ordering::SeqCst);
        let _ = self.active_jobs.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_job_failed(&self) {
        let _ = self.jobs_failed.fetch_add(1, Ordering::SeqCst);
        let _ = self.active_jobs.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        ExecutionMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            elapsed: (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns)),
            jobs_started: self.jobs_started.load(Ordering::SeqCst),
            jobs_finished: self.jobs_finished.load(Ordering::SeqCst),
            jobs_failed: self.jobs_failed.load(Ordering::SeqCst),
            records_encoded: self.records_encoded.load(Ordering::SeqCst),
            warnings: self.warnings.load(Ordering::SeqCst),
            max_active_jobs: self.max_active_jobs.load(Ordering::SeqCst),
        }
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    let _ = dst.fetch_max(now, Ordering::SeqCst);
}

/// Immutable snapshot of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub run_id: u64,
    pub elapsed: Option<Duration>,
    pub jobs_started: u64,
    pub jobs_finished: u64,
    pub jobs_failed: u64,
    pub records_encoded: u64,
    pub warnings: u64,
    pub max_active_jobs: usize,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, jobs={}/{}, failed={}, records={}, warnings={}, max_active_jobs={}, elapsed={:?}",
            self.run_id,
            self.jobs_finished,
            self.jobs_started,
            self.jobs_failed,
            self.records_encoded,
            self.warnings,
            self.max_active_jobs,
            self.elapsed
        )
    }
}
