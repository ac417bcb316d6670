//! Execution engine for encoding sheet jobs with configurable parallelism.
//!
//! Each job owns its sheet and produces an independent record list, so jobs run on a rayon
//! pool; results are returned in job order. The engine provides:
//!
//! - Parallel execution over a slice of jobs
//! - Real-time metrics + observer hooks for monitoring

mod observer;

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;

use crate::encoder::Record;
use crate::error::HwdbResult;

pub use observer::{
    ExecutionEvent, ExecutionMetrics, ExecutionMetricsSnapshot, ExecutionObserver, TracingExecutionObserver,
};

/// Configuration for the [`ExecutionEngine`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Number of worker threads used by the engine.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
}

/// Runs sheet jobs on a dedicated thread pool.
pub struct ExecutionEngine {
    pool: ThreadPool,
    observer: Option<Arc<dyn ExecutionObserver>>,
    metrics: Arc<ExecutionMetrics>,
}

impl ExecutionEngine {
    /// Create a new engine with the given options.
    pub fn new(opts: ExecutionOptions) -> HwdbResult<Self> {
        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);

        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("hwdb-job-{i}"))
            .build()?;

        Ok(Self {
            pool,
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        })
    }

    /// Attach an observer for execution events (metrics/logging).
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Get a handle to real-time execution metrics.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run `encode` over every job in parallel.
    ///
    /// Output is in job order. If any job fails, the error of the first failing job (by job
    /// order) is returned and no output is produced.
    pub fn run_jobs<J, F>(&self, jobs: &[J], encode: F) -> HwdbResult<Vec<Vec<Record>>>
    where
        J: Sync,
        F: Fn(&J) -> HwdbResult<Vec<Record>> + Send + Sync,
    {
        self.pool.install(|| {
            let start = Instant::now();
            self.metrics.begin_run();
            self.emit(ExecutionEvent::RunStarted { jobs: jobs.len() });

            let results: Vec<HwdbResult<Vec<Record>>> = jobs
                .par_iter()
                .enumerate()
                .map(|(index, job)| {
                    self.metrics.on_job_start();
                    self.emit(ExecutionEvent::JobStarted { index });

                    let result = encode(job);
                    match &result {
                        Ok(records) => {
                            let warnings = records.iter().map(|r| r.warnings.len()).sum();
                            self.metrics.on_job_end(records.len(), warnings);
                            self.emit(ExecutionEvent::JobFinished {
                                index,
                                records: records.len(),
                                warnings,
                            });
                        }
                        Err(e) => {
                            self.metrics.on_job_failed();
                            self.emit(ExecutionEvent::JobFailed {
                                index,
                                error: e.to_string(),
                            });
                        }
                    }
                    result
                })
                .collect();

            self.metrics.end_run(start.elapsed());
            self.emit(ExecutionEvent::RunFinished {
                elapsed: start.elapsed(),
                metrics: self.metrics.snapshot(),
            });

            results.into_iter().collect()
        })
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}
