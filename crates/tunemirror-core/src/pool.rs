//! Bounded worker pool for encoding jobs.
//!
//! Jobs are blocking closures (they wait on an external encoder) executed on
//! a dedicated Tokio runtime. A semaphore bounds how many run at once. Every
//! failure is sent over one channel to a single drain task that hands it to
//! the warning hook, so warnings are reported one at a time even though jobs
//! finish in any order.
//!
//! When the warning hook returns an error the pool records it as the quit
//! error and raises the abort flag. Jobs that have not started yet are then
//! skipped; running jobs always finish, and their failures still reach the
//! hook, whose verdict no longer matters.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Configuration for a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of jobs running at once.
    pub concurrency: usize,
    /// Name prefix for pool threads.
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            thread_name_prefix: "tunemirror-worker".to_string(),
        }
    }
}

impl PoolConfig {
    /// Configuration with the given concurrency.
    #[must_use]
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Self::default()
        }
    }
}

/// Number of available CPUs, at least 1.
#[must_use]
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// Outcome of all jobs submitted to a pool.
#[derive(Debug, Default)]
pub struct PoolReport {
    /// Jobs that finished successfully.
    pub completed: usize,
    /// Jobs that returned an error or panicked.
    pub failed: usize,
    /// Jobs that never started because the pool was aborted.
    pub skipped: usize,
    /// Error returned by the warning hook, if it stopped the run.
    pub quit: Option<Error>,
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

/// Runs blocking jobs with bounded concurrency and serialized error handling.
pub struct WorkerPool {
    runtime: Runtime,
    permits: Arc<Semaphore>,
    jobs: JoinSet<()>,
    errors: Option<mpsc::UnboundedSender<Error>>,
    drain: Option<JoinHandle<()>>,
    aborted: Arc<AtomicBool>,
    quit: Arc<Mutex<Option<Error>>>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("available_permits", &self.permits.available_permits())
            .field("pending", &self.jobs.len())
            .field("aborted", &self.is_aborted())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Start a pool whose job failures are passed to `warn`.
    ///
    /// `warn` is only ever called from the pool's drain task, one error at a
    /// time. Returning `Err` from it aborts the pool.
    ///
    /// The pool owns its runtime and blocks on it, so it cannot be started
    /// from inside another Tokio runtime; that is reported as
    /// [`Error::Internal`]. Use `spawn_blocking` to plan from async code.
    pub fn new<W>(config: PoolConfig, warn: W) -> Result<Self>
    where
        W: Fn(Error) -> Result<()> + Send + 'static,
    {
        if config.concurrency == 0 {
            return Err(Error::Configuration(
                "Concurrency must be at least 1".to_string(),
            ));
        }
        if Handle::try_current().is_ok() {
            return Err(Error::Internal(
                "Worker pool cannot be started from inside a Tokio runtime".to_string(),
            ));
        }
        info!("Starting worker pool with {} workers", config.concurrency);

        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .max_blocking_threads(config.concurrency)
            .thread_name(config.thread_name_prefix)
            .enable_all()
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to start worker pool: {e}")))?;

        let (errors, mut rx) = mpsc::unbounded_channel::<Error>();
        let aborted = Arc::new(AtomicBool::new(false));
        let quit = Arc::new(Mutex::new(None));

        let drain = {
            let aborted = Arc::clone(&aborted);
            let quit = Arc::clone(&quit);
            runtime.spawn(async move {
                while let Some(err) = rx.recv().await {
                    let was_aborted = aborted.load(Ordering::Acquire);
                    match warn(err) {
                        Ok(()) => {}
                        Err(fatal) if was_aborted => {
                            warn!("Job failed after abort: {}", fatal);
                        }
                        Err(fatal) => {
                            error!("Aborting: {}", fatal);
                            *quit.lock().unwrap_or_else(PoisonError::into_inner) = Some(fatal);
                            aborted.store(true, Ordering::Release);
                        }
                    }
                }
                debug!("Error drain finished");
            })
        };

        Ok(Self {
            runtime,
            permits: Arc::new(Semaphore::new(config.concurrency)),
            jobs: JoinSet::new(),
            errors: Some(errors),
            drain: Some(drain),
            aborted,
            quit,
            counters: Arc::new(Counters::default()),
        })
    }

    /// Queue a job. Returns immediately.
    pub fn submit<F>(&mut self, job: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let Some(errors) = self.errors.clone() else {
            return;
        };
        let permits = Arc::clone(&self.permits);
        let aborted = Arc::clone(&self.aborted);
        let counters = Arc::clone(&self.counters);

        self.jobs.spawn_on(
            async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                if aborted.load(Ordering::Acquire) {
                    counters.skipped.fetch_add(1, Ordering::Relaxed);
                    return;
                }

                let failure = match tokio::task::spawn_blocking(job).await {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e),
                    Err(e) => Some(Error::Internal(format!("Job panicked: {e}"))),
                };
                match failure {
                    None => {
                        counters.completed.fetch_add(1, Ordering::Relaxed);
                    }
                    Some(e) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        if errors.send(e).is_err() {
                            warn!("Error drain is gone, dropping job failure");
                        }
                    }
                }
            },
            self.runtime.handle(),
        );
    }

    /// Skip every job that has not started yet.
    pub fn abort(&self) {
        if !self.aborted.swap(true, Ordering::AcqRel) {
            info!("Worker pool aborted, queued jobs will be skipped");
        }
    }

    /// Whether the run has been stopped.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Block until every submitted job has finished.
    pub fn wait(&mut self) {
        let jobs = &mut self.jobs;
        self.runtime.block_on(async {
            while let Some(res) = jobs.join_next().await {
                if let Err(e) = res {
                    error!("Job wrapper failed: {}", e);
                }
            }
        });
    }

    /// Wait for all jobs, drain remaining errors and release the pool.
    pub fn close(mut self) -> PoolReport {
        self.wait();

        // All job-side senders are gone once the jobs finished.
        self.errors.take();
        if let Some(drain) = self.drain.take()
            && let Err(e) = self.runtime.block_on(drain)
        {
            error!("Error drain failed: {}", e);
        }

        let report = PoolReport {
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            quit: self
                .quit
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        };
        info!(
            "Worker pool closed: {} completed, {} failed, {} skipped",
            report.completed, report.failed, report.skipped
        );
        report
    }
}
