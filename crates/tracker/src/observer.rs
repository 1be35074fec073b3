//! Per-job callbacks.
//!
//! Callbacks run synchronously on the poll task while the job's delivery
//! lock is held, so they must be quick. Calling
//! [`JobTracker::stop`](crate::JobTracker::stop) or
//! [`JobTracker::dismiss`](crate::JobTracker::dismiss) from inside a
//! callback is allowed, for the callback's own job or any other. From
//! there `stop` does not wait for the other job's running callback to
//! return.

use studio_core::{Job, JobError, JobResult};

/// Receives the lifecycle of one tracked job.
///
/// `on_success` and `on_error` are mutually exclusive and fire at most
/// once. After the job is stopped none of the methods fire again.
pub trait JobObserver: Send + Sync {
    /// A non-terminal status was received.
    fn on_tick(&self, _job: &Job) {}

    fn on_success(&self, _result: &JobResult) {}

    fn on_error(&self, _job_id: &str, _error: &JobError) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl JobObserver for NoopObserver {}

type TickFn = Box<dyn Fn(&Job) + Send + Sync>;
type SuccessFn = Box<dyn Fn(&JobResult) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&str, &JobError) + Send + Sync>;

/// Closure-based observer.
///
/// ```rust
/// use studio_tracker::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .on_success(|result| println!("{} finished", result.job_id))
///     .on_error(|job_id, error| eprintln!("{job_id}: {}", error.user_message()));
/// ```
#[derive(Default)]
pub struct Callbacks {
    tick: Option<TickFn>,
    success: Option<SuccessFn>,
    error: Option<ErrorFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_tick(mut self, f: impl Fn(&Job) + Send + Sync + 'static) -> Self {
        self.tick = Some(Box::new(f));
        self
    }

    pub fn on_success(mut self, f: impl Fn(&JobResult) + Send + Sync + 'static) -> Self {
        self.success = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&str, &JobError) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}

impl JobObserver for Callbacks {
    fn on_tick(&self, job: &Job) {
        if let Some(f) = &self.tick {
            f(job);
        }
    }

    fn on_success(&self, result: &JobResult) {
        if let Some(f) = &self.success {
            f(result);
        }
    }

    fn on_error(&self, job_id: &str, error: &JobError) {
        if let Some(f) = &self.error {
            f(job_id, error);
        }
    }
}
