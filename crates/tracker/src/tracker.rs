//! Process-wide registry of tracked jobs.
//!
//! [`JobTracker`] owns one entry per job id and one Tokio task per job
//! that is still being polled (sleep -> request -> reduce -> deliver). It
//! exposes start/stop/dismiss operations, read-only snapshots, and a
//! [`tokio::sync::broadcast`] stream of [`JobEvent`]s.
//!
//! Only the poll tasks write job status. Each entry carries a delivery
//! gate: a closed flag that the task re-checks before touching the entry
//! and before every callback, plus a lock held for the whole delivery.
//! [`JobTracker::stop`] sets the flag and, unless it is itself running
//! inside a delivery, waits on the lock. Once `stop` returns no new
//! callback starts for that job, even if a status request was already in
//! flight.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use studio_core::transport::{JobHandle, JobSubmitter, StatusSource, SubmitPayload};
use studio_core::{
    Job, JobError, JobEvent, JobId, JobKind, PollState, ResultConsumer,
};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::observer::JobObserver;
use crate::options::PollOptions;
use crate::poller::{JobPoller, PollOutcome, Step};

/// Broadcast channel capacity for job events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long [`JobTracker::shutdown`] waits for each poll task to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Tracks any number of concurrently polled jobs.
///
/// Cheap to clone; all clones share the same registry. Construct one per
/// application (or per test) and pass it to whoever needs it.
#[derive(Clone)]
pub struct JobTracker {
    inner: Arc<Inner>,
}

struct Inner {
    jobs: RwLock<HashMap<JobId, TrackedEntry>>,
    source: Arc<dyn StatusSource>,
    consumers: RwLock<Vec<Arc<dyn ResultConsumer>>>,
    event_tx: broadcast::Sender<JobEvent>,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
    next_generation: AtomicU64,
}

/// Internal bookkeeping for a single job.
struct TrackedEntry {
    job: Job,
    /// Distinguishes this entry from earlier loops for the same id.
    generation: u64,
    gate: Arc<DeliveryGate>,
    /// Per-job cancellation token (child of the master token).
    cancel: CancellationToken,
    task: Option<tokio::task::JoinHandle<()>>,
    outcome_tx: Arc<watch::Sender<Option<PollOutcome>>>,
    handle: TrackedJob,
}

/// Closed once a job is stopped or has delivered its terminal outcome.
struct DeliveryGate {
    closed: AtomicBool,
    /// Held by the poll task for the duration of one delivery.
    delivering: Mutex<()>,
}

impl DeliveryGate {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            delivering: Mutex::new(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the gate. Returns `false` if it was already closed.
    fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Block until no delivery is running.
    ///
    /// Never called from inside a delivery: a thread holding one gate must
    /// not wait on another.
    fn wait_idle(&self) {
        drop(self.delivering.lock());
    }
}

thread_local! {
    /// Number of deliveries running on this thread (callbacks may nest).
    static DELIVERY_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as running callbacks until dropped.
struct DeliveryScope;

impl DeliveryScope {
    fn enter() -> Self {
        DELIVERY_DEPTH.with(|depth| depth.set(depth.get() + 1));
        DeliveryScope
    }

    fn is_active() -> bool {
        DELIVERY_DEPTH.with(|depth| depth.get() > 0)
    }
}

impl Drop for DeliveryScope {
    fn drop(&mut self) {
        DELIVERY_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Caller-side handle to a tracked job.
#[derive(Debug, Clone)]
pub struct TrackedJob {
    job_id: JobId,
    kind: JobKind,
    outcome: watch::Receiver<Option<PollOutcome>>,
}

impl TrackedJob {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// The outcome, if the loop has already ended.
    pub fn try_outcome(&self) -> Option<PollOutcome> {
        self.outcome.borrow().clone()
    }

    /// Wait for the loop to end.
    ///
    /// Resolves to [`PollOutcome::Cancelled`] if the job is stopped or the
    /// tracker is shut down.
    pub async fn outcome(&self) -> PollOutcome {
        let mut rx = self.outcome.clone();
        let result = rx.wait_for(Option::is_some).await.map(|v| v.clone());
        match result {
            Ok(Some(outcome)) => outcome,
            _ => PollOutcome::Cancelled,
        }
    }
}

impl JobTracker {
    /// Create a tracker that reads job status from `source`.
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                jobs: RwLock::new(HashMap::new()),
                source,
                consumers: RwLock::new(Vec::new()),
                event_tx,
                cancel: CancellationToken::new(),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Register a consumer that receives every successful result.
    pub fn add_consumer(&self, consumer: Arc<dyn ResultConsumer>) {
        self.inner.consumers.write().push(consumer);
    }

    /// Subscribe to job events for every tracked job.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Start polling a job.
    ///
    /// If the id is already being polled, the existing loop is kept and
    /// its handle returned; `options` and `observer` are ignored. A job
    /// whose previous loop has finished is replaced by a fresh entry.
    ///
    /// Never fails. Must be called from within a Tokio runtime.
    pub fn start(
        &self,
        job_id: impl Into<JobId>,
        kind: JobKind,
        options: PollOptions,
        observer: Arc<dyn JobObserver>,
    ) -> TrackedJob {
        let job_id = job_id.into();
        let mut jobs = self.inner.jobs.write();

        if let Some(existing) = jobs.get(&job_id) {
            if !existing.job.poll_state.is_finished() {
                tracing::debug!(job_id = %job_id, "Job already polling, keeping existing loop");
                return existing.handle.clone();
            }
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let gate = Arc::new(DeliveryGate::new());
        let cancel = self.inner.cancel.child_token();
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let outcome_tx = Arc::new(outcome_tx);
        let handle = TrackedJob {
            job_id: job_id.clone(),
            kind,
            outcome: outcome_rx,
        };
        let mut job = Job::new(job_id.clone(), kind);

        let task = if self.inner.cancel.is_cancelled() {
            tracing::warn!(job_id = %job_id, "Tracker is shut down, not polling job");
            job.poll_state = PollState::Cancelled;
            outcome_tx.send_replace(Some(PollOutcome::Cancelled));
            None
        } else {
            job.poll_state = PollState::Polling;
            let poll_task = PollTask {
                inner: Arc::clone(&self.inner),
                job_id: job_id.clone(),
                kind,
                generation,
                options,
                gate: Arc::clone(&gate),
                cancel: cancel.clone(),
                observer,
                outcome_tx: Arc::clone(&outcome_tx),
            };
            tracing::info!(
                job_id = %job_id,
                %kind,
                interval_ms = options.interval.as_millis() as u64,
                max_attempts = options.max_attempts,
                "Polling started",
            );
            self.inner.publish(JobEvent::Started {
                job_id: job_id.clone(),
                kind,
            });
            Some(tokio::spawn(poll_task.run()))
        };

        jobs.insert(
            job_id,
            TrackedEntry {
                job,
                generation,
                gate,
                cancel,
                task,
                outcome_tx,
                handle: handle.clone(),
            },
        );
        handle
    }

    /// Start polling a job the server just accepted.
    pub fn track(
        &self,
        handle: &JobHandle,
        options: PollOptions,
        observer: Arc<dyn JobObserver>,
    ) -> TrackedJob {
        self.start(handle.job_id.clone(), handle.kind, options, observer)
    }

    /// Submit a job and start polling it.
    ///
    /// Submission errors are returned directly; everything after that is
    /// reported through `observer` and the returned handle.
    pub async fn submit_and_track(
        &self,
        submitter: &dyn JobSubmitter,
        kind: JobKind,
        payload: SubmitPayload,
        options: PollOptions,
        observer: Arc<dyn JobObserver>,
    ) -> Result<TrackedJob, JobError> {
        let handle = submitter.submit(kind, payload).await?;
        Ok(self.track(&handle, options, observer))
    }

    /// Stop polling a job.
    ///
    /// Safe to call in any state. Returns `true` if a live loop was
    /// stopped, `false` if the job is unknown or already finished. After
    /// this returns no new callback starts for the job.
    ///
    /// Called from outside any callback, `stop` also waits for a callback
    /// of this job that is already running to return. Called from inside a
    /// callback it does not wait, so jobs may stop each other from their
    /// callbacks without deadlocking.
    pub fn stop(&self, job_id: &str) -> bool {
        let Some((gate, cancel, generation, outcome_tx, kind)) =
            self.inner.jobs.read().get(job_id).map(|e| {
                (
                    Arc::clone(&e.gate),
                    e.cancel.clone(),
                    e.generation,
                    Arc::clone(&e.outcome_tx),
                    e.job.kind,
                )
            })
        else {
            return false;
        };

        cancel.cancel();

        if !gate.close() {
            return false;
        }
        if !DeliveryScope::is_active() {
            gate.wait_idle();
        }

        self.inner.update_job(job_id, generation, |job| {
            job.poll_state = PollState::Cancelled;
        });
        outcome_tx.send_replace(Some(PollOutcome::Cancelled));
        self.inner.publish(JobEvent::Cancelled {
            job_id: job_id.to_string(),
            kind,
        });

        tracing::info!(job_id, %kind, "Polling stopped");
        true
    }

    /// Stop the job if needed and remove it from the tracked set.
    ///
    /// Returns the last snapshot of the job, or `None` if it was unknown.
    pub fn dismiss(&self, job_id: &str) -> Option<Job> {
        self.stop(job_id);
        let entry = self.inner.jobs.write().remove(job_id)?;
        self.inner.publish(JobEvent::Dismissed {
            job_id: entry.job.id.clone(),
            kind: entry.job.kind,
        });
        tracing::debug!(job_id, "Job dismissed");
        Some(entry.job)
    }

    /// Read-only copy of a tracked job.
    pub fn snapshot(&self, job_id: &str) -> Option<Job> {
        self.inner.jobs.read().get(job_id).map(|e| e.job.clone())
    }

    /// All tracked jobs, oldest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .inner
            .jobs
            .read()
            .values()
            .map(|e| e.job.clone())
            .collect();
        jobs.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Number of jobs still being polled.
    pub fn active_count(&self) -> usize {
        self.inner
            .jobs
            .read()
            .values()
            .filter(|e| !e.job.poll_state.is_finished())
            .count()
    }

    /// Stop every loop and wait for the poll tasks to exit.
    ///
    /// Waits up to 5 seconds per task. Jobs started afterwards are
    /// recorded as cancelled without polling.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down job tracker");
        self.inner.cancel.cancel();

        let ids: Vec<JobId> = self.inner.jobs.read().keys().cloned().collect();
        for id in &ids {
            self.stop(id);
        }

        let tasks: Vec<_> = self
            .inner
            .jobs
            .write()
            .values_mut()
            .filter_map(|e| e.task.take())
            .collect();
        for task in tasks {
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, task).await;
        }

        tracing::info!("Job tracker shut down complete");
    }
}

impl Inner {
    /// Apply `f` to the entry for `job_id` if it still belongs to
    /// `generation`, returning the updated snapshot.
    fn update_job(&self, job_id: &str, generation: u64, f: impl FnOnce(&mut Job)) -> Option<Job> {
        self.update_job_if(job_id, generation, || true, f)
    }

    /// Like [`update_job`](Self::update_job), but only while `open()`
    /// holds. `open` is evaluated under the map lock.
    fn update_job_if(
        &self,
        job_id: &str,
        generation: u64,
        open: impl FnOnce() -> bool,
        f: impl FnOnce(&mut Job),
    ) -> Option<Job> {
        let mut jobs = self.jobs.write();
        let entry = jobs.get_mut(job_id).filter(|e| e.generation == generation)?;
        if !open() {
            return None;
        }
        f(&mut entry.job);
        Some(entry.job.clone())
    }

    fn publish(&self, event: JobEvent) {
        // Ignore the SendError -- it only means there are zero receivers.
        let _ = self.event_tx.send(event);
    }
}

/// State owned by one job's poll task.
struct PollTask {
    inner: Arc<Inner>,
    job_id: JobId,
    kind: JobKind,
    generation: u64,
    options: PollOptions,
    gate: Arc<DeliveryGate>,
    cancel: CancellationToken,
    observer: Arc<dyn JobObserver>,
    outcome_tx: Arc<watch::Sender<Option<PollOutcome>>>,
}

impl PollTask {
    /// Sleep, request, deliver; until finished or cancelled.
    ///
    /// Requests are never pipelined: the next sleep only starts once the
    /// previous response has been delivered.
    async fn run(self) {
        let mut poller = JobPoller::new(self.job_id.clone(), self.kind, self.options);
        poller.begin();

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.options.interval) => {}
            }

            let response = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                response = self.inner.source.fetch_status(self.kind, &self.job_id) => response,
            };

            let step = match response {
                Ok(response) => poller.record_response(&response),
                Err(e) => poller.record_failure(e),
            };

            if !self.deliver(&poller, step) {
                break;
            }
        }

        tracing::debug!(job_id = %self.job_id, "Poll task exited");
    }

    /// Apply one step to the registry and notify listeners.
    ///
    /// Returns `false` once the loop must end.
    fn deliver(&self, poller: &JobPoller, step: Step) -> bool {
        let _scope = DeliveryScope::enter();
        let _delivering = self.gate.delivering.lock();

        // A terminal step claims the gate up front, so that a concurrent
        // `stop` either wins outright or becomes a no-op.
        let terminal = matches!(step, Step::Finished(_) | Step::Stale);
        if terminal {
            if !self.gate.close() {
                return false;
            }
        } else if self.gate.is_closed() {
            return false;
        }

        let failed_with = match &step {
            Step::Finished(PollOutcome::Failed(error)) => Some(error.clone()),
            _ => None,
        };
        let snapshot = self.inner.update_job_if(
            &self.job_id,
            self.generation,
            || terminal || !self.gate.is_closed(),
            |job| {
                job.status = poller.status();
                job.poll_state = poller.state();
                job.attempts = poller.attempts();
                job.progress = poller.progress();
                if failed_with.is_some() {
                    job.error = failed_with;
                }
            },
        );
        let Some(job) = snapshot else {
            // Stopped, dismissed or replaced underneath us.
            self.gate.close();
            return false;
        };

        match step {
            Step::Continue {
                status,
                progress,
                recognized,
            } => {
                if !recognized {
                    tracing::debug!(job_id = %self.job_id, "Unrecognized status, treating as processing");
                }
                tracing::debug!(
                    job_id = %self.job_id,
                    attempt = job.attempts,
                    %status,
                    progress,
                    "Job tick",
                );
                if self.gate.is_closed() {
                    return false;
                }
                self.inner.publish(JobEvent::Tick {
                    job_id: self.job_id.clone(),
                    kind: self.kind,
                    attempt: job.attempts,
                    status,
                    progress,
                });
                if self.gate.is_closed() {
                    return false;
                }
                self.observer.on_tick(&job);
                true
            }
            Step::Retry { failures, error } => {
                tracing::warn!(
                    job_id = %self.job_id,
                    attempt = job.attempts,
                    failures,
                    budget = self.options.retry_budget,
                    error = %error,
                    "Status request failed, retrying",
                );
                true
            }
            Step::Finished(outcome) => {
                self.finish(outcome);
                false
            }
            Step::Stale => false,
        }
    }

    /// Deliver the terminal outcome exactly once. Called during a delivery
    /// that has already claimed the gate.
    fn finish(&self, outcome: PollOutcome) {
        match &outcome {
            PollOutcome::Succeeded(result) => {
                tracing::info!(
                    job_id = %self.job_id,
                    kind = %self.kind,
                    artifacts = result.artifacts().len(),
                    "Job completed",
                );
                let consumers = self.inner.consumers.read().clone();
                for consumer in consumers {
                    consumer.consume(result);
                }
                self.inner.publish(JobEvent::Succeeded {
                    job_id: self.job_id.clone(),
                    kind: self.kind,
                    result: result.clone(),
                });
                self.observer.on_success(result);
            }
            PollOutcome::Failed(error) => {
                tracing::error!(
                    job_id = %self.job_id,
                    kind = %self.kind,
                    reason = ?error.kind(),
                    error = %error,
                    "Job failed",
                );
                self.inner.publish(JobEvent::Failed {
                    job_id: self.job_id.clone(),
                    kind: self.kind,
                    error: error.clone(),
                });
                self.observer.on_error(&self.job_id, error);
            }
            PollOutcome::Cancelled => {}
        }
        self.outcome_tx.send_replace(Some(outcome));
    }
}
