//! Shared fixtures for tracker integration tests.
//!
//! [`ScriptedSource`] replays a per-job script of status responses and
//! counts every request it receives. [`Recorder`] captures observer calls.
//! [`FakeSubmitter`] answers submissions with a fixed job id or error.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use studio_core::status::StatusResponse;
use studio_core::transport::{JobHandle, JobSubmitter, StatusSource, SubmitPayload, TransportError};
use studio_core::{Job, JobError, JobKind, JobResult};
use studio_tracker::JobObserver;
use tokio::sync::Notify;

pub type Reply = Result<StatusResponse, TransportError>;

/// Status source driven by a script per job id.
///
/// Once a job's script is exhausted the source keeps answering with
/// `processing`.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<HashMap<String, usize>>,
    latency: Option<Duration>,
    started: Arc<Notify>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request takes `latency` (virtual time) to answer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn script(self, job_id: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .insert(job_id.to_string(), replies.into_iter().collect());
        self
    }

    pub fn requests(&self, job_id: &str) -> usize {
        self.requests.lock().get(job_id).copied().unwrap_or(0)
    }

    /// Notified whenever a request starts.
    pub fn started(&self) -> Arc<Notify> {
        Arc::clone(&self.started)
    }
}

#[async_trait]
impl StatusSource for ScriptedSource {
    async fn fetch_status(
        &self,
        _kind: JobKind,
        job_id: &str,
    ) -> Result<StatusResponse, TransportError> {
        *self.requests.lock().entry(job_id.to_string()).or_default() += 1;
        self.started.notify_one();

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let reply = self
            .scripts
            .lock()
            .get_mut(job_id)
            .and_then(VecDeque::pop_front);
        reply.unwrap_or_else(|| Ok(processing()))
    }
}

pub fn processing() -> StatusResponse {
    StatusResponse::new("processing")
}

pub fn ok(status: &str) -> Reply {
    Ok(StatusResponse::new(status))
}

pub fn network_error() -> Reply {
    Err(TransportError::Request("connection refused".into()))
}

/// Captures every observer call.
#[derive(Default)]
pub struct Recorder {
    pub ticks: Mutex<Vec<Job>>,
    pub successes: Mutex<Vec<JobResult>>,
    pub errors: Mutex<Vec<(String, JobError)>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn tick_count(&self) -> usize {
        self.ticks.lock().len()
    }

    pub fn success_count(&self) -> usize {
        self.successes.lock().len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn total_calls(&self) -> usize {
        self.tick_count() + self.success_count() + self.error_count()
    }
}

impl JobObserver for Recorder {
    fn on_tick(&self, job: &Job) {
        self.ticks.lock().push(job.clone());
    }

    fn on_success(&self, result: &JobResult) {
        self.successes.lock().push(result.clone());
    }

    fn on_error(&self, job_id: &str, error: &JobError) {
        self.errors.lock().push((job_id.to_string(), error.clone()));
    }
}

/// Submitter that accepts every payload under one job id, or rejects it.
pub struct FakeSubmitter {
    reply: Result<String, JobError>,
    pub submitted: Mutex<Vec<(JobKind, SubmitPayload)>>,
}

impl FakeSubmitter {
    pub fn accepting(job_id: &str) -> Self {
        Self {
            reply: Ok(job_id.to_string()),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting(error: JobError) -> Self {
        Self {
            reply: Err(error),
            submitted: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl JobSubmitter for FakeSubmitter {
    async fn submit(&self, kind: JobKind, payload: SubmitPayload) -> Result<JobHandle, JobError> {
        self.submitted.lock().push((kind, payload));
        let job_id = self.reply.clone()?;
        Ok(JobHandle { job_id, kind })
    }
}
