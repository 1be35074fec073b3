//! Per-job polling state machine.
//!
//! [`JobPoller`] performs no I/O and never sleeps. The tracker feeds it the
//! outcome of each status request and acts on the returned [`Step`].
//!
//! ```text
//! Idle -> Polling -> { Succeeded, Failed, TimedOut, Cancelled }
//! ```

use studio_core::status::StatusResponse;
use studio_core::transport::TransportError;
use studio_core::{JobError, JobId, JobKind, JobResult, JobStatus, PollState};

use crate::options::PollOptions;

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Succeeded(JobResult),
    Failed(JobError),
    Cancelled,
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Succeeded(_))
    }
}

/// What the driver should do after feeding one request outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Non-terminal status; notify `on_tick` and wait for the next tick.
    Continue {
        status: JobStatus,
        progress: Option<u8>,
        /// `false` when the raw status was not in the known vocabulary.
        recognized: bool,
    },
    /// The request failed but the retry budget is not exhausted yet.
    Retry { failures: u32, error: TransportError },
    /// The loop is over.
    Finished(PollOutcome),
    /// Input arrived after the loop had already finished; ignore it.
    Stale,
}

impl Step {
    pub fn is_finished(&self) -> bool {
        matches!(self, Step::Finished(_))
    }
}

#[derive(Debug, Clone)]
pub struct JobPoller {
    job_id: JobId,
    kind: JobKind,
    options: PollOptions,
    state: PollState,
    status: JobStatus,
    attempts: u32,
    consecutive_failures: u32,
    progress: Option<u8>,
}

impl JobPoller {
    pub fn new(job_id: impl Into<JobId>, kind: JobKind, options: PollOptions) -> Self {
        Self {
            job_id: job_id.into(),
            kind,
            options,
            state: PollState::Idle,
            status: JobStatus::Pending,
            attempts: 0,
            consecutive_failures: 0,
            progress: None,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn progress(&self) -> Option<u8> {
        self.progress
    }

    /// Idle -> Polling. No-op in any other state.
    pub fn begin(&mut self) {
        if self.state == PollState::Idle {
            self.state = PollState::Polling;
        }
    }

    /// Move to `Cancelled` unless already finished. Returns whether the
    /// state changed.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_finished() {
            return false;
        }
        self.state = PollState::Cancelled;
        true
    }

    /// Feed a successful status response.
    pub fn record_response(&mut self, response: &StatusResponse) -> Step {
        if self.state != PollState::Polling {
            return Step::Stale;
        }
        self.attempts += 1;
        self.consecutive_failures = 0;

        let normalized = response.normalized();
        self.status = self.status.advance(normalized.status);
        if let Some(percent) = response.progress_percent() {
            self.progress = Some(percent);
        }

        match self.status {
            JobStatus::Completed => {
                let result = JobResult::from_payload(self.job_id.clone(), response.result.as_ref());
                self.progress = Some(100);
                self.finish(PollOutcome::Succeeded(result))
            }
            JobStatus::Failed => {
                let error = JobError::job_failed(response.error.as_deref());
                self.finish(PollOutcome::Failed(error))
            }
            JobStatus::Pending | JobStatus::Processing => {
                if self.attempts >= self.options.max_attempts {
                    return self.time_out();
                }
                Step::Continue {
                    status: self.status,
                    progress: self.progress,
                    recognized: normalized.recognized,
                }
            }
        }
    }

    /// Feed a failed status request.
    pub fn record_failure(&mut self, error: TransportError) -> Step {
        if self.state != PollState::Polling {
            return Step::Stale;
        }
        self.attempts += 1;
        self.consecutive_failures += 1;

        if self.consecutive_failures > self.options.retry_budget {
            let error = JobError::Polling {
                failures: self.consecutive_failures,
                message: error.to_string(),
            };
            return self.finish(PollOutcome::Failed(error));
        }
        if self.attempts >= self.options.max_attempts {
            return self.time_out();
        }
        Step::Retry {
            failures: self.consecutive_failures,
            error,
        }
    }

    fn time_out(&mut self) -> Step {
        let error = JobError::Timeout {
            attempts: self.attempts,
        };
        self.finish(PollOutcome::Failed(error))
    }

    fn finish(&mut self, outcome: PollOutcome) -> Step {
        self.state = match &outcome {
            PollOutcome::Succeeded(_) => PollState::Succeeded,
            PollOutcome::Failed(error) => PollState::from_error(error),
            PollOutcome::Cancelled => PollState::Cancelled,
        };
        Step::Finished(outcome)
    }
}
