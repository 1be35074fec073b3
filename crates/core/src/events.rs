//! Job lifecycle events.
//!
//! Emitted by the tracker for every tick and terminal transition, and fed
//! into [`reduce`](crate::reducer::reduce) by UI layers.

use serde::Serialize;

use crate::artifact::JobResult;
use crate::error::JobError;
use crate::job::{JobKind, JobStatus};
use crate::types::JobId;

/// Event type name for a newly started poll loop.
pub const MSG_TYPE_JOB_STARTED: &str = "job_started";

/// Event type name for a non-terminal tick.
pub const MSG_TYPE_JOB_PROGRESS: &str = "job_progress";

/// Event type name for a successful completion.
pub const MSG_TYPE_JOB_COMPLETED: &str = "job_completed";

/// Event type name for any terminal failure (including timeouts).
pub const MSG_TYPE_JOB_FAILED: &str = "job_failed";

/// Event type name for a cancelled poll loop.
pub const MSG_TYPE_JOB_CANCELLED: &str = "job_cancelled";

/// Event type name for a job removed from the tracked set.
pub const MSG_TYPE_JOB_DISMISSED: &str = "job_dismissed";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A poll loop was started for the job. Published once per run, before
    /// any other event of that run.
    Started { job_id: JobId, kind: JobKind },

    /// A status request finished without reaching a terminal state.
    Tick {
        job_id: JobId,
        kind: JobKind,
        attempt: u32,
        status: JobStatus,
        /// Completion percentage (0-100), when the server reports one.
        progress: Option<u8>,
    },

    Succeeded {
        job_id: JobId,
        kind: JobKind,
        result: JobResult,
    },

    /// Terminal failure: server-reported, polling or timeout.
    Failed {
        job_id: JobId,
        kind: JobKind,
        error: JobError,
    },

    Cancelled { job_id: JobId, kind: JobKind },

    Dismissed { job_id: JobId, kind: JobKind },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Started { job_id, .. }
            | JobEvent::Tick { job_id, .. }
            | JobEvent::Succeeded { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Cancelled { job_id, .. }
            | JobEvent::Dismissed { job_id, .. } => job_id,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobEvent::Started { kind, .. }
            | JobEvent::Tick { kind, .. }
            | JobEvent::Succeeded { kind, .. }
            | JobEvent::Failed { kind, .. }
            | JobEvent::Cancelled { kind, .. }
            | JobEvent::Dismissed { kind, .. } => *kind,
        }
    }

    /// `true` for success and failure; these end a job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Succeeded { .. } | JobEvent::Failed { .. })
    }

    /// Wire message type for notifying connected clients.
    pub fn message_type(&self) -> &'static str {
        match self {
            JobEvent::Started { .. } => MSG_TYPE_JOB_STARTED,
            JobEvent::Tick { .. } => MSG_TYPE_JOB_PROGRESS,
            JobEvent::Succeeded { .. } => MSG_TYPE_JOB_COMPLETED,
            JobEvent::Failed { .. } => MSG_TYPE_JOB_FAILED,
            JobEvent::Cancelled { .. } => MSG_TYPE_JOB_CANCELLED,
            JobEvent::Dismissed { .. } => MSG_TYPE_JOB_DISMISSED,
        }
    }
}
