//! Job lifecycle types.
//!
//! A [`Job`] carries two independent pieces of state: the server-reported
//! [`JobStatus`] (which only ever moves forward) and the client-side
//! [`PollState`] of the loop that is watching it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// The studio feature that started a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Edit,
    Upscale,
    Video,
}

impl JobKind {
    /// All kinds, in declaration order.
    pub const ALL: [JobKind; 3] = [JobKind::Edit, JobKind::Upscale, JobKind::Video];

    /// Default route segment under `/api/` for this feature.
    pub fn route(self) -> &'static str {
        match self {
            JobKind::Edit => "edit",
            JobKind::Upscale => "upscale",
            JobKind::Video => "video",
        }
    }

    /// Whether this kind produces still images (as opposed to video).
    pub fn is_image(self) -> bool {
        !matches!(self, JobKind::Video)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.route())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "edit" => Ok(JobKind::Edit),
            "upscale" => Ok(JobKind::Upscale),
            "video" => Ok(JobKind::Video),
            other => Err(format!("unknown job kind '{other}' (expected edit, upscale or video)")),
        }
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Server-side status of a job, in canonical vocabulary.
///
/// Ordered: `Pending < Processing < {Completed, Failed}`. The two terminal
/// variants share a rank and neither can replace the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    /// `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Canonical wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Apply a newly observed status without ever moving backwards.
    ///
    /// Returns the status the job holds afterwards. Once terminal, the
    /// status is frozen.
    pub fn advance(self, observed: JobStatus) -> JobStatus {
        if self.is_terminal() || observed.rank() <= self.rank() {
            self
        } else {
            observed
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PollState
// ---------------------------------------------------------------------------

/// State of the client-side loop watching a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl PollState {
    /// `true` once the loop has stopped for any reason.
    pub fn is_finished(self) -> bool {
        !matches!(self, PollState::Idle | PollState::Polling)
    }

    /// The poll state a terminal error leads to.
    pub fn from_error(error: &JobError) -> Self {
        match error {
            JobError::Timeout { .. } => PollState::TimedOut,
            _ => PollState::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A tracked job as seen by readers of the tracker.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub submitted_at: Timestamp,
    pub status: JobStatus,
    pub poll_state: PollState,
    /// Number of status requests issued so far.
    pub attempts: u32,
    /// Last reported progress, normalised to 0-100.
    pub progress: Option<u8>,
    /// Terminal error, if the loop ended with one.
    pub error: Option<JobError>,
}

impl Job {
    /// A freshly submitted job that no loop is watching yet.
    pub fn new(id: impl Into<JobId>, kind: JobKind) -> Self {
        Self {
            id: id.into(),
            kind,
            submitted_at: chrono::Utc::now(),
            status: JobStatus::Pending,
            poll_state: PollState::Idle,
            attempts: 0,
            progress: None,
            error: None,
        }
    }
}
