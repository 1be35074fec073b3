use serde::Serialize;

/// Everything that can end a job from the caller's point of view.
///
/// All variants are recoverable at the UI layer: they are surfaced as a
/// dismissible notification and the user may resubmit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobError {
    /// The submission request was rejected or never reached the server.
    #[error("Submission failed: {message}")]
    Submission { message: String },

    /// Too many consecutive status requests failed.
    #[error("Polling failed after {failures} consecutive errors: {message}")]
    Polling { failures: u32, message: String },

    /// The server reported the job as failed.
    #[error("Job failed: {message}")]
    JobFailed { message: String },

    /// The attempt budget ran out before a terminal status was seen.
    #[error("Job timed out after {attempts} attempts")]
    Timeout { attempts: u32 },
}

/// Stable reason code for each [`JobError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SubmissionError,
    PollingError,
    JobFailedError,
    JobTimeoutError,
}

/// Shown when the server did not say why a job failed.
pub const GENERIC_FAILURE_MESSAGE: &str = "Generation failed. Please try again.";

/// Shown when a submission was rejected without a server message.
pub const GENERIC_SUBMISSION_MESSAGE: &str = "Could not start the job. Please try again.";

impl JobError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Submission { .. } => ErrorKind::SubmissionError,
            JobError::Polling { .. } => ErrorKind::PollingError,
            JobError::JobFailed { .. } => ErrorKind::JobFailedError,
            JobError::Timeout { .. } => ErrorKind::JobTimeoutError,
        }
    }

    /// The single human-readable message a user sees for this error.
    ///
    /// Timeouts read exactly like a failure without a server message; only
    /// [`kind`](Self::kind) tells them apart.
    pub fn user_message(&self) -> String {
        match self {
            JobError::Submission { message } if !message.trim().is_empty() => message.clone(),
            JobError::Submission { .. } => GENERIC_SUBMISSION_MESSAGE.to_string(),
            JobError::Polling { .. } => {
                "Lost contact with the server while checking the job. Please try again.".to_string()
            }
            JobError::JobFailed { message } if !message.trim().is_empty() => message.clone(),
            JobError::JobFailed { .. } | JobError::Timeout { .. } => {
                GENERIC_FAILURE_MESSAGE.to_string()
            }
        }
    }

    pub fn submission(message: impl Into<String>) -> Self {
        JobError::Submission {
            message: message.into(),
        }
    }

    /// Build a [`JobError::JobFailed`], falling back to the generic message
    /// when the server supplied none.
    pub fn job_failed(message: Option<&str>) -> Self {
        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(GENERIC_FAILURE_MESSAGE);
        JobError::JobFailed {
            message: message.to_string(),
        }
    }
}
