//! Status endpoint payloads and the canonical status vocabulary.
//!
//! Different studio features report completion as `"done"` or
//! `"completed"` and failure as `"error"` or `"failed"`. Everything is
//! normalised here, at the boundary, into [`JobStatus`].

use serde::{Deserialize, Serialize};

use crate::job::JobStatus;

/// Aliases accepted for [`JobStatus::Pending`].
pub const PENDING_ALIASES: &[&str] = &["pending", "queued", "waiting", "submitted"];

/// Aliases accepted for [`JobStatus::Processing`].
pub const PROCESSING_ALIASES: &[&str] = &["processing", "running", "in_progress", "started"];

/// Aliases accepted for [`JobStatus::Completed`].
pub const COMPLETED_ALIASES: &[&str] = &["completed", "complete", "done", "succeeded", "success"];

/// Aliases accepted for [`JobStatus::Failed`].
pub const FAILED_ALIASES: &[&str] = &["failed", "failure", "error"];

/// Result of mapping a raw status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalized {
    pub status: JobStatus,
    /// `false` when the raw string matched no alias and was read as
    /// still-processing.
    pub recognized: bool,
}

/// Map a raw status string onto the canonical vocabulary.
///
/// Matching ignores case and surrounding whitespace, and treats `-` and
/// spaces like `_`. Unknown values are read as [`JobStatus::Processing`]
/// so that new server-side statuses never fail a job.
pub fn normalize(raw: &str) -> Normalized {
    let key = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");

    let table: [(&[&str], JobStatus); 4] = [
        (PENDING_ALIASES, JobStatus::Pending),
        (PROCESSING_ALIASES, JobStatus::Processing),
        (COMPLETED_ALIASES, JobStatus::Completed),
        (FAILED_ALIASES, JobStatus::Failed),
    ];

    for (aliases, status) in table {
        if aliases.contains(&key.as_str()) {
            return Normalized {
                status,
                recognized: true,
            };
        }
    }

    Normalized {
        status: JobStatus::Processing,
        recognized: false,
    }
}

/// Body of `GET /api/<feature>/status/{jobId}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    /// Either a fraction (`0.0..=1.0`) or a percentage (`0..=100`).
    #[serde(default)]
    pub progress: Option<f64>,
}

impl StatusResponse {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Default::default()
        }
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn normalized(&self) -> Normalized {
        normalize(&self.status)
    }

    /// Progress as a whole percentage, if the server reported any.
    pub fn progress_percent(&self) -> Option<u8> {
        let raw = self.progress?;
        if !raw.is_finite() || raw < 0.0 {
            return None;
        }
        let percent = if raw <= 1.0 { raw * 100.0 } else { raw };
        Some(percent.round().min(100.0) as u8)
    }
}
