//! Pure reduction of job events onto UI state.
//!
//! [`reduce`] performs no I/O. Terminal events are applied at most once
//! per run of a job: replaying a `Succeeded` or `Failed` event returns the
//! state unchanged, so results are never inserted twice. A `Started` event
//! opens a new run for the id; `Dismissed` forgets the id entirely.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::artifact::{merge_artifacts, Artifact, Placement};
use crate::error::ErrorKind;
use crate::events::JobEvent;
use crate::job::{JobKind, JobStatus};
use crate::types::JobId;

/// Progress indicator for one in-flight job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub kind: JobKind,
    pub status: JobStatus,
    pub attempt: u32,
    pub percent: Option<u8>,
}

/// A dismissible error notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiError {
    pub job_id: JobId,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UiState {
    /// Jobs currently showing a progress indicator.
    pub in_progress: BTreeMap<JobId, Progress>,
    /// Results shown to the user, newest first.
    pub results: Vec<Artifact>,
    pub errors: Vec<UiError>,
    /// Jobs whose current run has already had its terminal event applied.
    pub finished: BTreeSet<JobId>,
}

impl UiState {
    pub fn is_busy(&self) -> bool {
        !self.in_progress.is_empty()
    }

    pub fn error_for(&self, job_id: &str) -> Option<&UiError> {
        self.errors.iter().find(|e| e.job_id == job_id)
    }
}

/// Apply one event to the UI state.
pub fn reduce(mut state: UiState, event: &JobEvent) -> UiState {
    let job_id = event.job_id();
    let lifecycle = matches!(event, JobEvent::Started { .. } | JobEvent::Dismissed { .. });
    if state.finished.contains(job_id) && !lifecycle {
        return state;
    }

    match event {
        JobEvent::Started { kind, .. } => {
            state.finished.remove(job_id);
            state.errors.retain(|e| e.job_id != job_id);
            state.in_progress.insert(
                job_id.to_string(),
                Progress {
                    kind: *kind,
                    status: JobStatus::Pending,
                    attempt: 0,
                    percent: None,
                },
            );
        }
        JobEvent::Tick {
            kind,
            attempt,
            status,
            progress,
            ..
        } => {
            state.in_progress.insert(
                job_id.to_string(),
                Progress {
                    kind: *kind,
                    status: *status,
                    attempt: *attempt,
                    percent: *progress,
                },
            );
        }
        JobEvent::Succeeded { result, .. } => {
            state.in_progress.remove(job_id);
            merge_artifacts(&mut state.results, result.artifacts(), Placement::Prepend);
            state.finished.insert(job_id.to_string());
        }
        JobEvent::Failed { error, .. } => {
            state.in_progress.remove(job_id);
            state.errors.push(UiError {
                job_id: job_id.to_string(),
                kind: error.kind(),
                message: error.user_message(),
            });
            state.finished.insert(job_id.to_string());
        }
        JobEvent::Cancelled { .. } => {
            state.in_progress.remove(job_id);
        }
        JobEvent::Dismissed { .. } => {
            state.in_progress.remove(job_id);
            state.errors.retain(|e| e.job_id != job_id);
            state.finished.remove(job_id);
        }
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::JobResult;
    use crate::error::JobError;

    fn tick(id: &str, attempt: u32) -> JobEvent {
        JobEvent::Tick {
            job_id: id.into(),
            kind: JobKind::Edit,
            attempt,
            status: JobStatus::Processing,
            progress: Some(10 * attempt as u8),
        }
    }

    fn succeeded(id: &str, urls: &[&str]) -> JobEvent {
        JobEvent::Succeeded {
            job_id: id.into(),
            kind: JobKind::Edit,
            result: JobResult::success(id, urls.iter().map(|u| Artifact::from_url(*u)).collect()),
        }
    }

    #[test]
    fn tick_shows_progress() {
        let state = reduce(UiState::default(), &tick("a", 2));
        assert!(state.is_busy());
        assert_eq!(state.in_progress["a"].attempt, 2);
        assert_eq!(state.in_progress["a"].percent, Some(20));
    }

    #[test]
    fn success_shows_result_and_clears_progress() {
        let state = reduce(UiState::default(), &tick("a", 1));
        let state = reduce(state, &succeeded("a", &["u1", "u2"]));
        assert!(!state.is_busy());
        assert_eq!(state.results.len(), 2);
        assert!(state.finished.contains("a"));
    }

    #[test]
    fn duplicate_terminal_event_is_ignored() {
        let event = succeeded("a", &["u1"]);
        let once = reduce(UiState::default(), &event);
        let twice = reduce(once.clone(), &event);
        assert_eq!(once, twice);
        assert_eq!(twice.results.len(), 1);
    }

    #[test]
    fn late_tick_after_terminal_does_not_revive_progress() {
        let state = reduce(UiState::default(), &succeeded("a", &[]));
        let state = reduce(state, &tick("a", 9));
        assert!(!state.is_busy());
    }

    #[test]
    fn timeout_and_failure_show_error_and_clear_progress() {
        let state = reduce(UiState::default(), &tick("a", 1));
        let state = reduce(state, &tick("b", 1));
        let state = reduce(
            state,
            &JobEvent::Failed {
                job_id: "a".into(),
                kind: JobKind::Edit,
                error: JobError::Timeout { attempts: 60 },
            },
        );
        let state = reduce(
            state,
            &JobEvent::Failed {
                job_id: "b".into(),
                kind: JobKind::Edit,
                error: JobError::job_failed(None),
            },
        );
        assert!(!state.is_busy());
        let a = state.error_for("a").unwrap();
        let b = state.error_for("b").unwrap();
        assert_eq!(a.message, b.message);
        assert_eq!(a.kind, ErrorKind::JobTimeoutError);
        assert_eq!(b.kind, ErrorKind::JobFailedError);
    }

    fn started(id: &str) -> JobEvent {
        JobEvent::Started {
            job_id: id.into(),
            kind: JobKind::Edit,
        }
    }

    #[test]
    fn start_shows_pending_progress() {
        let state = reduce(UiState::default(), &started("a"));
        assert!(state.is_busy());
        assert_eq!(state.in_progress["a"].status, JobStatus::Pending);
        assert_eq!(state.in_progress["a"].attempt, 0);
    }

    #[test]
    fn restarted_job_reaches_state_again() {
        let state = reduce(UiState::default(), &started("job-1"));
        let state = reduce(
            state,
            &JobEvent::Failed {
                job_id: "job-1".into(),
                kind: JobKind::Edit,
                error: JobError::job_failed(Some("boom")),
            },
        );
        assert_eq!(state.errors.len(), 1);

        let state = reduce(state, &started("job-1"));
        assert!(state.errors.is_empty());
        let state = reduce(state, &tick("job-1", 1));
        assert!(state.is_busy());

        let done = succeeded("job-1", &["new.png"]);
        let state = reduce(state, &done);
        assert_eq!(state.results, vec![Artifact::from_url("new.png")]);
        assert!(!state.is_busy());

        let replayed = reduce(state.clone(), &done);
        assert_eq!(replayed, state);
    }

    #[test]
    fn dismiss_clears_error_and_forgets_the_job() {
        let failed = JobEvent::Failed {
            job_id: "a".into(),
            kind: JobKind::Video,
            error: JobError::job_failed(Some("boom")),
        };
        let state = reduce(UiState::default(), &failed);
        assert!(state.finished.contains("a"));
        let state = reduce(
            state,
            &JobEvent::Dismissed {
                job_id: "a".into(),
                kind: JobKind::Video,
            },
        );
        assert!(state.errors.is_empty());
        assert!(state.finished.is_empty());
        assert!(state.in_progress.is_empty());
    }

    #[test]
    fn cancel_clears_progress_only() {
        let state = reduce(UiState::default(), &tick("a", 1));
        let state = reduce(
            state,
            &JobEvent::Cancelled {
                job_id: "a".into(),
                kind: JobKind::Edit,
            },
        );
        assert!(!state.is_busy());
        assert!(state.errors.is_empty());
        assert!(!state.finished.contains("a"));
    }
}
