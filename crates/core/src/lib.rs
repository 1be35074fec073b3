//! Core types for tracking long-running studio jobs.
//!
//! Everything in this crate is free of I/O: job and status types, the
//! canonical status vocabulary, the error taxonomy, the UI state reducer,
//! and artifact merging. The transport seams ([`transport::StatusSource`],
//! [`transport::JobSubmitter`]) are declared here so that the HTTP client
//! and the tracker can depend on them without depending on each other.

pub mod artifact;
pub mod error;
pub mod events;
pub mod job;
pub mod reducer;
pub mod status;
pub mod transport;
pub mod types;

pub use artifact::{merge_artifacts, Artifact, JobResult, Placement, ResultConsumer, SessionCollection};
pub use error::{ErrorKind, JobError};
pub use events::JobEvent;
pub use job::{Job, JobKind, JobStatus, PollState};
pub use types::{JobId, Timestamp};
