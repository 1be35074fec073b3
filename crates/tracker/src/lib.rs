//! Polls submitted studio jobs until they finish.
//!
//! [`JobPoller`] is the per-job state machine; [`JobTracker`] runs one
//! Tokio task per job on top of it and hands results to observers,
//! [`ResultConsumer`](studio_core::ResultConsumer)s and event subscribers.

pub mod observer;
pub mod options;
pub mod poller;
pub mod tracker;

pub use observer::{Callbacks, JobObserver, NoopObserver};
pub use options::PollOptions;
pub use poller::{JobPoller, PollOutcome, Step};
pub use tracker::{JobTracker, TrackedJob};
