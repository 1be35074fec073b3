//! HTTP client for the studio backend.
//!
//! [`StudioApi`] implements both [`JobSubmitter`](studio_core::transport::JobSubmitter)
//! and [`StatusSource`](studio_core::transport::StatusSource), so a single
//! instance can be handed to the tracker for every feature.

pub mod api;

pub use api::{StudioApi, StudioApiError};
