//! Tunable parameters for a poll loop.
//!
//! Image features (edit, upscale) finish in seconds and are polled often;
//! video generation takes minutes and is polled less aggressively. Use
//! [`PollOptions::for_kind`] for the per-feature defaults.

use std::time::Duration;

use studio_core::JobKind;

/// Default interval between status requests for image jobs.
pub const DEFAULT_IMAGE_INTERVAL: Duration = Duration::from_millis(2_000);

/// Default interval between status requests for video jobs.
pub const DEFAULT_VIDEO_INTERVAL: Duration = Duration::from_millis(8_000);

/// Default number of status requests before a job times out.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Default number of consecutive failed requests tolerated per job.
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Delay before each status request.
    pub interval: Duration,
    /// Total status requests (successful or not) before timing out.
    pub max_attempts: u32,
    /// Consecutive failed requests tolerated; one more fails the job.
    pub retry_budget: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_IMAGE_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

impl PollOptions {
    /// Per-feature defaults.
    pub fn for_kind(kind: JobKind) -> Self {
        let interval = if kind.is_image() {
            DEFAULT_IMAGE_INTERVAL
        } else {
            DEFAULT_VIDEO_INTERVAL
        };
        Self {
            interval,
            ..Default::default()
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = retry_budget;
        self
    }

    /// Upper bound on how long a job can be polled before timing out,
    /// ignoring request latency.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_polls_less_often_than_images() {
        let edit = PollOptions::for_kind(JobKind::Edit);
        let upscale = PollOptions::for_kind(JobKind::Upscale);
        let video = PollOptions::for_kind(JobKind::Video);
        assert_eq!(edit.interval, Duration::from_secs(2));
        assert_eq!(upscale.interval, edit.interval);
        assert_eq!(video.interval, Duration::from_secs(8));
        assert_eq!(video.max_attempts, 60);
    }

    #[test]
    fn max_attempts_is_at_least_one() {
        let options = PollOptions::default().with_max_attempts(0);
        assert_eq!(options.max_attempts, 1);
    }

    #[test]
    fn budget_is_interval_times_attempts() {
        let options = PollOptions::default()
            .with_interval(Duration::from_millis(500))
            .with_max_attempts(10);
        assert_eq!(options.budget(), Duration::from_secs(5));
    }

    #[test]
    fn retry_budget_can_be_zero() {
        let options = PollOptions::default().with_retry_budget(0);
        assert_eq!(options.retry_budget, 0);
    }
}
