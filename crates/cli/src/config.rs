use std::time::Duration;

use studio_core::JobKind;
use studio_tracker::PollOptions;

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// CLI configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioConfig {
    /// Backend base URL (default: `http://localhost:3000`).
    pub api_url: String,
    /// Per-request HTTP timeout (default: 30 s).
    pub request_timeout: Duration,
    /// Poll interval for edit and upscale jobs (default: 2 s).
    pub image_poll_interval: Duration,
    /// Poll interval for video jobs (default: 8 s).
    pub video_poll_interval: Duration,
    /// Status requests per job before timing out (default: `60`).
    pub max_attempts: u32,
    /// Consecutive failed status requests tolerated (default: `3`).
    pub retry_budget: u32,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".into(),
            request_timeout: Duration::from_secs(30),
            image_poll_interval: Duration::from_millis(2_000),
            video_poll_interval: Duration::from_millis(8_000),
            max_attempts: 60,
            retry_budget: 3,
        }
    }
}

impl StudioConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                 |
    /// |--------------------------|-------------------------|
    /// | `STUDIO_API_URL`         | `http://localhost:3000` |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                    |
    /// | `IMAGE_POLL_INTERVAL_MS` | `2000`                  |
    /// | `VIDEO_POLL_INTERVAL_MS` | `8000`                  |
    /// | `POLL_MAX_ATTEMPTS`      | `60`                    |
    /// | `POLL_RETRY_BUDGET`      | `3`                     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_url = lookup("STUDIO_API_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.api_url);

        let request_timeout_secs: u64 = parse(&lookup, "REQUEST_TIMEOUT_SECS")?
            .unwrap_or(defaults.request_timeout.as_secs());
        let image_ms: u64 = parse(&lookup, "IMAGE_POLL_INTERVAL_MS")?
            .unwrap_or(defaults.image_poll_interval.as_millis() as u64);
        let video_ms: u64 = parse(&lookup, "VIDEO_POLL_INTERVAL_MS")?
            .unwrap_or(defaults.video_poll_interval.as_millis() as u64);
        let max_attempts: u32 =
            parse(&lookup, "POLL_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts);
        let retry_budget: u32 =
            parse(&lookup, "POLL_RETRY_BUDGET")?.unwrap_or(defaults.retry_budget);

        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "POLL_MAX_ATTEMPTS",
                value: "0".into(),
            });
        }

        Ok(Self {
            api_url,
            request_timeout: Duration::from_secs(request_timeout_secs),
            image_poll_interval: Duration::from_millis(image_ms),
            video_poll_interval: Duration::from_millis(video_ms),
            max_attempts,
            retry_budget,
        })
    }

    /// Poll options for a feature, before any command-line overrides.
    pub fn poll_options(&self, kind: JobKind) -> PollOptions {
        let interval = if kind.is_image() {
            self.image_poll_interval
        } else {
            self.video_poll_interval
        };
        PollOptions::for_kind(kind)
            .with_interval(interval)
            .with_max_attempts(self.max_attempts)
            .with_retry_budget(self.retry_budget)
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<StudioConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        StudioConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        assert_eq!(load(&[]), Ok(StudioConfig::default()));
    }

    #[test]
    fn reads_every_variable() {
        let config = load(&[
            ("STUDIO_API_URL", "https://studio.example.com"),
            ("REQUEST_TIMEOUT_SECS", "5"),
            ("IMAGE_POLL_INTERVAL_MS", "500"),
            ("VIDEO_POLL_INTERVAL_MS", " 10000 "),
            ("POLL_MAX_ATTEMPTS", "90"),
            ("POLL_RETRY_BUDGET", "0"),
        ])
        .unwrap();

        assert_eq!(config.api_url, "https://studio.example.com");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.image_poll_interval, Duration::from_millis(500));
        assert_eq!(config.video_poll_interval, Duration::from_secs(10));
        assert_eq!(config.max_attempts, 90);
        assert_eq!(config.retry_budget, 0);
    }

    #[test]
    fn invalid_number_names_the_variable() {
        assert_eq!(
            load(&[("POLL_MAX_ATTEMPTS", "lots")]),
            Err(ConfigError::Invalid {
                var: "POLL_MAX_ATTEMPTS",
                value: "lots".into(),
            })
        );
        assert!(load(&[("POLL_MAX_ATTEMPTS", "0")]).is_err());
    }

    #[test]
    fn poll_options_follow_the_feature() {
        let config = load(&[("IMAGE_POLL_INTERVAL_MS", "1000")]).unwrap();

        let edit = config.poll_options(JobKind::Edit);
        assert_eq!(edit.interval, Duration::from_secs(1));
        assert_eq!(edit.max_attempts, 60);

        let video = config.poll_options(JobKind::Video);
        assert_eq!(video.interval, Duration::from_secs(8));
    }
}
