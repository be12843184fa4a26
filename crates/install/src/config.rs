use std::time::Duration;

/// Storage key for tab install parameters.
pub const INSTALL_CHARTS_KEY: &str = "install_charts";
/// Storage key for resolved version lists.
pub const VERSIONS_KEY: &str = "install_charts_versions";
/// Storage key for install results.
pub const DETAILS_KEY: &str = "install_charts_details";

/// Timing knobs for loaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Interval for the wait-for-install-data poll.
    pub poll_interval: Duration,
    /// Total values provider calls before giving up (attempts 0..n).
    pub values_attempts: u32,
    /// Pause between values attempts.
    pub values_retry_delay: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            values_attempts: 5,
            values_retry_delay: Duration::from_millis(50),
        }
    }
}

impl LoaderConfig {
    /// Defaults overridden by `HELMDOCK_WAIT_POLL_MS`, `HELMDOCK_VALUES_ATTEMPTS`
    /// and `HELMDOCK_VALUES_RETRY_MS`.
    pub fn from_env() -> Self {
        let d = Self::default();
        let poll_ms = env_u64("HELMDOCK_WAIT_POLL_MS").unwrap_or(d.poll_interval.as_millis() as u64);
        let attempts = env_u64("HELMDOCK_VALUES_ATTEMPTS").map(|v| v as u32).unwrap_or(d.values_attempts);
        let retry_ms = env_u64("HELMDOCK_VALUES_RETRY_MS").unwrap_or(d.values_retry_delay.as_millis() as u64);
        Self {
            poll_interval: Duration::from_millis(poll_ms.max(1)),
            values_attempts: attempts.max(1),
            values_retry_delay: Duration::from_millis(retry_ms),
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_allow_five_attempts() {
        let c = LoaderConfig::default();
        assert_eq!(c.values_attempts, 5);
        assert_eq!(c.values_retry_delay, Duration::from_millis(50));
    }
}
