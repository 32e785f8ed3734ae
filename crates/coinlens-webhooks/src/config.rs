//! Engine configuration.

use std::env;
use std::time::Duration;

use crate::error::WebhookError;

/// Default maximum delivery attempts per logical event.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default maximum active subscriptions per user.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 25;

/// Default consecutive-failure threshold before auto-disabling a subscription.
pub const DEFAULT_DISABLE_THRESHOLD: u32 = 50;

/// Default per-attempt HTTP timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default replay tolerance for signature verification (seconds).
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Backoff schedule between attempts: 1m, 5m, 30m, 2h, 6h.
///
/// Indexed by the failed attempt number; attempts past the table length
/// clamp to the last entry.
pub const DEFAULT_BACKOFF_SCHEDULE: [Duration; 5] = [
    Duration::from_secs(60),
    Duration::from_secs(300),
    Duration::from_secs(1800),
    Duration::from_secs(7200),
    Duration::from_secs(21600),
];

/// Webhook engine configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Maximum delivery attempts per logical event (initial attempt included).
    pub max_attempts: u32,
    /// Maximum subscriptions a single user may own.
    pub max_subscriptions_per_user: usize,
    /// Consecutive failures before a subscription is auto-disabled.
    pub disable_threshold: u32,
    /// Hard timeout for a single delivery attempt.
    pub http_timeout: Duration,
    /// Permit plain-HTTP target URLs (loopback/test hosts only).
    pub allow_http: bool,
    /// Replay tolerance used by receiver-side signature verification.
    pub tolerance_secs: i64,
    /// 32-byte key for encrypting signing secrets at rest.
    pub encryption_key: Vec<u8>,
    /// Delay table between attempts.
    pub backoff_schedule: Vec<Duration>,
}

impl WebhookConfig {
    /// Configuration with engine defaults and the given at-rest key.
    #[must_use]
    pub fn new(encryption_key: Vec<u8>) -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_subscriptions_per_user: DEFAULT_MAX_SUBSCRIPTIONS,
            disable_threshold: DEFAULT_DISABLE_THRESHOLD,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            allow_http: false,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            encryption_key,
            backoff_schedule: DEFAULT_BACKOFF_SCHEDULE.to_vec(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `WEBHOOK_ENCRYPTION_KEY`: 64 hex chars (32 bytes)
    ///
    /// Optional:
    /// - `WEBHOOK_MAX_ATTEMPTS` (default: 5)
    /// - `WEBHOOK_MAX_SUBSCRIPTIONS` (default: 25)
    /// - `WEBHOOK_DISABLE_THRESHOLD` (default: 50)
    /// - `WEBHOOK_HTTP_TIMEOUT_SECS` (default: 10)
    /// - `WEBHOOK_ALLOW_HTTP` (default: false)
    pub fn from_env() -> Result<Self, WebhookError> {
        let key_hex = env::var("WEBHOOK_ENCRYPTION_KEY").map_err(|_| {
            WebhookError::Internal("WEBHOOK_ENCRYPTION_KEY is not set".to_string())
        })?;
        let encryption_key = hex::decode(key_hex.trim()).map_err(|e| {
            WebhookError::Internal(format!("WEBHOOK_ENCRYPTION_KEY is not valid hex: {e}"))
        })?;
        if encryption_key.len() != 32 {
            return Err(WebhookError::Internal(format!(
                "WEBHOOK_ENCRYPTION_KEY must be 32 bytes, got {}",
                encryption_key.len()
            )));
        }

        let mut config = Self::new(encryption_key);

        if let Ok(v) = env::var("WEBHOOK_MAX_ATTEMPTS") {
            config.max_attempts = parse_var("WEBHOOK_MAX_ATTEMPTS", &v)?;
        }
        if let Ok(v) = env::var("WEBHOOK_MAX_SUBSCRIPTIONS") {
            config.max_subscriptions_per_user = parse_var("WEBHOOK_MAX_SUBSCRIPTIONS", &v)?;
        }
        if let Ok(v) = env::var("WEBHOOK_DISABLE_THRESHOLD") {
            config.disable_threshold = parse_var("WEBHOOK_DISABLE_THRESHOLD", &v)?;
        }
        if let Ok(v) = env::var("WEBHOOK_HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(parse_var("WEBHOOK_HTTP_TIMEOUT_SECS", &v)?);
        }
        if let Ok(v) = env::var("WEBHOOK_ALLOW_HTTP") {
            config.allow_http = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(config)
    }

    /// Override the maximum delivery attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Override the per-user subscription cap.
    #[must_use]
    pub fn with_max_subscriptions(mut self, max: usize) -> Self {
        self.max_subscriptions_per_user = max;
        self
    }

    /// Override the consecutive-failure auto-disable threshold.
    #[must_use]
    pub fn with_disable_threshold(mut self, threshold: u32) -> Self {
        self.disable_threshold = threshold;
        self
    }

    /// Permit plain-HTTP target URLs (for development/testing).
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Override the backoff schedule (tests use millisecond delays).
    #[must_use]
    pub fn with_backoff_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.backoff_schedule = schedule;
        self
    }
}

fn parse_var<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, WebhookError> {
    value
        .trim()
        .parse()
        .map_err(|_| WebhookError::Internal(format!("{var} has invalid value: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> Vec<u8> {
        vec![0x42; 32]
    }

    #[test]
    fn test_defaults() {
        let config = WebhookConfig::new(test_key());
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.max_subscriptions_per_user, 25);
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert!(!config.allow_http);
        assert_eq!(config.backoff_schedule.len(), 5);
    }

    #[test]
    fn test_backoff_schedule_monotonic() {
        let config = WebhookConfig::new(test_key());
        for pair in config.backoff_schedule.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[test]
    fn test_builder_overrides() {
        let config = WebhookConfig::new(test_key())
            .with_max_attempts(3)
            .with_max_subscriptions(2)
            .with_allow_http(true);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.max_subscriptions_per_user, 2);
        assert!(config.allow_http);
    }
}
