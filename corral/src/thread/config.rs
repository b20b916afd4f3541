use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::thread::error::{PoolError, PoolResult};

/// Name given to pools that were not configured with one.
pub const DEFAULT_POOL_NAME: &str = "default-threadpool";

/// How long an idle worker waits for work before re-evaluating whether to keep
/// running.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(120_000);

// --- Configuration Enums ---

/// What a worker does when its wait for work times out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdlePolicy {
    /// Keep waiting. The idle timeout only bounds how long a worker sleeps
    /// between checks of its close flag; the pool never shrinks on its own.
    #[default]
    KeepAlive,
    /// Exit after a timed-out wait, as long as the pool stays at or above its
    /// minimum thread count.
    Retire,
}

// --- Pool Configuration ---

/// Configuration for a `ThreadPool`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadPoolConfig {
    /// Pool name, used in worker thread names and log fields.
    pub name: String,

    /// Workers created eagerly when the pool is built.
    pub min_threads: usize,

    /// Upper bound on worker threads. `None` makes the pool unbounded.
    pub max_threads: Option<usize>,

    /// Maximum time a worker blocks waiting for new work.
    #[serde(rename = "idle_timeout_ms", with = "duration_millis")]
    pub idle_timeout: Duration,

    /// Behaviour of a worker whose wait timed out.
    pub idle_policy: IdlePolicy,

    /// Maximum number of queued items. `None` leaves the queue unbounded.
    pub max_pending: Option<usize>,

    /// Stack size for worker threads; the platform default when `None`.
    pub thread_stack_size: Option<usize>,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_POOL_NAME.to_string(),
            min_threads: 0,
            max_threads: None,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            idle_policy: IdlePolicy::KeepAlive,
            max_pending: None,
            thread_stack_size: None,
        }
    }
}

impl ThreadPoolConfig {
    /// Bounded pool: `min` workers up front, never more than `max`.
    pub fn bounded(min: usize, max: usize, idle_timeout: Duration) -> Self {
        Self {
            min_threads: min,
            max_threads: Some(max),
            idle_timeout,
            ..Default::default()
        }
    }

    /// Unbounded pool with no eager workers.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Exactly `threads` workers, all created up front.
    pub fn fixed(threads: usize) -> Self {
        Self::bounded(threads, threads, DEFAULT_IDLE_TIMEOUT)
    }

    /// One worker per logical CPU.
    pub fn per_cpu() -> Self {
        Self::fixed(num_cpus::get())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_idle_policy(mut self, idle_policy: IdlePolicy) -> Self {
        self.idle_policy = idle_policy;
        self
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = Some(max_pending);
        self
    }

    pub fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    pub fn is_bounded(&self) -> bool {
        self.max_threads.is_some()
    }

    /// Loads a configuration from JSON. Missing fields take their defaults.
    ///
    /// ```rust
    /// use corral::thread::config::ThreadPoolConfig;
    ///
    /// let config = ThreadPoolConfig::from_json_str(
    ///     r#"{ "name": "io", "min_threads": 2, "max_threads": 8, "idle_timeout_ms": 5000 }"#,
    /// ).unwrap();
    /// assert_eq!(config.max_threads, Some(8));
    /// ```
    pub fn from_json_str(json: &str) -> PoolResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PoolError::InvalidConfig(format!("malformed JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values a pool cannot run with.
    pub fn validate(&self) -> PoolResult<()> {
        if self.name.trim().is_empty() {
            return Err(PoolError::InvalidConfig("pool name must not be empty".to_string()));
        }
        if let Some(max) = self.max_threads {
            if max == 0 {
                return Err(PoolError::InvalidConfig("max_threads must be at least 1".to_string()));
            }
            if self.min_threads > max {
                return Err(PoolError::InvalidConfig(format!(
                    "min_threads ({}) exceeds max_threads ({})",
                    self.min_threads, max
                )));
            }
        }
        if self.idle_timeout.is_zero() {
            return Err(PoolError::InvalidConfig("idle_timeout must be non-zero".to_string()));
        }
        if self.max_pending == Some(0) {
            return Err(PoolError::InvalidConfig("max_pending must be at least 1".to_string()));
        }
        Ok(())
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unbounded() {
        let config = ThreadPoolConfig::default();
        assert_eq!(config.name, DEFAULT_POOL_NAME);
        assert_eq!(config.min_threads, 0);
        assert!(!config.is_bounded());
        assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
        assert_eq!(config.idle_policy, IdlePolicy::KeepAlive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_min_above_max_rejected() {
        let config = ThreadPoolConfig::bounded(5, 2, Duration::from_secs(1));
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid thread pool configuration: min_threads (5) exceeds max_threads (2)"
        );
    }

    #[test]
    fn test_zero_values_rejected() {
        assert!(ThreadPoolConfig::bounded(0, 0, Duration::from_secs(1)).validate().is_err());
        assert!(ThreadPoolConfig::unbounded()
            .with_idle_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(ThreadPoolConfig::unbounded().with_max_pending(0).validate().is_err());
        assert!(ThreadPoolConfig::unbounded().with_name("  ").validate().is_err());
    }

    #[test]
    fn test_fixed_and_per_cpu() {
        let fixed = ThreadPoolConfig::fixed(3);
        assert_eq!(fixed.min_threads, 3);
        assert_eq!(fixed.max_threads, Some(3));

        let per_cpu = ThreadPoolConfig::per_cpu();
        assert_eq!(per_cpu.max_threads, Some(num_cpus::get()));
        assert!(per_cpu.validate().is_ok());
    }

    #[test]
    fn test_json_uses_millis_and_defaults() {
        let config = ThreadPoolConfig::from_json_str(
            r#"{ "name": "io", "min_threads": 1, "max_threads": 4, "idle_timeout_ms": 2000, "idle_policy": "Retire" }"#,
        )
        .unwrap();
        assert_eq!(config.name, "io");
        assert_eq!(config.idle_timeout, Duration::from_secs(2));
        assert_eq!(config.idle_policy, IdlePolicy::Retire);
        assert_eq!(config.max_pending, None);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["idle_timeout_ms"], 2000);
    }

    #[test]
    fn test_json_invalid_bounds_rejected() {
        let err = ThreadPoolConfig::from_json_str(r#"{ "min_threads": 4, "max_threads": 1 }"#)
            .unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));

        let err = ThreadPoolConfig::from_json_str("{ not json").unwrap_err();
        assert!(err.to_string().contains("malformed JSON"));
    }
}
