//! Worker configuration.

use std::time::Duration;

/// Sizing and shutdown configuration for a `BoundedWorker`.
///
/// Both sizes are fixed for the lifetime of the worker; the pool is never
/// resized.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of items waiting for a thread. Running items, and items
    /// an idle thread is about to take, do not count. Zero admits only as
    /// many items as there are idle threads.
    pub max_queue_size: usize,
    /// Number of pool threads, i.e. the concurrency limit on remote calls.
    pub pool_size: usize,
    /// Grace period for queued and running work to finish after `stop()`.
    pub drain_timeout: Duration,
    /// Second grace period, after queued work is cancelled, for running work.
    pub cancel_timeout: Duration,
    /// Pool threads are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10,
            pool_size: 3,
            drain_timeout: Duration::from_secs(60),
            cancel_timeout: Duration::from_secs(60),
            thread_name_prefix: "convoy-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Convenience constructor with default timeouts.
    #[must_use]
    pub fn new(max_queue_size: usize, pool_size: usize) -> Self {
        Self {
            max_queue_size,
            pool_size,
            ..Self::default()
        }
    }

    /// Checks the configuration before a pool is allocated.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for a zero-sized pool or a zero grace period.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::ZeroPoolSize);
        }
        if self.drain_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                name: "drain_timeout",
            });
        }
        if self.cancel_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                name: "cancel_timeout",
            });
        }
        Ok(())
    }
}

/// Invalid [`WorkerConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("pool_size must be at least 1")]
    ZeroPoolSize,
    #[error("{name} must be greater than zero")]
    ZeroTimeout { name: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_config_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_queue_size, 10);
        assert_eq!(config.pool_size, 3);
        assert_eq!(config.drain_timeout, Duration::from_secs(60));
        assert_eq!(config.cancel_timeout, Duration::from_secs(60));
        assert_eq!(config.thread_name_prefix, "convoy-worker");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn new_keeps_default_timeouts() {
        let config = WorkerConfig::new(0, 8);
        assert_eq!(config.max_queue_size, 0);
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.drain_timeout, Duration::from_secs(60));
        // A zero-length queue is allowed.
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let config = WorkerConfig::new(10, 0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroPoolSize));
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let config = WorkerConfig {
            drain_timeout: Duration::ZERO,
            ..WorkerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroTimeout {
                name: "drain_timeout"
            })
        );

        let config = WorkerConfig {
            cancel_timeout: Duration::ZERO,
            ..WorkerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroTimeout {
                name: "cancel_timeout"
            })
        );
    }
}
