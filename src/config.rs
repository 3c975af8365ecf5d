//! # Configuration
//!
//! The core receives its configuration as a struct; flag and environment
//! parsing stays in `main.rs`.

use crate::constants::{DEFAULT_CACHE_NAMESPACE, DEFAULT_ERROR_NOTIFY_INTERVAL_HOURS};

/// Runtime configuration for one operator process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace holding the cache-entry backing secrets.
    pub cache_namespace: String,
    /// Minimum hours between repeated error notifications for one identity.
    pub error_notify_interval_hours: i64,
}

impl Config {
    #[must_use]
    pub fn error_notify_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(self.error_notify_interval_hours)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_namespace: DEFAULT_CACHE_NAMESPACE.to_string(),
            error_notify_interval_hours: DEFAULT_ERROR_NOTIFY_INTERVAL_HOURS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache_namespace, "yale-cache");
        assert_eq!(config.error_notify_interval(), chrono::Duration::hours(8));
    }
}
