use std::{env, time::Duration};

/// Backend configuration.
///
/// All knobs are explicit values; [`Config::from_env`] is a convenience
/// loader for deployments that prefer environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file (default: "calvault.db").
    pub sqlite_path: String,
    /// Whether index creation runs at store initialization. Index
    /// creation is idempotent; steady-state production can skip it.
    pub create_indexes: bool,
    /// Scheduling inbox retention in days; 0 disables expiry.
    pub scheduling_retention_days: u32,
    /// How often the scheduling reaper wakes up, in seconds.
    pub reaper_interval_seconds: u64,
    /// Maximum number of cached principal lookups.
    pub principal_cache_entries: usize,
    /// Capacity of the outbound domain-event channel.
    pub event_buffer_size: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SQLITE_PATH` - SQLite database path (default: "calvault.db")
    /// - `CREATE_INDEXES` - run index creation at startup (default: true)
    /// - `SCHEDULING_RETENTION_DAYS` - inbox TTL in days, 0 disables (default: 0)
    /// - `REAPER_INTERVAL_SECONDS` - reaper wake-up period (default: 3600)
    /// - `PRINCIPAL_CACHE_ENTRIES` - principal cache size (default: 1024)
    /// - `EVENT_BUFFER_SIZE` - event channel capacity (default: 256)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sqlite_path: env::var("SQLITE_PATH").unwrap_or(defaults.sqlite_path),
            create_indexes: env::var("CREATE_INDEXES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.create_indexes),
            scheduling_retention_days: env::var("SCHEDULING_RETENTION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.scheduling_retention_days),
            reaper_interval_seconds: env::var("REAPER_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.reaper_interval_seconds),
            principal_cache_entries: env::var("PRINCIPAL_CACHE_ENTRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.principal_cache_entries),
            event_buffer_size: env::var("EVENT_BUFFER_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.event_buffer_size),
        }
    }

    /// Scheduling retention as a Duration, or `None` when expiry is
    /// disabled.
    pub fn scheduling_retention(&self) -> Option<Duration> {
        if self.scheduling_retention_days == 0 {
            return None;
        }
        Some(Duration::from_secs(
            u64::from(self.scheduling_retention_days) * 86_400,
        ))
    }

    /// Reaper wake-up period as a Duration.
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sqlite_path: "calvault.db".to_string(),
            create_indexes: true,
            scheduling_retention_days: 0,
            reaper_interval_seconds: 3_600,
            principal_cache_entries: 1_024,
            event_buffer_size: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();

        assert_eq!(config.sqlite_path, "calvault.db");
        assert!(config.create_indexes);
        assert_eq!(config.scheduling_retention_days, 0);
        assert_eq!(config.principal_cache_entries, 1_024);
        assert_eq!(config.event_buffer_size, 256);
    }

    #[test]
    fn test_retention_disabled_at_zero() {
        let config = Config::default();
        assert_eq!(config.scheduling_retention(), None);
    }

    #[test]
    fn test_retention_in_seconds() {
        let config = Config {
            scheduling_retention_days: 30,
            ..Config::default()
        };
        assert_eq!(
            config.scheduling_retention(),
            Some(Duration::from_secs(30 * 86_400))
        );
    }
}
