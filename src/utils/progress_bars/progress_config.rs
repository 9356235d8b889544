// src/utils/progress_bars/progress_config.rs

use indicatif::MultiProgress;
use std::env;

/// Configuration for progress reporting during a matching run
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Whether to show progress bars at all
    pub enabled: bool,
    /// Whether to show per-partition detail lines
    pub detailed: bool,
    /// Whether to show memory usage in the run summary
    pub show_memory: bool,
    /// Whether to show database connection pool statistics
    pub show_db_connection_stats: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detailed: true,
            show_memory: true,
            show_db_connection_stats: true,
        }
    }
}

impl ProgressConfig {
    /// Create progress configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            enabled: env::var("PROGRESS_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            detailed: env::var("PROGRESS_DETAILED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            show_memory: env::var("PROGRESS_SHOW_MEMORY")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            show_db_connection_stats: env::var("PROGRESS_SHOW_DB_CONNECTIONS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        }
    }

    /// Create a MultiProgress instance if progress is enabled, None otherwise
    pub fn create_multi_progress(&self) -> Option<MultiProgress> {
        if self.enabled {
            Some(MultiProgress::new())
        } else {
            None
        }
    }

    pub fn should_show_detailed(&self) -> bool {
        self.enabled && self.detailed
    }

    pub fn should_show_memory(&self) -> bool {
        self.enabled && self.show_memory
    }

    pub fn should_show_db_connection_stats(&self) -> bool {
        self.enabled && self.show_db_connection_stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = ProgressConfig::default();
        assert!(config.enabled);
        assert!(config.detailed);
        assert!(config.show_memory);
        assert!(config.show_db_connection_stats);
    }

    #[test]
    fn test_env_config() {
        env::set_var("PROGRESS_ENABLED", "false");
        env::set_var("PROGRESS_DETAILED", "false");
        env::set_var("PROGRESS_SHOW_MEMORY", "false");
        env::set_var("PROGRESS_SHOW_DB_CONNECTIONS", "false");

        let config = ProgressConfig::from_env();
        assert!(!config.enabled);
        assert!(!config.detailed);
        assert!(!config.show_memory);
        assert!(!config.show_db_connection_stats);

        env::remove_var("PROGRESS_ENABLED");
        env::remove_var("PROGRESS_DETAILED");
        env::remove_var("PROGRESS_SHOW_MEMORY");
        env::remove_var("PROGRESS_SHOW_DB_CONNECTIONS");
    }

    #[test]
    fn test_disabled_gates_everything() {
        let mut config = ProgressConfig::default();
        config.enabled = false;
        assert!(config.create_multi_progress().is_none());
        assert!(!config.should_show_detailed());
        assert!(!config.should_show_memory());
        assert!(!config.should_show_db_connection_stats());
    }
}
