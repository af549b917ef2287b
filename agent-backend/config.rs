use std::path::PathBuf;

pub const DEFAULT_LOG_DIR: &str = "/var/log/activity_agent";

/// Process settings loaded from environment variables.
pub struct Config {
    /// Searched before the standard profile directories.
    pub config_dir: Option<PathBuf>,
    pub log_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_raw_values(
            std::env::var("ACTIVITY_AGENT_CONFIG_DIR").ok().as_deref(),
            std::env::var("ACTIVITY_AGENT_LOG_DIR").ok().as_deref(),
        )
    }

    /// Build a Config from raw string values (as they would come from env vars).
    /// Used directly in tests to avoid mutating process-global environment.
    pub fn from_raw_values(config_dir: Option<&str>, log_dir: Option<&str>) -> Self {
        let config_dir = config_dir
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let log_dir = log_dir
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));

        Config {
            config_dir,
            log_dir,
        }
    }
}
