// Registration settings for the log buffer, layered as
// defaults <- logbuf.toml <- LOGBUF_* environment variables

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::errors::{LogBufError, LogBufResult};

pub const DEFAULT_SYNC_FREQUENCY_MILLIS: u64 = 10_000;
pub const DEFAULT_MAXIMUM_LOG_COUNT: usize = 300;
pub const DEFAULT_CONFIG_FILE: &str = "logbuf.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogBufConfig {
    /// Load or create persisted user/device ids at registration
    pub auto_generate_identity: bool,
    pub sync_frequency_millis: u64,
    /// Collector URL. Unset or empty keeps the buffer local-only.
    pub sync_endpoint_url: Option<String>,
    /// Buffer capacity before the oldest half is evicted
    pub maximum_log_count: usize,
    /// Record panics as `Crash` events
    pub capture_panics: bool,
    pub data_dir: PathBuf,
    pub http_timeout_secs: u64,
}

impl Default for LogBufConfig {
    fn default() -> Self {
        Self {
            auto_generate_identity: true,
            sync_frequency_millis: DEFAULT_SYNC_FREQUENCY_MILLIS,
            sync_endpoint_url: None,
            maximum_log_count: DEFAULT_MAXIMUM_LOG_COUNT,
            capture_panics: true,
            data_dir: default_data_dir(),
            http_timeout_secs: 15,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("logbuf"))
        .unwrap_or_else(|| PathBuf::from("./logbuf-data"))
}

impl LogBufConfig {
    /// The configured endpoint, if sync should run at all
    pub fn endpoint(&self) -> Option<&str> {
        self.sync_endpoint_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn sync_frequency(&self) -> Duration {
        Duration::from_millis(self.sync_frequency_millis)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn validate(&self) -> LogBufResult<()> {
        if self.sync_frequency_millis == 0 {
            return Err(LogBufError::config("sync_frequency_millis must be positive"));
        }
        if self.maximum_log_count == 0 {
            return Err(LogBufError::config("maximum_log_count must be at least 1"));
        }
        if self.http_timeout_secs == 0 {
            return Err(LogBufError::config("http_timeout_secs must be positive"));
        }
        Ok(())
    }
}

/// Loads configuration from defaults, an optional TOML file and `LOGBUF_` env vars.
///
/// `path` falls back to `logbuf.toml` in the working directory; a missing
/// file is not an error.
pub fn load_config(path: Option<&Path>) -> LogBufResult<LogBufConfig> {
    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let figment = Figment::from(Serialized::defaults(LogBufConfig::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed("LOGBUF_"));

    let config: LogBufConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_registration_defaults() {
        let config = LogBufConfig::default();
        assert!(config.auto_generate_identity);
        assert_eq!(config.sync_frequency_millis, 10_000);
        assert_eq!(config.maximum_log_count, 300);
        assert_eq!(config.endpoint(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn blank_endpoint_disables_sync() {
        let config = LogBufConfig {
            sync_endpoint_url: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(config.endpoint(), None);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logbuf.toml");
        fs::write(
            &path,
            "sync_endpoint_url = \"https://collector.example/logs\"\nmaximum_log_count = 40\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.endpoint(), Some("https://collector.example/logs"));
        assert_eq!(config.maximum_log_count, 40);
        assert_eq!(config.sync_frequency_millis, DEFAULT_SYNC_FREQUENCY_MILLIS);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logbuf.toml");
        fs::write(&path, "maximum_log_count = 0\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("maximum_log_count"));
    }
}
