//! Configuration types for the inspect-debug engine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::Error;

/// Engine configuration loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DebugConfig {
    /// Transport settings
    pub transport: TransportSettings,
    /// Session settings
    pub session: SessionSettings,
    /// Multi-target coordinator settings
    pub coordinator: CoordinatorSettings,
    /// Hang detection settings
    pub hang_detection: HangDetectionSettings,
    /// Target launch settings
    pub launch: LaunchSettings,
}

impl DebugConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: DebugConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        if self.transport.request_timeout_ms == 0 {
            return Err(Error::Config(
                "transport.request_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.transport.connect_timeout_ms == 0 {
            return Err(Error::Config(
                "transport.connect_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.session.max_sessions == 0 {
            return Err(Error::Config("session.max_sessions must be > 0".to_string()));
        }

        if self.session.event_buffer == 0 {
            return Err(Error::Config("session.event_buffer must be > 0".to_string()));
        }

        if self.coordinator.max_log_entries == 0 {
            return Err(Error::Config(
                "coordinator.max_log_entries must be > 0".to_string(),
            ));
        }

        self.hang_detection.validate()?;

        if self.launch.runtime.trim().is_empty() {
            return Err(Error::Config("launch.runtime cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Timeout for establishing the socket in milliseconds
    pub connect_timeout_ms: u64,
    /// Default per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            request_timeout_ms: 10000,
        }
    }
}

impl TransportSettings {
    /// Connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Maximum number of concurrent sessions in a session manager
    pub max_sessions: usize,
    /// How long step and pause operations wait for the target to stop
    pub step_timeout_ms: u64,
    /// Capacity of each session's event channel
    pub event_buffer: usize,
    /// Lines of output retained per session
    pub output_buffer_lines: usize,
    /// Stay paused at the first statement after launch
    pub stop_on_entry: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_sessions: 10,
            step_timeout_ms: 5000,
            event_buffer: 256,
            output_buffer_lines: 1000,
            stop_on_entry: true,
        }
    }
}

/// Multi-target coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    /// Maximum number of aggregated log entries kept (oldest evicted first)
    pub max_log_entries: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            max_log_entries: 1000,
        }
    }
}

/// Hang detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HangDetectionSettings {
    /// Overall time budget in milliseconds
    pub timeout_ms: u64,
    /// Interval between stack samples in milliseconds
    pub sample_interval_ms: u64,
    /// Consecutive identical samples required to call a target hung
    pub min_consecutive_samples: usize,
    /// How long to wait for a forced pause to land, in milliseconds
    pub pause_timeout_ms: u64,
}

impl Default for HangDetectionSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 10000,
            sample_interval_ms: 100,
            min_consecutive_samples: 3,
            pause_timeout_ms: 1000,
        }
    }
}

impl HangDetectionSettings {
    /// Validate hang detection settings.
    pub fn validate(&self) -> crate::Result<()> {
        if self.sample_interval_ms == 0 {
            return Err(Error::Config(
                "hang_detection.sample_interval_ms must be > 0".to_string(),
            ));
        }
        if self.min_consecutive_samples < 2 {
            return Err(Error::Config(
                "hang_detection.min_consecutive_samples must be >= 2".to_string(),
            ));
        }
        if self.sample_interval_ms >= self.timeout_ms {
            return Err(Error::Config(
                "hang_detection.sample_interval_ms must be smaller than timeout_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Target launch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSettings {
    /// Runtime executable used to start programs
    pub runtime: String,
    /// Extra runtime flags placed before the inspect flag
    pub runtime_args: Vec<String>,
    /// How long to wait for the inspector endpoint to be announced, in milliseconds
    pub startup_timeout_ms: u64,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            runtime: "node".to_string(),
            runtime_args: vec![],
            startup_timeout_ms: 10000,
        }
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_default_config() {
        let config = DebugConfig::default();
        assert_eq!(config.transport.request_timeout_ms, 10000);
        assert_eq!(config.session.max_sessions, 10);
        assert_eq!(config.coordinator.max_log_entries, 1000);
        assert_eq!(config.hang_detection.min_consecutive_samples, 3);
        assert_eq!(config.launch.runtime, "node");
    }

    #[test]
    fn test_config_validation() {
        let config = DebugConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_request_timeout() {
        let mut config = DebugConfig::default();
        config.transport.request_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_capacity() {
        let mut config = DebugConfig::default();
        config.coordinator.max_log_entries = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_hang_settings() {
        let mut settings = HangDetectionSettings {
            min_consecutive_samples: 1,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        settings.min_consecutive_samples = 3;
        settings.sample_interval_ms = settings.timeout_ms;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
transport:
  connect_timeout_ms: 2000
  request_timeout_ms: 3000

session:
  max_sessions: 4
  step_timeout_ms: 1500
  stop_on_entry: false

coordinator:
  max_log_entries: 50

hang_detection:
  timeout_ms: 2000
  sample_interval_ms: 100
  min_consecutive_samples: 5

launch:
  runtime: /usr/local/bin/node
  runtime_args:
    - --enable-source-maps
"#;

        let config = DebugConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.transport.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.session.max_sessions, 4);
        assert!(!config.session.stop_on_entry);
        assert_eq!(config.session.event_buffer, 256);
        assert_eq!(config.coordinator.max_log_entries, 50);
        assert_eq!(config.hang_detection.min_consecutive_samples, 5);
        assert_eq!(config.hang_detection.pause_timeout_ms, 1000);
        assert_eq!(config.launch.runtime, "/usr/local/bin/node");
        assert_eq!(config.launch.runtime_args.len(), 1);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let result = DebugConfig::from_yaml("session: [not, a, map]");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
