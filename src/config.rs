//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::analysis::{ClockOffset, StatsConfig};
use crate::ingest::{BinaryFileSink, BroadcastSink, Pipeline, PipelineConfig, TextFileSink};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub sinks: SinksConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Output sinks attached to a logging session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinksConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default = "default_base_name")]
    pub base_name: String,

    #[serde(default = "default_true")]
    pub binary: bool,

    #[serde(default)]
    pub text: bool,

    #[serde(default)]
    pub broadcast: bool,

    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_output_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("contextlog").to_string_lossy().to_string())
        .unwrap_or_else(|| "./contextlog_data".to_string())
}

fn default_base_name() -> String {
    "session".to_string()
}

fn default_true() -> bool {
    true
}

fn default_broadcast_capacity() -> usize {
    1024
}

impl Default for SinksConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            base_name: default_base_name(),
            binary: true,
            text: false,
            broadcast: false,
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

impl SinksConfig {
    /// Attach the enabled sinks to a pipeline
    ///
    /// Returns the broadcast sink's subscriber handle when it is enabled.
    pub fn attach(&self, pipeline: &Pipeline) -> Option<BroadcastSink> {
        if self.binary {
            pipeline.add_sink(Box::new(BinaryFileSink::new(&self.output_dir, &self.base_name)));
        }
        if self.text {
            pipeline.add_sink(Box::new(TextFileSink::new(&self.output_dir, &self.base_name)));
        }
        if !self.broadcast {
            return None;
        }
        let sink = BroadcastSink::new(self.broadcast_capacity);
        pipeline.add_sink(Box::new(sink.clone()));
        Some(sink)
    }
}

/// Analysis defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Fixed offset between event and log clocks; derived from the start
    /// times when absent
    #[serde(default)]
    pub default_clock_offset: Option<i64>,

    #[serde(default = "default_top_n")]
    pub discrete_top_n: usize,

    #[serde(default = "default_coverage")]
    pub continuous_coverage: u32,
}

fn default_top_n() -> usize {
    5
}

fn default_coverage() -> u32 {
    90
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_clock_offset: None,
            discrete_top_n: default_top_n(),
            continuous_coverage: default_coverage(),
        }
    }
}

impl AnalysisConfig {
    pub fn stats(&self) -> StatsConfig {
        StatsConfig {
            discrete_top_n: self.discrete_top_n,
            continuous_coverage: self.continuous_coverage,
        }
    }

    pub fn clock_offset(&self) -> Option<ClockOffset> {
        self.default_clock_offset.map(ClockOffset)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber
    ///
    /// `RUST_LOG` wins over the configured level. Calling this twice is a
    /// no-op.
    pub fn init_tracing(&self) {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&self.level));
        let json = self.format.eq_ignore_ascii_case("json");

        let result = tracing_subscriber::registry()
            .with(filter)
            .with(json.then(|| tracing_subscriber::fmt::layer().json()))
            .with((!json).then(tracing_subscriber::fmt::layer))
            .try_init();

        if let Err(e) = result {
            tracing::debug!("Subscriber already installed: {}", e);
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("contextlog").join("config.toml")),
            Some(PathBuf::from("./contextlog.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("CONTEXTLOG_OUTPUT_DIR") {
            self.sinks.output_dir = dir;
        }
        if let Ok(level) = std::env::var("CONTEXTLOG_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("CONTEXTLOG_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# ContextLog Configuration
#
# Environment variables override these settings:
# - CONTEXTLOG_OUTPUT_DIR
# - CONTEXTLOG_LOG_LEVEL
# - CONTEXTLOG_LOG_FORMAT

[pipeline]
# Queue depth that triggers a backlog warning (0 disables)
queue_warn_threshold = 10000

# Capacity of the sink notice channel
notice_capacity = 64

# Overflow policy: "grow" never rejects samples,
# "drop_newest" rejects new samples while max_depth are queued
[pipeline.overflow]
policy = "grow"
# policy = "drop_newest"
# max_depth = 100000

[sinks]
# Directory the log files are written to
output_dir = "~/.local/share/contextlog"

# Session file name without suffix (<base>.clog / <base>.text.clog)
base_name = "session"

# Enabled outputs
binary = true
text = false
broadcast = false

# Buffered events per broadcast subscriber
broadcast_capacity = 1024

[analysis]
# Fixed event-to-log clock offset; derived from the start times when unset
# default_clock_offset = 0

# Minimum number of integer values reported per signal
discrete_top_n = 5

# Share of float values covered by the reported interval (percent)
continuous_coverage = 90

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::OverflowPolicy;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.pipeline.overflow, OverflowPolicy::Grow);
        assert_eq!(config.pipeline.queue_warn_threshold, 10_000);
        assert_eq!(config.sinks.base_name, "session");
        assert!(config.sinks.binary);
        assert!(!config.sinks.text);
        assert_eq!(config.analysis.discrete_top_n, 5);
        assert_eq!(config.analysis.continuous_coverage, 90);
        assert_eq!(config.analysis.clock_offset(), None);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contextlog.toml");
        std::fs::write(
            &path,
            "[sinks]\ntext = true\n\n[analysis]\ndefault_clock_offset = -250\n\n\
             [pipeline.overflow]\npolicy = \"drop_newest\"\nmax_depth = 8\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert!(config.sinks.text);
        assert!(config.sinks.binary);
        assert_eq!(config.analysis.clock_offset(), Some(ClockOffset(-250)));
        assert_eq!(config.analysis.stats().discrete_top_n, 5);
        assert_eq!(
            config.pipeline.overflow,
            OverflowPolicy::DropNewest { max_depth: 8 }
        );
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(ConfigError::Io { .. })));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[sinks\nbinary = ").unwrap();
        assert!(matches!(Config::load(&broken), Err(ConfigError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_attach_enabled_sinks() {
        let dir = tempfile::tempdir().unwrap();
        let sinks = SinksConfig {
            output_dir: dir.path().to_string_lossy().to_string(),
            base_name: "attached".to_string(),
            binary: true,
            text: true,
            broadcast: true,
            broadcast_capacity: 16,
        };

        let pipeline = Pipeline::start(PipelineConfig::default());
        let broadcast = sinks.attach(&pipeline);
        assert!(broadcast.is_some());
        pipeline.shutdown().await.unwrap();

        assert!(dir.path().join("attached.clog").exists());
        assert!(dir.path().join("attached.text.clog").exists());
    }
}
