use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BunnyError, Result};
use crate::platform::Platform;

/// Frontend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    /// Named build-context handle that COPY sources and the descriptor
    /// are read from
    pub context_name: String,

    /// Platform the graph is marshalled for
    pub target_platform: Platform,

    /// Path of the metadata file written into the image
    pub metadata_path: String,

    /// File mode of the metadata file
    pub metadata_mode: u32,

    /// Working directory recorded in the image config
    pub working_dir: String,

    /// Log level
    pub log_level: LogLevel,

    /// Unix socket of the engine gateway (stdio when unset)
    pub gateway_socket: Option<PathBuf>,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            context_name: "context".to_string(),
            target_platform: Platform::linux_amd64(),
            metadata_path: "/urunc.json".to_string(),
            metadata_mode: 0o644,
            working_dir: "/".to_string(),
            log_level: LogLevel::Warn,
            gateway_socket: None,
        }
    }
}

impl FrontendConfig {
    /// Load configuration from a YAML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BunnyError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: FrontendConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the compiler cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.context_name.trim().is_empty() {
            return Err(BunnyError::Config("context_name must not be empty".to_string()));
        }
        if !self.metadata_path.starts_with('/') {
            return Err(BunnyError::Config(format!(
                "metadata_path must be absolute, got '{}'",
                self.metadata_path
            )));
        }
        if self.metadata_mode > 0o7777 {
            return Err(BunnyError::Config(format!(
                "metadata_mode {:o} is not a valid file mode",
                self.metadata_mode
            )));
        }
        Ok(())
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = FrontendConfig::default();
        assert_eq!(config.context_name, "context");
        assert_eq!(config.target_platform, Platform::linux_amd64());
        assert_eq!(config.metadata_path, "/urunc.json");
        assert_eq!(config.metadata_mode, 0o644);
        assert_eq!(config.working_dir, "/");
        assert!(config.gateway_socket.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "context_name: client-WD").unwrap();
        writeln!(file, "target_platform: linux/arm64").unwrap();
        writeln!(file, "log_level: debug").unwrap();

        let config = FrontendConfig::from_file(file.path()).unwrap();
        assert_eq!(config.context_name, "client-WD");
        assert_eq!(config.target_platform, Platform::new("linux", "arm64"));
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.metadata_path, "/urunc.json");
    }

    #[test]
    fn test_from_file_missing() {
        let result = FrontendConfig::from_file(Path::new("/nonexistent/bunny.yaml"));
        assert!(matches!(result, Err(BunnyError::Config(_))));
    }

    #[test]
    fn test_from_file_bad_platform() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "target_platform: amd64").unwrap();
        assert!(FrontendConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_validate_relative_metadata_path() {
        let config = FrontendConfig {
            metadata_path: "urunc.json".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BunnyError::Config(_))));
    }

    #[test]
    fn test_validate_empty_context() {
        let config = FrontendConfig {
            context_name: " ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_into_tracing() {
        let level: tracing::Level = LogLevel::Info.into();
        assert_eq!(level, tracing::Level::INFO);
    }
}
