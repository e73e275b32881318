use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration for FieldGraph
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FieldGraphConfig {
    /// Ownership resolution and cycle classification settings
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    /// The platform's own built-in modules, pinned at priority 0
    #[serde(default = "default_bootstrap_modules")]
    pub bootstrap_modules: Vec<String>,

    /// Priority given to modules with no dependency declaration
    #[serde(default = "default_unknown_module_priority")]
    pub unknown_module_priority: f64,

    /// Detection count above which a cycle is reported as likely spurious
    #[serde(default = "default_spurious_cycle_threshold")]
    pub spurious_cycle_threshold: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bootstrap_modules: default_bootstrap_modules(),
            unknown_module_priority: default_unknown_module_priority(),
            spurious_cycle_threshold: default_spurious_cycle_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty" or "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_bootstrap_modules() -> Vec<String> {
    vec!["base".to_string(), "web".to_string()]
}
fn default_unknown_module_priority() -> f64 {
    1000.0
}
fn default_spurious_cycle_threshold() -> usize {
    50
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with defaults, config file discovery and env overrides
pub struct ConfigManager {
    config: FieldGraphConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.fieldgraph.toml)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!("Config file: {}", path.display()),
            None => info!("Config file: none, using defaults"),
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load an explicit config file; env overrides still apply.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::apply_env_overrides(Self::read_toml_file(path)?);
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    pub fn from_config(config: FieldGraphConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            }
        }
    }

    /// Search order:
    /// 1. ./.fieldgraph.toml
    /// 2. ~/.fieldgraph/config.toml
    fn load_config_file() -> Result<(FieldGraphConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".fieldgraph.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".fieldgraph").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((FieldGraphConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<FieldGraphConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_env_overrides(mut config: FieldGraphConfig) -> FieldGraphConfig {
        if let Ok(modules) = std::env::var("FIELDGRAPH_BOOTSTRAP_MODULES") {
            config.analysis.bootstrap_modules = modules
                .split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
        }
        if let Ok(priority) = std::env::var("FIELDGRAPH_UNKNOWN_MODULE_PRIORITY") {
            match priority.parse() {
                Ok(p) => config.analysis.unknown_module_priority = p,
                Err(_) => warn!("Ignoring FIELDGRAPH_UNKNOWN_MODULE_PRIORITY={}", priority),
            }
        }
        if let Ok(threshold) = std::env::var("FIELDGRAPH_SPURIOUS_CYCLE_THRESHOLD") {
            match threshold.parse() {
                Ok(t) => config.analysis.spurious_cycle_threshold = t,
                Err(_) => warn!("Ignoring FIELDGRAPH_SPURIOUS_CYCLE_THRESHOLD={}", threshold),
            }
        }
        if let Ok(level) = std::env::var("FIELDGRAPH_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("FIELDGRAPH_LOG_FORMAT") {
            config.logging.format = format;
        }
        config
    }

    fn validate_config(config: &FieldGraphConfig) -> Result<(), ConfigError> {
        let analysis = &config.analysis;
        if analysis.bootstrap_modules.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one bootstrap module is required".to_string(),
            ));
        }
        if analysis.bootstrap_modules.iter().any(|m| m.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "bootstrap module names must not be empty".to_string(),
            ));
        }
        if !analysis.unknown_module_priority.is_finite() || analysis.unknown_module_priority <= 0.0
        {
            return Err(ConfigError::ValidationError(format!(
                "unknown_module_priority must be a positive number, got {}",
                analysis.unknown_module_priority
            )));
        }
        if analysis.spurious_cycle_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "spurious_cycle_threshold must be at least 1".to_string(),
            ));
        }
        if !matches!(config.logging.format.as_str(), "pretty" | "compact") {
            return Err(ConfigError::ValidationError(format!(
                "unknown log format '{}'",
                config.logging.format
            )));
        }
        Ok(())
    }

    pub fn config(&self) -> &FieldGraphConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn into_config(self) -> FieldGraphConfig {
        self.config
    }

    /// Write the active configuration as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(&self.config)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        std::fs::write(path, toml).map_err(|e| ConfigError::ReadError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let manager = ConfigManager::from_config(FieldGraphConfig::default()).unwrap();
        let analysis = &manager.config().analysis;
        assert_eq!(analysis.bootstrap_modules, vec!["base", "web"]);
        assert_eq!(analysis.unknown_module_priority, 1000.0);
        assert_eq!(analysis.spurious_cycle_threshold, 50);
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let mut config = FieldGraphConfig::default();
        config.analysis.spurious_cycle_threshold = 0;
        assert!(matches!(
            ConfigManager::from_config(config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: FieldGraphConfig =
            toml::from_str("[analysis]\nspurious_cycle_threshold = 10\n").unwrap();
        assert_eq!(config.analysis.spurious_cycle_threshold, 10);
        assert_eq!(config.analysis.unknown_module_priority, 1000.0);
        assert_eq!(config.logging.format, "pretty");
    }
}
