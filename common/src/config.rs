// Application settings with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default location of the persisted connection store
pub const DEFAULT_CONNECTION_STORE: &str = "Config/configdb.cfg";

/// Main settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub observability: ObservabilityConfig,
}

/// Defaults applied by the data layer when a caller does not override them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// INI file holding persisted connection sections
    pub config_path: String,
    pub retry: u32,
    pub timeout_seconds: u64,
    pub min_connections: usize,
    pub max_connections: usize,
}

impl DatabaseSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            config_path: DEFAULT_CONNECTION_STORE.to_string(),
            retry: 2,
            timeout_seconds: 10,
            min_connections: 1,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// Directory for the log file; console only when unset
    pub log_dir: Option<String>,
    pub log_file: String,
    pub json: bool,
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: Some("logs".to_string()),
            log_file: "msql.log".to_string(),
            json: false,
            metrics_port: None,
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Not committed to git
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.database.config_path.is_empty() {
            return Err("Database config_path cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(
                "Database min_connections cannot exceed max_connections".to_string(),
            );
        }
        if self.database.timeout_seconds == 0 {
            return Err("Database timeout_seconds must be greater than 0".to_string());
        }
        if self.observability.log_file.is_empty() {
            return Err("Observability log_file cannot be empty".to_string());
        }

        Ok(())
    }
}
