// ============================================================================
// Installation and application configuration
// ============================================================================

use crate::connection::DatabaseConfig;
use crate::core::{FrameworkError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Requests slower than this are reported outside development
pub const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallationType {
    Development,
    Intermediate,
    Live,
}

impl InstallationType {
    pub fn is_development(&self) -> bool {
        matches!(self, InstallationType::Development)
    }

    pub fn is_intermediate(&self) -> bool {
        matches!(self, InstallationType::Intermediate)
    }
}

/// Facts about the running installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationConfig {
    pub system_name: String,
    pub installation_type: InstallationType,

    /// Whether pages requiring security are served over HTTPS
    #[serde(default)]
    pub supports_secure_connections: bool,

    #[serde(default)]
    pub is_standby_server: bool,
}

impl InstallationConfig {
    pub fn new(system_name: &str, installation_type: InstallationType) -> Self {
        Self {
            system_name: system_name.to_string(),
            installation_type,
            supports_secure_connections: false,
            is_standby_server: false,
        }
    }

    pub fn development(system_name: &str) -> Self {
        Self::new(system_name, InstallationType::Development)
    }

    /// Set secure connection support
    pub fn supports_secure_connections(mut self, supported: bool) -> Self {
        self.supports_secure_connections = supported;
        self
    }

    /// Set standby mode
    pub fn standby_server(mut self, standby: bool) -> Self {
        self.is_standby_server = standby;
        self
    }

    pub fn is_development(&self) -> bool {
        self.installation_type.is_development()
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.system_name.trim().is_empty() {
            return Err("System name cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Configuration document read by the binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub installation: InstallationConfig,

    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Most sessions the host keeps; the least recently used are evicted
    #[serde(default = "default_session_capacity")]
    pub session_capacity: usize,
}

fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_session_capacity() -> usize {
    10_000
}

impl AppConfig {
    pub fn new(installation: InstallationConfig) -> Self {
        Self {
            installation,
            databases: Vec::new(),
            bind_address: default_bind_address(),
            session_capacity: default_session_capacity(),
        }
    }

    /// Add a database
    pub fn database(mut self, database: DatabaseConfig) -> Self {
        self.databases.push(database);
        self
    }

    /// Set the bind address
    pub fn bind_address(mut self, address: &str) -> Self {
        self.bind_address = address.to_string();
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| FrameworkError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate().map_err(FrameworkError::Config)?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            FrameworkError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.installation.validate()?;
        for database in &self.databases {
            database.validate()?;
        }
        if self.session_capacity == 0 {
            return Err("Session capacity must be greater than zero".to_string());
        }
        if !self.databases.is_empty() && !self.databases.iter().any(|db| db.name.is_none()) {
            return Err("Secondary databases require a primary database".to_string());
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new(InstallationConfig::development("ewfcore"))
            .database(DatabaseConfig::primary("memory://main"))
    }
}
