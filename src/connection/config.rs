use crate::core::{DatabaseId, FrameworkError, Result};
use crate::storage::{Database, MemoryDatabase};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// Configuration of one logical database
///
/// Similar to a PostgreSQL/MySQL connection string. The only backend
/// shipped with the crate is `memory://<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Secondary database name; `None` for the primary database
    #[serde(default)]
    pub name: Option<String>,

    /// Backend URL
    pub url: String,

    /// Whether a transaction is begun as soon as the connection opens
    #[serde(default = "default_automatic_transactions")]
    pub automatic_transactions: bool,
}

fn default_automatic_transactions() -> bool {
    true
}

impl DatabaseConfig {
    pub fn primary(url: &str) -> Self {
        Self {
            name: None,
            url: url.to_string(),
            automatic_transactions: true,
        }
    }

    pub fn secondary(name: &str, url: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            url: url.to_string(),
            automatic_transactions: true,
        }
    }

    /// Set whether transactions begin automatically
    pub fn automatic_transactions(mut self, enabled: bool) -> Self {
        self.automatic_transactions = enabled;
        self
    }

    pub fn id(&self) -> DatabaseId {
        DatabaseId::from_name(self.name.as_deref())
    }

    /// Parse from connection string
    ///
    /// Format: "memory://backend?database=name&automatic_transactions=false"
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = DatabaseConfig::from_url("memory://reporting?database=reporting")?;
    /// ```
    pub fn from_url(url: &str) -> std::result::Result<Self, String> {
        let parsed = Url::parse(url).map_err(|e| format!("Invalid URL: {}", e))?;
        if parsed.scheme() != "memory" {
            return Err("URL must start with 'memory://'".to_string());
        }

        let mut config = Self::primary(url);
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "database" => config.name = Some(value.into_owned()).filter(|n| !n.is_empty()),
                "automatic_transactions" => {
                    config.automatic_transactions = value
                        .parse()
                        .map_err(|_| format!("Invalid automatic_transactions value '{}'", value))?
                }
                other => return Err(format!("Unknown URL parameter '{}'", other)),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Name of the backend store the URL points at
    pub fn backend_name(&self) -> std::result::Result<String, String> {
        let parsed = Url::parse(&self.url).map_err(|e| format!("Invalid URL: {}", e))?;
        parsed
            .host_str()
            .filter(|host| !host.is_empty())
            .map(str::to_string)
            .ok_or_else(|| "URL must name a backend".to_string())
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.url.starts_with("memory://") {
            return Err("URL must start with 'memory://'".to_string());
        }
        self.backend_name()?;

        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err("Secondary database name cannot be blank".to_string());
            }
        }

        Ok(())
    }
}

/// A database the application can connect to
#[derive(Clone)]
pub struct RegisteredDatabase {
    pub id: DatabaseId,
    pub backend: Arc<dyn Database>,
    pub automatic_transactions: bool,
}

/// The application's logical databases, in registration order
#[derive(Clone, Default)]
pub struct DatabaseRegistry {
    databases: Vec<RegisteredDatabase>,
}

impl DatabaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under a database id
    pub fn with_database(
        mut self,
        id: DatabaseId,
        backend: Arc<dyn Database>,
        automatic_transactions: bool,
    ) -> Result<Self> {
        if self.get(&id).is_some() {
            return Err(FrameworkError::Config(format!("{} is registered twice", id)));
        }
        self.databases.push(RegisteredDatabase {
            id,
            backend,
            automatic_transactions,
        });
        Ok(self)
    }

    /// Build a registry from configuration, creating one in-memory backend
    /// per distinct backend name
    pub fn from_configs(configs: &[DatabaseConfig]) -> Result<Self> {
        let mut backends: Vec<(String, MemoryDatabase)> = Vec::new();
        let mut registry = Self::new();

        for config in configs {
            config.validate().map_err(FrameworkError::Config)?;
            let backend_name = config.backend_name().map_err(FrameworkError::Config)?;
            let backend = match backends.iter().find(|(name, _)| *name == backend_name) {
                Some((_, db)) => db.clone(),
                None => {
                    let db = MemoryDatabase::new(backend_name.clone());
                    backends.push((backend_name, db.clone()));
                    db
                }
            };
            registry =
                registry.with_database(config.id(), Arc::new(backend), config.automatic_transactions)?;
        }

        Ok(registry)
    }

    pub fn get(&self, id: &DatabaseId) -> Option<&RegisteredDatabase> {
        self.databases.iter().find(|db| &db.id == id)
    }

    pub fn has_primary(&self) -> bool {
        self.get(&DatabaseId::Primary).is_some()
    }

    pub fn ids(&self) -> impl Iterator<Item = &DatabaseId> {
        self.databases.iter().map(|db| &db.id)
    }

    pub fn len(&self) -> usize {
        self.databases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }
}
