//! Migrator configuration
//!
//! Loaded from environment variables with defaults, then validated before a
//! connection is opened. Table and type names end up interpolated into SQL, so
//! validation restricts them to plain identifiers.

use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::decoder::DEFAULT_BASE_DIR;
use crate::migrator::DbType;

pub const DEFAULT_MIGRATIONS_TABLE: &str = "schema_migrations";
pub const DEFAULT_STATUS_TYPE: &str = "migration_status_type";

/// Naming of the tracking objects inside the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingOptions {
    /// Table for tracking migrations
    pub migrations_table: String,
    /// Enum type backing the status column
    pub status_type: String,
    /// Directory, inside the asset source, holding the scripts
    pub base_dir: String,
}

impl Default for TrackingOptions {
    fn default() -> Self {
        Self {
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            status_type: DEFAULT_STATUS_TYPE.to_string(),
            base_dir: DEFAULT_BASE_DIR.to_string(),
        }
    }
}

impl TrackingOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier("migrations_table", &self.migrations_table)?;
        validate_identifier("status_type", &self.status_type)?;
        if self.base_dir.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "base_dir".to_string(),
                reason: "Base directory cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Full configuration of a migrator instance
#[derive(Debug, Clone)]
pub struct MigratorConfig {
    pub database_url: String,
    pub db_type: DbType,
    pub max_connections: u32,
    pub tracking: TrackingOptions,
}

impl MigratorConfig {
    /// Configuration for `database_url`, inferring the backend from its scheme
    pub fn new(database_url: impl Into<String>) -> Result<Self, ConfigError> {
        let database_url = database_url.into();
        let db_type = DbType::from_url(&database_url)?;
        Ok(Self {
            database_url,
            db_type,
            max_connections: 1,
            tracking: TrackingOptions::default(),
        })
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = get_env_required("DATABASE_URL")?;
        let db_type = match get_env_optional("MIGRATOR_DB_TYPE") {
            Some(value) => DbType::from_str(&value)?,
            None => DbType::from_url(&database_url)?,
        };

        let max_connections = get_env_or_default("MIGRATOR_MAX_CONNECTIONS", "1");
        let max_connections = max_connections
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidValue {
                field: "max_connections".to_string(),
                value: max_connections,
                expected: "positive integer".to_string(),
            })?;

        let tracking = TrackingOptions {
            migrations_table: get_env_or_default("MIGRATOR_TABLE", DEFAULT_MIGRATIONS_TABLE),
            status_type: get_env_or_default("MIGRATOR_STATUS_TYPE", DEFAULT_STATUS_TYPE),
            base_dir: get_env_or_default("MIGRATOR_BASE_DIR", DEFAULT_BASE_DIR),
        };

        Ok(Self {
            database_url,
            db_type,
            max_connections,
            tracking,
        })
    }

    pub fn with_db_type(mut self, db_type: DbType) -> Self {
        self.db_type = db_type;
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.tracking.migrations_table = table.into();
        self
    }

    pub fn with_status_type(mut self, status_type: impl Into<String>) -> Self {
        self.tracking.status_type = status_type.into();
        self
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<String>) -> Self {
        self.tracking.base_dir = base_dir.into();
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "database_url".to_string(),
                reason: "Database URL cannot be empty".to_string(),
            });
        }

        if self.max_connections == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "max_connections".to_string(),
                reason: "At least one connection is required".to_string(),
            });
        }

        self.tracking.validate()
    }
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`, optionally schema-qualified once
fn validate_identifier(field: &str, value: &str) -> Result<(), ConfigError> {
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    let parts: Vec<&str> = value.split('.').collect();
    if parts.len() > 2 || !parts.iter().all(|part| valid_part(part)) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            expected: "SQL identifier (letters, digits, underscores)".to_string(),
        });
    }
    Ok(())
}

// Helper functions for environment variable handling
fn get_env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar {
        var: key.to_string(),
    })
}

fn get_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn get_env_or_default(key: &str, default: &str) -> String {
    get_env_optional(key).unwrap_or_else(|| default.to_string())
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: String },

    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },
}
