//! Error types for the migration system
//!
//! Every failure the runner can produce is a variant of [`MigratorError`],
//! carrying the offending id, filename or path so callers never have to
//! correlate a bare error code with log output.

use thiserror::Error;

use crate::config::ConfigError;
use crate::definitions::MigrationDirection;
use crate::migrator::DbType;

/// Result type alias for migration operations
pub type MigratorResult<T> = Result<T, MigratorError>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigratorError {
    /// Filename does not follow `<id>_<name>_<up|down>.sql`
    #[error("Bad migration filename format: {filename}")]
    BadFilenameFormat { filename: String },

    /// Script content or directory listing could not be read
    #[error("Failed to read asset {path}: {message}")]
    Asset { path: String, message: String },

    /// Tracking table or status type could not be created
    #[error("Failed to create migration tracking schema: {source}")]
    Schema {
        #[source]
        source: sqlx::Error,
    },

    /// Forward or backward script failed; its transaction was rolled back
    #[error("Migration {id} failed while running {direction} script: {source}")]
    Execution {
        id: String,
        direction: MigrationDirection,
        #[source]
        source: sqlx::Error,
    },

    /// Script succeeded but the tracking row could not be written
    #[error("Failed to record state of migration {id}: {source}")]
    Bookkeeping {
        id: String,
        #[source]
        source: sqlx::Error,
    },

    /// Tracking table could not be read
    #[error("Failed to query migrations: {source}")]
    Query {
        #[source]
        source: sqlx::Error,
    },

    /// Transaction for a migration unit could not be started or committed
    #[error("Transaction error for migration {id}: {source}")]
    Transaction {
        id: String,
        #[source]
        source: sqlx::Error,
    },

    /// No tracked migration matches the id in the required state
    #[error("Migration not found: {id}")]
    MigrationNotFound { id: String },

    /// A targeted operation was called with an empty id
    #[error("Migration id is required")]
    MigrationIdRequired,

    /// Requested database kind has no implementation
    #[error("Database not supported: {db_type}")]
    UnsupportedBackend { db_type: DbType },

    /// Connection pool could not be opened
    #[error("Failed to connect to database: {source}")]
    Connection {
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigError),
}

impl MigratorError {
    /// Create a new asset error
    pub fn asset(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Asset {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::MigrationNotFound { id: id.into() }
    }

    /// The migration id this error refers to, if any
    pub fn migration_id(&self) -> Option<&str> {
        match self {
            Self::Execution { id, .. }
            | Self::Bookkeeping { id, .. }
            | Self::Transaction { id, .. }
            | Self::MigrationNotFound { id } => Some(id),
            _ => None,
        }
    }
}
