//! Migrator facade
//!
//! [`Migrator`] is the backend-agnostic surface; [`connect`] picks the
//! implementation for the configured [`DbType`].

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::assets::AssetSource;
use crate::config::{ConfigError, MigratorConfig};
use crate::definitions::{MigrationRecord, MigrationRunResult, RedoResult, RollbackResult};
use crate::error::{MigratorError, MigratorResult};
use crate::postgres::PostgresMigrator;

/// Database kinds recognised in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    Postgres,
    MySql,
    Sqlite,
}

impl DbType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::Postgres => "postgres",
            DbType::MySql => "mysql",
            DbType::Sqlite => "sqlite",
        }
    }

    /// Infer the database kind from a connection URL scheme
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .filter(|scheme| !scheme.is_empty() && !scheme.contains(' '))
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "database_url".to_string(),
                value: url.to_string(),
                expected: "URL with a scheme, e.g. postgres://host/db".to_string(),
            })?;
        scheme.parse()
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DbType::Postgres),
            "mysql" | "mariadb" => Ok(DbType::MySql),
            "sqlite" => Ok(DbType::Sqlite),
            _ => Err(ConfigError::InvalidValue {
                field: "db_type".to_string(),
                value: s.to_string(),
                expected: "postgres, mysql, or sqlite".to_string(),
            }),
        }
    }
}

/// Operations every backend implementation provides
#[async_trait]
pub trait Migrator: Send + Sync {
    /// Create the tracking table if it does not exist yet
    async fn init(&self) -> MigratorResult<()>;

    /// Apply every bundled migration that is not currently up
    async fn migrate(&self) -> MigratorResult<MigrationRunResult>;

    /// Revert the latest `steps` applied migrations
    async fn rollback(&self, steps: u32) -> MigratorResult<RollbackResult>;

    /// Revert and re-apply the latest `steps` applied migrations
    async fn redo(&self, steps: u32) -> MigratorResult<RedoResult>;

    /// Tracked migrations, newest id first, optionally filtered by id
    async fn migrations(&self, ids: &[&str]) -> MigratorResult<Vec<MigrationRecord>>;

    /// Re-apply a migration that was taken down
    async fn up(&self, id: &str) -> MigratorResult<()>;

    /// Take down a single applied migration
    async fn down(&self, id: &str) -> MigratorResult<()>;
}

/// Open a migrator for `config`, initialising its tracking table
pub async fn connect(
    config: &MigratorConfig,
    assets: Arc<dyn AssetSource>,
) -> MigratorResult<Box<dyn Migrator>> {
    config.validate()?;

    match config.db_type {
        DbType::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(&config.database_url)
                .await
                .map_err(|source| MigratorError::Connection { source })?;

            info!(db_type = %config.db_type, table = %config.tracking.migrations_table, "connected migrator");

            let migrator =
                PostgresMigrator::from_pool(pool, assets, config.tracking.clone()).await?;
            Ok(Box::new(migrator))
        }
        db_type => Err(MigratorError::UnsupportedBackend { db_type }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::StaticAssets;

    #[test]
    fn test_db_type_parsing() {
        assert_eq!("postgres".parse::<DbType>().unwrap(), DbType::Postgres);
        assert_eq!("PostgreSQL".parse::<DbType>().unwrap(), DbType::Postgres);
        assert_eq!("mariadb".parse::<DbType>().unwrap(), DbType::MySql);
        assert!("oracle".parse::<DbType>().is_err());
    }

    #[test]
    fn test_db_type_from_url() {
        assert_eq!(
            DbType::from_url("postgres://user@localhost/db").unwrap(),
            DbType::Postgres
        );
        assert_eq!(
            DbType::from_url("postgresql://localhost").unwrap(),
            DbType::Postgres
        );
        assert_eq!(DbType::from_url("sqlite::memory:").unwrap(), DbType::Sqlite);
        assert!(DbType::from_url("localhost/db").is_err());
    }

    #[tokio::test]
    async fn test_connect_rejects_unsupported_backend() {
        static EMPTY: StaticAssets = StaticAssets::new(&[]);
        let config = MigratorConfig::new("mysql://localhost/app").unwrap();

        let err = connect(&config, Arc::new(EMPTY)).await.err().unwrap();
        assert!(matches!(
            err,
            MigratorError::UnsupportedBackend {
                db_type: DbType::MySql
            }
        ));
    }

    #[tokio::test]
    async fn test_connect_validates_config_first() {
        static EMPTY: StaticAssets = StaticAssets::new(&[]);
        let config = MigratorConfig::new("postgres://localhost/app")
            .unwrap()
            .with_table("bad name");

        let err = connect(&config, Arc::new(EMPTY)).await.err().unwrap();
        assert!(matches!(err, MigratorError::Configuration(_)));
    }
}
