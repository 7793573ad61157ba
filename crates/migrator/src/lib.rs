//! # migrator: schema migrations for PostgreSQL
//!
//! Applies and reverts ordered pairs of `<id>_<name>_up.sql` /
//! `<id>_<name>_down.sql` scripts and records the state of every unit in a
//! tracking table (`schema_migrations` by default).
//!
//! Scripts are read through an [`AssetSource`], so they can be compiled into
//! the binary, read from disk, or served by any pair of closures.

pub mod assets;
pub mod config;
pub mod decoder;
pub mod definitions;
pub mod error;
pub mod migrator;
pub mod postgres;
pub mod store;

pub use assets::{AssetSource, DirAssets, EmbeddedAssets, FnAssets, StaticAssets};
pub use config::{ConfigError, MigratorConfig, TrackingOptions};
pub use decoder::{MigrationDecoder, DEFAULT_BASE_DIR};
pub use definitions::{
    Migration, MigrationDirection, MigrationRecord, MigrationRunResult, MigrationStatus,
    RedoResult, RollbackResult,
};
pub use error::{MigratorError, MigratorResult};
pub use migrator::{connect, DbType, Migrator};
pub use postgres::PostgresMigrator;
pub use store::TrackingStore;
