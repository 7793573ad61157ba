//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the fundamental types used throughout the migration system including
//! Migration, MigrationRecord and the results of bulk operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MigratorError;

/// A decoded migration unit: one id with its paired up and down scripts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    /// Identifier taken from the filename prefix, e.g. `0007`
    pub id: String,
    /// Human-readable slug taken from the filename
    pub name: String,
    /// Canonical up filename, used to locate both scripts
    pub filename: String,
    /// SQL applied when migrating forward
    pub up_sql: String,
    /// SQL applied when rolling back
    pub down_sql: String,
}

/// Row of the tracking table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: String,
    pub name: String,
    pub filename: String,
    pub up_sql: String,
    pub down_sql: String,
    pub status: MigrationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MigrationRecord {
    /// Whether the forward script is the active state
    pub fn is_up(&self) -> bool {
        self.status == MigrationStatus::Up
    }
}

/// Persisted migration status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    /// Forward script applied
    Up,
    /// Backward script applied
    Down,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Up => "up",
            MigrationStatus::Down => "down",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for MigrationStatus {
    type Err = MigratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(MigrationStatus::Up),
            "down" => Ok(MigrationStatus::Down),
            other => Err(MigratorError::Query {
                source: sqlx::Error::Decode(
                    format!("unknown migration status '{}'", other).into(),
                ),
            }),
        }
    }
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Apply the migration (run UP statements)
    Up,
    /// Rollback the migration (run DOWN statements)
    Down,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationDirection::Up => f.pad("up"),
            MigrationDirection::Down => f.pad("down"),
        }
    }
}

/// Result of running migrations
#[derive(Debug, Default, Clone, Serialize)]
pub struct MigrationRunResult {
    /// IDs of migrations that were applied, in application order
    pub applied_migrations: Vec<String>,
    /// Number of migrations that were skipped (already applied)
    pub skipped_count: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl MigrationRunResult {
    /// Number of migrations that were applied
    pub fn applied_count(&self) -> usize {
        self.applied_migrations.len()
    }
}

/// Result of rolling back migrations
#[derive(Debug, Default, Clone, Serialize)]
pub struct RollbackResult {
    /// IDs of migrations that were rolled back, in rollback order
    pub rolled_back_migrations: Vec<String>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

impl RollbackResult {
    /// Number of migrations that were rolled back
    pub fn rolled_back_count(&self) -> usize {
        self.rolled_back_migrations.len()
    }
}

/// Result of a redo: the rollback step followed by the reapply step
#[derive(Debug, Default, Clone, Serialize)]
pub struct RedoResult {
    pub rolled_back: RollbackResult,
    pub reapplied: MigrationRunResult,
}
