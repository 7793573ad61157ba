//! Tracking Store - the bookkeeping table of applied migrations
//!
//! One row per migration id, compared case-insensitively through a unique index
//! on `lower(id)`. Reads accept any executor; writes take the connection of the
//! caller's transaction so they commit or roll back together with the script
//! they describe.

use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Executor, Postgres, Row};
use tracing::debug;

use crate::config::TrackingOptions;
use crate::definitions::{Migration, MigrationRecord, MigrationStatus};
use crate::error::{MigratorError, MigratorResult};

const RECORD_COLUMNS: &str =
    "id, name, filename, up, down, status::text AS status, created_at, updated_at";

/// Access to the migrations tracking table
#[derive(Debug, Clone)]
pub struct TrackingStore {
    table: String,
    status_type: String,
}

impl TrackingStore {
    pub fn new(options: &TrackingOptions) -> Self {
        Self {
            table: options.migrations_table.clone(),
            status_type: options.status_type.clone(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the status type, the table and its case-insensitive index if absent
    pub async fn ensure_schema<'c, E>(&self, executor: E) -> MigratorResult<()>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let sql = self.create_schema_sql();
        executor
            .execute(sql.as_str())
            .await
            .map_err(|source| MigratorError::Schema { source })?;
        debug!(table = %self.table, "migration tracking schema ready");
        Ok(())
    }

    /// Records matching `ids` (all records when empty), newest id first
    pub async fn find<'c, E>(&self, executor: E, ids: &[&str]) -> MigratorResult<Vec<MigrationRecord>>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let sql = self.find_sql(!ids.is_empty());
        let mut query = sqlx::query(&sql);
        if !ids.is_empty() {
            let lowered: Vec<String> = ids.iter().map(|id| id.to_lowercase()).collect();
            query = query.bind(lowered);
        }

        let rows = query
            .fetch_all(executor)
            .await
            .map_err(|source| MigratorError::Query { source })?;

        rows.iter().map(record_from_row).collect()
    }

    /// Up to `limit` applied records, newest id first, optionally restricted to one id
    pub async fn find_latest_applied<'c, E>(
        &self,
        executor: E,
        limit: i64,
        id: Option<&str>,
    ) -> MigratorResult<Vec<MigrationRecord>>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let sql = self.find_latest_applied_sql(id.is_some());
        let mut query = sqlx::query(&sql).bind(limit);
        if let Some(id) = id {
            query = query.bind(id);
        }

        let rows = query
            .fetch_all(executor)
            .await
            .map_err(|source| MigratorError::Query { source })?;

        rows.iter().map(record_from_row).collect()
    }

    /// Insert a fresh record for `migration`
    pub async fn insert(
        &self,
        conn: &mut PgConnection,
        migration: &Migration,
        status: MigrationStatus,
    ) -> MigratorResult<()> {
        let sql = self.insert_sql();
        let result = sqlx::query(&sql)
            .bind(&migration.id)
            .bind(&migration.name)
            .bind(&migration.filename)
            .bind(&migration.up_sql)
            .bind(&migration.down_sql)
            .bind(status.as_str())
            .execute(conn)
            .await
            .map_err(|source| bookkeeping(&migration.id, source))?;

        expect_one_row(&migration.id, result.rows_affected())
    }

    /// Set status and script text of an existing record
    pub async fn update_status(
        &self,
        conn: &mut PgConnection,
        id: &str,
        status: MigrationStatus,
        up_sql: &str,
        down_sql: &str,
    ) -> MigratorResult<()> {
        let sql = self.update_status_sql();
        let result = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(up_sql)
            .bind(down_sql)
            .bind(id)
            .execute(conn)
            .await
            .map_err(|source| bookkeeping(id, source))?;

        expect_one_row(id, result.rows_affected())
    }

    /// Remove the record for `id`
    pub async fn delete_by_id(&self, conn: &mut PgConnection, id: &str) -> MigratorResult<()> {
        let sql = self.delete_sql();
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(conn)
            .await
            .map_err(|source| bookkeeping(id, source))?;

        expect_one_row(id, result.rows_affected())
    }

    /// SQL to create the migrations tracking schema
    pub fn create_schema_sql(&self) -> String {
        format!(
            "DO $$\n\
             BEGIN\n    \
                 IF to_regtype('{status}') IS NULL THEN\n        \
                     CREATE TYPE {status} AS ENUM ('up', 'down');\n    \
                 END IF;\n\
             END$$;\n\n\
             CREATE TABLE IF NOT EXISTS {table} (\n    \
                 id          text        NOT NULL,\n    \
                 name        text        NOT NULL,\n    \
                 filename    text        NOT NULL,\n    \
                 up          text        NOT NULL,\n    \
                 down        text        NOT NULL,\n    \
                 status      {status}    NOT NULL,\n    \
                 created_at  timestamptz NOT NULL DEFAULT current_timestamp,\n    \
                 updated_at  timestamptz NOT NULL DEFAULT current_timestamp,\n    \
                 PRIMARY KEY (id)\n\
             );\n\n\
             CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {table} (lower(id));",
            status = self.status_type,
            table = self.table,
            index = self.index_name(),
        )
    }

    /// SQL to list records, optionally filtered by an array of lowercased ids
    pub fn find_sql(&self, filtered: bool) -> String {
        let filter = if filtered { " WHERE lower(id) = ANY($1)" } else { "" };
        format!(
            "SELECT {} FROM {}{} ORDER BY lower(id) DESC",
            RECORD_COLUMNS, self.table, filter
        )
    }

    /// SQL to select the latest applied records
    pub fn find_latest_applied_sql(&self, by_id: bool) -> String {
        let filter = if by_id { " AND lower(id) = lower($2)" } else { "" };
        format!(
            "SELECT {} FROM {} WHERE status = 'up'{} ORDER BY lower(id) DESC LIMIT $1",
            RECORD_COLUMNS, self.table, filter
        )
    }

    /// SQL to record a migration
    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (id, name, filename, up, down, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, CAST($6 AS {}), now(), now())",
            self.table, self.status_type
        )
    }

    /// SQL to update the status of a migration
    pub fn update_status_sql(&self) -> String {
        format!(
            "UPDATE {} SET status = CAST($1 AS {}), up = $2, down = $3, updated_at = now() \
             WHERE lower(id) = lower($4)",
            self.table, self.status_type
        )
    }

    /// SQL to remove a migration record
    pub fn delete_sql(&self) -> String {
        format!("DELETE FROM {} WHERE lower(id) = lower($1)", self.table)
    }

    fn index_name(&self) -> String {
        let bare = self.table.rsplit('.').next().unwrap_or(&self.table);
        format!("{}_lower_id_idx", bare)
    }
}

fn bookkeeping(id: &str, source: sqlx::Error) -> MigratorError {
    MigratorError::Bookkeeping {
        id: id.to_string(),
        source,
    }
}

fn expect_one_row(id: &str, rows_affected: u64) -> MigratorResult<()> {
    if rows_affected == 1 {
        Ok(())
    } else {
        Err(bookkeeping(id, sqlx::Error::RowNotFound))
    }
}

fn record_from_row(row: &PgRow) -> MigratorResult<MigrationRecord> {
    let get = |column: &str| -> MigratorResult<String> {
        row.try_get(column)
            .map_err(|source| MigratorError::Query { source })
    };

    let status: MigrationStatus = get("status")?.parse()?;
    Ok(MigrationRecord {
        id: get("id")?,
        name: get("name")?,
        filename: get("filename")?,
        up_sql: get("up")?,
        down_sql: get("down")?,
        status,
        created_at: row
            .try_get("created_at")
            .map_err(|source| MigratorError::Query { source })?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|source| MigratorError::Query { source })?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> TrackingStore {
        TrackingStore::new(&TrackingOptions::default())
    }

    #[test]
    fn test_schema_sql_is_idempotent_ddl() {
        let sql = store().create_schema_sql();
        assert!(sql.contains("IF to_regtype('migration_status_type') IS NULL THEN"));
        assert!(sql.contains("CREATE TYPE migration_status_type AS ENUM ('up', 'down');"));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS schema_migrations ("));
        assert!(sql.contains("status      migration_status_type    NOT NULL"));
        assert!(sql.contains(
            "CREATE UNIQUE INDEX IF NOT EXISTS schema_migrations_lower_id_idx ON schema_migrations (lower(id));"
        ));
    }

    #[test]
    fn test_find_sql_orders_newest_first() {
        let all = store().find_sql(false);
        assert!(all.starts_with("SELECT id, name, filename, up, down, status::text AS status"));
        assert!(!all.contains("WHERE"));
        assert!(all.ends_with("FROM schema_migrations ORDER BY lower(id) DESC"));

        let filtered = store().find_sql(true);
        assert!(filtered.contains("WHERE lower(id) = ANY($1) ORDER BY lower(id) DESC"));
    }

    #[test]
    fn test_find_latest_applied_sql() {
        let latest = store().find_latest_applied_sql(false);
        assert!(latest.ends_with("WHERE status = 'up' ORDER BY lower(id) DESC LIMIT $1"));

        let by_id = store().find_latest_applied_sql(true);
        assert!(by_id.contains("WHERE status = 'up' AND lower(id) = lower($2)"));
    }

    #[test]
    fn test_mutation_sql_uses_configured_names() {
        let store = TrackingStore::new(&TrackingOptions {
            migrations_table: "app.migrations".to_string(),
            status_type: "app.migration_status".to_string(),
            ..TrackingOptions::default()
        });

        assert!(store
            .insert_sql()
            .contains("INSERT INTO app.migrations (id, name, filename, up, down, status, created_at, updated_at)"));
        assert!(store.insert_sql().contains("CAST($6 AS app.migration_status)"));
        assert!(store
            .update_status_sql()
            .starts_with("UPDATE app.migrations SET status = CAST($1 AS app.migration_status)"));
        assert_eq!(
            store.delete_sql(),
            "DELETE FROM app.migrations WHERE lower(id) = lower($1)"
        );
        assert!(store
            .create_schema_sql()
            .contains("INDEX IF NOT EXISTS migrations_lower_id_idx ON app.migrations"));
    }

    #[test]
    fn test_expect_one_row() {
        assert!(expect_one_row("0001", 1).is_ok());
        assert!(matches!(
            expect_one_row("0001", 0),
            Err(MigratorError::Bookkeeping { ref id, .. }) if id == "0001"
        ));
    }
}
