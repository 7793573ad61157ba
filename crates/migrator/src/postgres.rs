//! PostgreSQL migration engine
//!
//! Each migration unit runs in its own transaction: the script, then the
//! tracking row, then commit. Dropping an uncommitted `sqlx::Transaction` rolls
//! it back, so every early return below leaves the unit untouched. Batch
//! operations stop at the first failing unit; units committed before it stay
//! committed.
//!
//! Scripts are sent with the simple query protocol so files holding several
//! statements or `$$`-quoted function bodies run as written.

use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::{Executor, PgPool, Postgres, Transaction};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::assets::AssetSource;
use crate::config::TrackingOptions;
use crate::decoder::{is_down_file, MigrationDecoder};
use crate::definitions::{
    Migration, MigrationDirection, MigrationRecord, MigrationRunResult, MigrationStatus,
    RedoResult, RollbackResult,
};
use crate::error::{MigratorError, MigratorResult};
use crate::migrator::Migrator;
use crate::store::TrackingStore;

/// Up filenames of a sorted asset listing, in application order
pub fn pending_filenames(paths: &[String]) -> impl Iterator<Item = &str> {
    paths
        .iter()
        .map(String::as_str)
        .filter(|filename| !is_down_file(filename))
}

/// Redo never reaches past the number of units in the listing; every unit is
/// an up/down pair, so that is half the number of files.
pub fn clamp_redo_steps(steps: u32, listing_len: usize) -> u32 {
    let units = u32::try_from(listing_len / 2).unwrap_or(u32::MAX);
    steps.min(units)
}

/// Migration engine backed by a PostgreSQL pool
pub struct PostgresMigrator {
    pool: PgPool,
    assets: Arc<dyn AssetSource>,
    paths: Vec<String>,
    decoder: MigrationDecoder,
    store: TrackingStore,
}

impl PostgresMigrator {
    /// Create an engine over an explicit listing of asset filenames
    pub fn new(
        pool: PgPool,
        assets: Arc<dyn AssetSource>,
        mut paths: Vec<String>,
        options: TrackingOptions,
    ) -> Self {
        paths.sort();
        Self {
            pool,
            assets,
            paths,
            decoder: MigrationDecoder::new(options.base_dir.clone()),
            store: TrackingStore::new(&options),
        }
    }

    /// List the base directory of `assets`, build the engine and run `init`
    pub async fn from_pool(
        pool: PgPool,
        assets: Arc<dyn AssetSource>,
        options: TrackingOptions,
    ) -> MigratorResult<Self> {
        options.validate()?;
        let paths = assets.asset_dir(&options.base_dir)?;
        let migrator = Self::new(pool, assets, paths, options);
        migrator.init().await?;
        Ok(migrator)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Sorted asset filenames this engine works from
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn store(&self) -> &TrackingStore {
        &self.store
    }

    async fn begin(&self, id: &str) -> MigratorResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|source| MigratorError::Transaction {
                id: id.to_string(),
                source,
            })
    }

    async fn commit(&self, tx: Transaction<'static, Postgres>, id: &str) -> MigratorResult<()> {
        tx.commit()
            .await
            .map_err(|source| MigratorError::Transaction {
                id: id.to_string(),
                source,
            })
    }

    async fn execute_script(
        &self,
        conn: &mut PgConnection,
        id: &str,
        direction: MigrationDirection,
        script: &str,
    ) -> MigratorResult<()> {
        conn.execute(script).await.map_err(|source| {
            error!(id, %direction, error = %source, script, "migration script failed");
            MigratorError::Execution {
                id: id.to_string(),
                direction,
                source,
            }
        })?;
        Ok(())
    }

    /// Apply one unit; returns false when it was already up
    async fn apply(&self, migration: &Migration) -> MigratorResult<bool> {
        let mut tx = self.begin(&migration.id).await?;

        let existing = self.store.find(&mut *tx, &[migration.id.as_str()]).await?;
        let existing = existing.first();
        if existing.map_or(false, MigrationRecord::is_up) {
            debug!(id = %migration.id, "migration already applied, skipping");
            return Ok(false);
        }

        self.execute_script(&mut tx, &migration.id, MigrationDirection::Up, &migration.up_sql)
            .await?;

        match existing {
            None => {
                self.store
                    .insert(&mut tx, migration, MigrationStatus::Up)
                    .await?
            }
            Some(record) => {
                self.store
                    .update_status(
                        &mut tx,
                        &record.id,
                        MigrationStatus::Up,
                        &migration.up_sql,
                        &migration.down_sql,
                    )
                    .await?
            }
        }

        self.commit(tx, &migration.id).await?;
        info!(id = %migration.id, name = %migration.name, "applied migration");
        Ok(true)
    }

    /// Run the stored down script of an applied unit and mark it down
    async fn revert(&self, record: &MigrationRecord) -> MigratorResult<()> {
        let mut tx = self.begin(&record.id).await?;

        self.execute_script(&mut tx, &record.id, MigrationDirection::Down, &record.down_sql)
            .await?;
        self.store
            .update_status(
                &mut tx,
                &record.id,
                MigrationStatus::Down,
                &record.up_sql,
                &record.down_sql,
            )
            .await?;

        self.commit(tx, &record.id).await?;
        info!(id = %record.id, name = %record.name, "rolled back migration");
        Ok(())
    }

    /// Revert records in the given order, stopping at the first failure
    async fn revert_all(&self, records: Vec<MigrationRecord>) -> MigratorResult<RollbackResult> {
        let start_time = Instant::now();
        let mut rolled_back_migrations = Vec::with_capacity(records.len());

        for record in &records {
            self.revert(record).await?;
            rolled_back_migrations.push(record.id.clone());
        }

        Ok(RollbackResult {
            rolled_back_migrations,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    /// Replace the record of a down unit with a freshly decoded one and apply it
    async fn reapply_fresh(&self, record: &MigrationRecord) -> MigratorResult<()> {
        let mut tx = self.begin(&record.id).await?;

        self.store.delete_by_id(&mut tx, &record.id).await?;
        let migration = self.decoder.decode(&record.filename, self.assets.as_ref())?;

        self.execute_script(&mut tx, &migration.id, MigrationDirection::Up, &migration.up_sql)
            .await?;
        self.store
            .insert(&mut tx, &migration, MigrationStatus::Up)
            .await?;

        self.commit(tx, &record.id).await?;
        info!(id = %migration.id, name = %migration.name, "re-applied migration");
        Ok(())
    }
}

#[async_trait]
impl Migrator for PostgresMigrator {
    async fn init(&self) -> MigratorResult<()> {
        self.store.ensure_schema(&self.pool).await
    }

    async fn migrate(&self) -> MigratorResult<MigrationRunResult> {
        let start_time = Instant::now();
        let mut result = MigrationRunResult::default();

        for filename in pending_filenames(&self.paths) {
            let migration = self.decoder.decode(filename, self.assets.as_ref())?;
            if self.apply(&migration).await? {
                result.applied_migrations.push(migration.id);
            } else {
                result.skipped_count += 1;
            }
        }

        result.execution_time_ms = start_time.elapsed().as_millis();
        info!(
            applied = result.applied_count(),
            skipped = result.skipped_count,
            "migrate finished"
        );
        Ok(result)
    }

    async fn rollback(&self, steps: u32) -> MigratorResult<RollbackResult> {
        let records = self
            .store
            .find_latest_applied(&self.pool, i64::from(steps), None)
            .await?;
        debug!(requested = steps, selected = records.len(), "rolling back migrations");
        self.revert_all(records).await
    }

    async fn redo(&self, steps: u32) -> MigratorResult<RedoResult> {
        let steps = clamp_redo_steps(steps, self.paths.len());
        let rolled_back = self.rollback(steps).await?;
        let reapplied = self.migrate().await?;
        Ok(RedoResult {
            rolled_back,
            reapplied,
        })
    }

    async fn migrations(&self, ids: &[&str]) -> MigratorResult<Vec<MigrationRecord>> {
        self.store.find(&self.pool, ids).await
    }

    async fn up(&self, id: &str) -> MigratorResult<()> {
        if id.is_empty() {
            return Err(MigratorError::MigrationIdRequired);
        }

        let records = self.store.find(&self.pool, &[id]).await?;
        let record = records.first().ok_or_else(|| MigratorError::not_found(id))?;
        if record.is_up() {
            debug!(id, "migration already up");
            return Ok(());
        }

        self.reapply_fresh(record).await
    }

    async fn down(&self, id: &str) -> MigratorResult<()> {
        if id.is_empty() {
            return Err(MigratorError::MigrationIdRequired);
        }

        let records = self
            .store
            .find_latest_applied(&self.pool, 1, Some(id))
            .await?;
        if records.is_empty() {
            if self.store.find(&self.pool, &[id]).await?.is_empty() {
                return Err(MigratorError::not_found(id));
            }
            debug!(id, "migration already down");
            return Ok(());
        }

        self.revert_all(records).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::StaticAssets;
    use sqlx::postgres::PgPoolOptions;

    fn listing(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_pending_filenames_skips_down_files() {
        let paths = listing(&[
            "0001_a_down.sql",
            "0001_a_up.sql",
            "0002_b_down.sql",
            "0002_b_up.sql",
        ]);
        let pending: Vec<&str> = pending_filenames(&paths).collect();
        assert_eq!(pending, vec!["0001_a_up.sql", "0002_b_up.sql"]);
    }

    #[test]
    fn test_clamp_redo_steps() {
        assert_eq!(clamp_redo_steps(1, 14), 1);
        assert_eq!(clamp_redo_steps(7, 14), 7);
        assert_eq!(clamp_redo_steps(50, 14), 7);
        assert_eq!(clamp_redo_steps(3, 0), 0);
        assert_eq!(clamp_redo_steps(3, 5), 2);
    }

    #[tokio::test]
    async fn test_new_sorts_listing() {
        static EMPTY: StaticAssets = StaticAssets::new(&[]);
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://migrator@localhost/migrator_ci")
            .unwrap();

        let migrator = PostgresMigrator::new(
            pool,
            Arc::new(EMPTY),
            listing(&["0002_b_up.sql", "0001_a_up.sql", "0001_a_down.sql"]),
            TrackingOptions::default(),
        );
        assert_eq!(
            migrator.paths(),
            &["0001_a_down.sql", "0001_a_up.sql", "0002_b_up.sql"]
        );
        assert_eq!(migrator.store().table(), "schema_migrations");
    }

    #[tokio::test]
    async fn test_targeted_operations_require_an_id() {
        static EMPTY: StaticAssets = StaticAssets::new(&[]);
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://migrator@localhost/migrator_ci")
            .unwrap();
        let migrator =
            PostgresMigrator::new(pool, Arc::new(EMPTY), Vec::new(), TrackingOptions::default());

        assert!(matches!(
            migrator.down("").await,
            Err(MigratorError::MigrationIdRequired)
        ));
        assert!(matches!(
            migrator.up("").await,
            Err(MigratorError::MigrationIdRequired)
        ));
    }
}
