//! Migration Decoder - turns a bundled filename into a [`Migration`]
//!
//! Filenames follow `<id>_<name>_<up|down>.sql`, e.g.
//! `0002_create-extension-citext_up.sql`. Only up files are decoded; the paired
//! down script is located by swapping the `up.sql` suffix.

use tracing::{debug, error};

use crate::assets::AssetSource;
use crate::definitions::Migration;
use crate::error::{MigratorError, MigratorResult};

/// Default directory, inside the asset source, holding the PostgreSQL scripts
pub const DEFAULT_BASE_DIR: &str = "migrations/postgres";

const UP_SUFFIX: &str = "up.sql";
const DOWN_SUFFIX: &str = "down.sql";

/// Whether `filename` is the backward half of a pair
pub fn is_down_file(filename: &str) -> bool {
    filename.ends_with(DOWN_SUFFIX)
}

/// Down filename paired with the given up filename
pub fn down_filename(filename: &str) -> String {
    match filename.strip_suffix(UP_SUFFIX) {
        Some(stem) => format!("{}{}", stem, DOWN_SUFFIX),
        None => filename.to_string(),
    }
}

/// Decodes migration filenames relative to a base directory
#[derive(Debug, Clone)]
pub struct MigrationDecoder {
    base_dir: String,
}

impl MigrationDecoder {
    pub fn new(base_dir: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    /// Parse `filename` and load both of its scripts from `assets`
    pub fn decode(&self, filename: &str, assets: &dyn AssetSource) -> MigratorResult<Migration> {
        let parts: Vec<&str> = filename.split('_').collect();
        if parts.len() != 3 || parts[0].is_empty() {
            error!(filename, "bad migration filename format");
            return Err(MigratorError::BadFilenameFormat {
                filename: filename.to_string(),
            });
        }

        let up_sql = self.load(filename, assets)?;
        let down_sql = self.load(&down_filename(filename), assets)?;

        debug!(id = parts[0], filename, "decoded migration");

        Ok(Migration {
            id: parts[0].to_string(),
            name: parts[1].to_string(),
            filename: filename.to_string(),
            up_sql,
            down_sql,
        })
    }

    fn load(&self, filename: &str, assets: &dyn AssetSource) -> MigratorResult<String> {
        let path = format!("{}/{}", self.base_dir, filename);
        let bytes = assets.asset(&path).map_err(|e| {
            error!(path = %path, error = %e, "failed to extract migration asset");
            e
        })?;

        String::from_utf8(bytes.into_owned())
            .map_err(|e| MigratorError::asset(path, format!("invalid UTF-8: {}", e)))
    }
}

impl Default for MigrationDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::StaticAssets;

    static ASSETS: StaticAssets = StaticAssets::new(&[
        ("migrations/postgres/0004_create-scopes-table_up.sql", "create table scopes ();"),
        ("migrations/postgres/0004_create-scopes-table_down.sql", "drop table scopes;"),
        ("migrations/postgres/0005_orphan_up.sql", "create table orphan ();"),
        ("custom/0001_init_up.sql", "select 1;"),
        ("custom/0001_init_down.sql", "select 0;"),
    ]);

    #[test]
    fn test_decode_loads_both_scripts() {
        let decoder = MigrationDecoder::default();
        let migration = decoder
            .decode("0004_create-scopes-table_up.sql", &ASSETS)
            .unwrap();

        assert_eq!(migration.id, "0004");
        assert_eq!(migration.name, "create-scopes-table");
        assert_eq!(migration.filename, "0004_create-scopes-table_up.sql");
        assert_eq!(migration.up_sql, "create table scopes ();");
        assert_eq!(migration.down_sql, "drop table scopes;");
    }

    #[test]
    fn test_decode_rejects_wrong_segment_count() {
        let decoder = MigrationDecoder::default();
        for filename in ["0004_up.sql", "0004_create_scopes_up.sql", "noseparators.sql"] {
            let err = decoder.decode(filename, &ASSETS).unwrap_err();
            assert!(
                matches!(err, MigratorError::BadFilenameFormat { .. }),
                "{} should be rejected",
                filename
            );
        }
    }

    #[test]
    fn test_decode_rejects_empty_id() {
        let err = MigrationDecoder::default()
            .decode("_name_up.sql", &ASSETS)
            .unwrap_err();
        assert!(matches!(err, MigratorError::BadFilenameFormat { .. }));
    }

    #[test]
    fn test_missing_down_pair_is_asset_error() {
        let err = MigrationDecoder::default()
            .decode("0005_orphan_up.sql", &ASSETS)
            .unwrap_err();
        match err {
            MigratorError::Asset { path, .. } => {
                assert_eq!(path, "migrations/postgres/0005_orphan_down.sql")
            }
            other => panic!("expected asset error, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_base_dir() {
        let decoder = MigrationDecoder::new("custom/");
        assert_eq!(decoder.base_dir(), "custom");
        let migration = decoder.decode("0001_init_up.sql", &ASSETS).unwrap();
        assert_eq!(migration.down_sql, "select 0;");
    }

    #[test]
    fn test_down_filename_helpers() {
        assert_eq!(down_filename("0001_init_up.sql"), "0001_init_down.sql");
        assert_eq!(down_filename("0001_init_down.sql"), "0001_init_down.sql");
        assert!(is_down_file("0001_init_down.sql"));
        assert!(!is_down_file("0001_init_up.sql"));
    }
}
