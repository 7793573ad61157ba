//! Migration assets
//!
//! The runner never touches the filesystem directly. Scripts are read through an
//! [`AssetSource`], a read-by-path / list-by-directory capability that can be
//! backed by a table compiled into the binary, a directory on disk, or any pair
//! of closures.

use rust_embed::RustEmbed;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fs;
use std::marker::PhantomData;
use std::path::PathBuf;

use crate::error::{MigratorError, MigratorResult};

/// Path-addressable source of migration scripts
pub trait AssetSource: Send + Sync {
    /// Raw content of the asset at `path`
    fn asset(&self, path: &str) -> MigratorResult<Cow<'static, [u8]>>;

    /// Names of the entries directly under `dir`, sorted ascending
    fn asset_dir(&self, dir: &str) -> MigratorResult<Vec<String>>;
}

/// Direct children of `dir` among a flat list of `/`-separated paths
fn children_of<'a, I>(paths: I, dir: &str) -> MigratorResult<Vec<String>>
where
    I: IntoIterator<Item = Cow<'a, str>>,
{
    let prefix = format!("{}/", dir.trim_end_matches('/'));
    let entries: BTreeSet<String> = paths
        .into_iter()
        .filter_map(|path| {
            path.strip_prefix(prefix.as_str())
                .and_then(|rest| rest.split('/').next())
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
        })
        .collect();

    if entries.is_empty() {
        return Err(MigratorError::asset(dir, "directory not found"));
    }
    Ok(entries.into_iter().collect())
}

/// Assets compiled into the binary with `rust-embed`
///
/// ```ignore
/// #[derive(rust_embed::RustEmbed)]
/// #[folder = "assets/"]
/// struct Bundled;
///
/// let assets = EmbeddedAssets::<Bundled>::new();
/// ```
pub struct EmbeddedAssets<E> {
    _marker: PhantomData<fn() -> E>,
}

impl<E: RustEmbed> EmbeddedAssets<E> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<E: RustEmbed> Default for EmbeddedAssets<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: RustEmbed> AssetSource for EmbeddedAssets<E> {
    fn asset(&self, path: &str) -> MigratorResult<Cow<'static, [u8]>> {
        E::get(path)
            .map(|file| file.data)
            .ok_or_else(|| MigratorError::asset(path, "not found"))
    }

    fn asset_dir(&self, dir: &str) -> MigratorResult<Vec<String>> {
        children_of(E::iter(), dir)
    }
}

/// Assets from a static `(path, content)` table, typically built with `include_str!`
#[derive(Debug, Clone, Copy)]
pub struct StaticAssets {
    entries: &'static [(&'static str, &'static str)],
}

impl StaticAssets {
    pub const fn new(entries: &'static [(&'static str, &'static str)]) -> Self {
        Self { entries }
    }
}

impl AssetSource for StaticAssets {
    fn asset(&self, path: &str) -> MigratorResult<Cow<'static, [u8]>> {
        self.entries
            .iter()
            .find(|(name, _)| *name == path)
            .map(|(_, content)| Cow::Borrowed(content.as_bytes()))
            .ok_or_else(|| MigratorError::asset(path, "not found"))
    }

    fn asset_dir(&self, dir: &str) -> MigratorResult<Vec<String>> {
        children_of(self.entries.iter().map(|(name, _)| Cow::Borrowed(*name)), dir)
    }
}

/// Assets read from a directory on disk; logical paths are relative to `root`
#[derive(Debug, Clone)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

impl AssetSource for DirAssets {
    fn asset(&self, path: &str) -> MigratorResult<Cow<'static, [u8]>> {
        let full = self.root.join(path);
        fs::read(&full)
            .map(Cow::Owned)
            .map_err(|e| MigratorError::asset(full.display().to_string(), e.to_string()))
    }

    fn asset_dir(&self, dir: &str) -> MigratorResult<Vec<String>> {
        let full = self.root.join(dir);
        let entries = fs::read_dir(&full)
            .map_err(|e| MigratorError::asset(full.display().to_string(), e.to_string()))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| MigratorError::asset(full.display().to_string(), e.to_string()))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

/// Assets served by a pair of closures
pub struct FnAssets<A, D> {
    asset_fn: A,
    dir_fn: D,
}

impl<A, D> FnAssets<A, D>
where
    A: Fn(&str) -> MigratorResult<Vec<u8>> + Send + Sync,
    D: Fn(&str) -> MigratorResult<Vec<String>> + Send + Sync,
{
    pub fn new(asset_fn: A, dir_fn: D) -> Self {
        Self { asset_fn, dir_fn }
    }
}

impl<A, D> AssetSource for FnAssets<A, D>
where
    A: Fn(&str) -> MigratorResult<Vec<u8>> + Send + Sync,
    D: Fn(&str) -> MigratorResult<Vec<String>> + Send + Sync,
{
    fn asset(&self, path: &str) -> MigratorResult<Cow<'static, [u8]>> {
        (self.asset_fn)(path).map(Cow::Owned)
    }

    fn asset_dir(&self, dir: &str) -> MigratorResult<Vec<String>> {
        let mut names = (self.dir_fn)(dir)?;
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    static TABLE: StaticAssets = StaticAssets::new(&[
        ("migrations/postgres/0002_b_up.sql", "create table b ();"),
        ("migrations/postgres/0001_a_up.sql", "create table a ();"),
        ("migrations/postgres/0001_a_down.sql", "drop table a;"),
        ("migrations/postgres/nested/ignored.sql", ""),
        ("migrations/other/0001_x_up.sql", ""),
    ]);

    #[test]
    fn test_static_assets_lookup() {
        let content = TABLE.asset("migrations/postgres/0001_a_up.sql").unwrap();
        assert_eq!(content.as_ref(), b"create table a ();");

        let err = TABLE.asset("migrations/postgres/0009_z_up.sql").unwrap_err();
        assert!(matches!(err, MigratorError::Asset { .. }));
    }

    #[test]
    fn test_static_assets_lists_direct_children_sorted() {
        let names = TABLE.asset_dir("migrations/postgres").unwrap();
        assert_eq!(
            names,
            vec!["0001_a_down.sql", "0001_a_up.sql", "0002_b_up.sql", "nested"]
        );

        // trailing slash is accepted
        assert_eq!(TABLE.asset_dir("migrations/other/").unwrap(), vec!["0001_x_up.sql"]);
        assert!(TABLE.asset_dir("migrations/mysql").is_err());
    }

    #[test]
    fn test_dir_assets_reads_from_disk() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("migrations/postgres");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("0002_b_up.sql"), "select 2;").unwrap();
        fs::write(dir.join("0001_a_up.sql"), "select 1;").unwrap();

        let assets = DirAssets::new(temp_dir.path());
        assert_eq!(
            assets.asset_dir("migrations/postgres").unwrap(),
            vec!["0001_a_up.sql", "0002_b_up.sql"]
        );
        let content = assets.asset("migrations/postgres/0002_b_up.sql").unwrap();
        assert_eq!(content.as_ref(), b"select 2;");

        assert!(assets.asset("migrations/postgres/0003_c_up.sql").is_err());
        assert!(assets.asset_dir("migrations/mysql").is_err());
    }

    #[test]
    fn test_fn_assets_delegates_to_closures() {
        let assets = FnAssets::new(
            |path: &str| {
                if path.ends_with("up.sql") {
                    Ok(b"select 1;".to_vec())
                } else {
                    Err(MigratorError::asset(path, "missing"))
                }
            },
            |_dir: &str| Ok(vec!["b_up.sql".to_string(), "a_up.sql".to_string()]),
        );

        assert_eq!(assets.asset("x_y_up.sql").unwrap().as_ref(), b"select 1;");
        assert!(assets.asset("x_y_down.sql").is_err());
        assert_eq!(assets.asset_dir("any").unwrap(), vec!["a_up.sql", "b_up.sql"]);
    }

    #[derive(RustEmbed)]
    #[folder = "tests/fixtures/"]
    struct Fixtures;

    #[test]
    fn test_embedded_assets() {
        let assets = EmbeddedAssets::<Fixtures>::new();
        let names = assets.asset_dir("migrations/postgres").unwrap();
        assert_eq!(names.len(), 14);
        assert_eq!(names[0], "0001_create-index-function-if-not-exists_down.sql");

        let content = assets
            .asset("migrations/postgres/0002_create-extension-citext_up.sql")
            .unwrap();
        assert!(String::from_utf8_lossy(&content).contains("create extension if not exists citext"));
    }
}
