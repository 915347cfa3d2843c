//! SQLite fixture store

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::namespace::{sanitize, StoreNamespace};
use super::{StoreConfig, StoreError};
use crate::policy::ExecutionMode;

const MAIN_DB: &str = "main.db";

/// Shared fixture store
pub struct FixtureStore {
    mode: ExecutionMode,
    root: TempDir,
    main_path: PathBuf,
    main: Arc<Mutex<Connection>>,
    setup_sql: Option<String>,
    busy_timeout: Duration,
    namespaces: Mutex<Vec<PathBuf>>,
}

impl FixtureStore {
    /// Create the store root, open the main database and apply setup SQL
    pub fn open(config: &StoreConfig, mode: ExecutionMode) -> Result<Self, StoreError> {
        let parent = config
            .parent_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);

        std::fs::create_dir_all(&parent).map_err(|source| StoreError::CreateRoot {
            path: parent.clone(),
            source,
        })?;

        let root = tempfile::Builder::new()
            .prefix("fixture-store-")
            .tempdir_in(&parent)
            .map_err(|source| StoreError::CreateRoot {
                path: parent.clone(),
                source,
            })?;

        let setup_sql = config.setup_script()?;
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let main_path = root.path().join(MAIN_DB);
        let main = open_database(&main_path, busy_timeout, setup_sql.as_deref())?;

        info!("Fixture store ready at {} ({})", root.path().display(), mode);

        Ok(Self {
            mode,
            root,
            main_path,
            main: Arc::new(Mutex::new(main)),
            setup_sql,
            busy_timeout,
            namespaces: Mutex::new(Vec::new()),
        })
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn main_path(&self) -> &Path {
        &self.main_path
    }

    /// Namespace for one test
    ///
    /// Serialized mode shares the main database; fully parallel mode opens a
    /// fresh database per call.
    pub fn namespace(&self, name: &str) -> Result<StoreNamespace, StoreError> {
        match self.mode {
            ExecutionMode::Serialized => Ok(StoreNamespace::new(
                "main",
                self.main_path.clone(),
                Arc::clone(&self.main),
            )),
            ExecutionMode::FullyParallel => {
                let ns_name = format!("{}-{:08x}", sanitize(name), rand::random::<u32>());
                let path = self.root.path().join(format!("{ns_name}.db"));
                let conn = open_database(&path, self.busy_timeout, self.setup_sql.as_deref())?;

                debug!("Opened store namespace {} for {}", ns_name, name);
                self.namespaces.lock().push(path.clone());

                Ok(StoreNamespace::new(ns_name, path, Arc::new(Mutex::new(conn))))
            }
        }
    }

    /// Number of isolated namespaces handed out so far
    pub fn namespace_count(&self) -> usize {
        self.namespaces.lock().len()
    }

    /// Close the main database and remove the store root
    pub fn close(self) -> Result<(), StoreError> {
        let FixtureStore {
            root,
            main,
            namespaces,
            ..
        } = self;
        let root_path = root.path().to_path_buf();
        let mut first_error = None;

        match Arc::try_unwrap(main) {
            Ok(conn) => {
                if let Err((_, e)) = conn.into_inner().close() {
                    first_error = Some(StoreError::Close(e));
                }
            }
            Err(_) => warn!("Main database still borrowed at teardown, dropping it"),
        }

        let namespaces = namespaces.into_inner().len();
        if let Err(source) = root.close() {
            first_error.get_or_insert(StoreError::Cleanup {
                path: root_path.clone(),
                source,
            });
        }

        debug!(
            "Fixture store at {} closed ({} namespaces)",
            root_path.display(),
            namespaces
        );

        first_error.map_or(Ok(()), Err)
    }
}

fn open_database(
    path: &Path,
    busy_timeout: Duration,
    setup_sql: Option<&str>,
) -> Result<Connection, StoreError> {
    let conn = Connection::open(path).map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    conn.busy_timeout(busy_timeout)
        .and_then(|_| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
        .map_err(|source| StoreError::Unreachable {
            path: path.to_path_buf(),
            source,
        })?;

    if let Some(sql) = setup_sql {
        conn.execute_batch(sql).map_err(|source| StoreError::Setup {
            path: path.to_path_buf(),
            source,
        })?;
    }

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);";

    fn config(parent: &TempDir) -> StoreConfig {
        StoreConfig::default()
            .with_parent_dir(parent.path())
            .with_setup_sql(SCHEMA)
    }

    #[test]
    fn test_open_and_close_removes_root() {
        let parent = TempDir::new().unwrap();
        let store = FixtureStore::open(&config(&parent), ExecutionMode::Serialized).unwrap();
        let root = store.root().to_path_buf();
        assert!(store.main_path().exists());

        store.close().unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn test_serialized_namespaces_share_main() {
        let parent = TempDir::new().unwrap();
        let store = FixtureStore::open(&config(&parent), ExecutionMode::Serialized).unwrap();

        let a = store.namespace("first").unwrap();
        let b = store.namespace("second").unwrap();
        assert_eq!(a.path(), b.path());

        a.execute("INSERT INTO users (name) VALUES (?1)", ["ada"]).unwrap();
        assert_eq!(b.count("users").unwrap(), 1);
        assert_eq!(store.namespace_count(), 0);

        drop((a, b));
        store.close().unwrap();
    }

    #[test]
    fn test_parallel_namespaces_are_isolated() {
        let parent = TempDir::new().unwrap();
        let store = FixtureStore::open(&config(&parent), ExecutionMode::FullyParallel).unwrap();

        let a = store.namespace("writes::one").unwrap();
        let b = store.namespace("writes::one").unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.name().starts_with("writes__one-"));

        a.execute("INSERT INTO users (name) VALUES (?1)", ["ada"]).unwrap();
        assert_eq!(a.count("users").unwrap(), 1);
        assert_eq!(b.count("users").unwrap(), 0);
        assert_eq!(store.namespace_count(), 2);

        drop((a, b));
        store.close().unwrap();
    }

    #[test]
    fn test_bad_setup_sql_fails_open() {
        let parent = TempDir::new().unwrap();
        let config = StoreConfig::default()
            .with_parent_dir(parent.path())
            .with_setup_sql("CREATE TABLE (");

        let result = FixtureStore::open(&config, ExecutionMode::Serialized);
        assert!(matches!(result, Err(StoreError::Setup { .. })));
    }

    #[test]
    fn test_unusable_parent_fails_open() {
        let parent = TempDir::new().unwrap();
        let file = parent.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let config = StoreConfig::default().with_parent_dir(&file);
        let result = FixtureStore::open(&config, ExecutionMode::Serialized);
        assert!(matches!(result, Err(StoreError::CreateRoot { .. })));
    }
}
