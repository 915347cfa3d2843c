//! Store namespaces handed to individual tests

use parking_lot::Mutex;
use rusqlite::{Connection, Params};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::StoreError;

/// A test's view of the store
///
/// Clones share the same connection.
#[derive(Clone)]
pub struct StoreNamespace {
    name: String,
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl StoreNamespace {
    pub(crate) fn new(
        name: impl Into<String>,
        path: PathBuf,
        conn: Arc<Mutex<Connection>>,
    ) -> Self {
        Self {
            name: name.into(),
            path,
            conn,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Database file backing this namespace
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` with exclusive access to the connection
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock();
        f(&conn).map_err(StoreError::Query)
    }

    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.with_connection(|conn| conn.execute_batch(sql))
    }

    pub fn execute(&self, sql: &str, params: impl Params) -> Result<usize, StoreError> {
        self.with_connection(|conn| conn.execute(sql, params))
    }

    /// Count rows in `table`
    pub fn count(&self, table: &str) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", table.replace('"', "\"\""));
        self.with_connection(|conn| conn.query_row(&sql, [], |row| row.get(0)))
    }
}

impl std::fmt::Debug for StoreNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreNamespace")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

/// Turn a test name into a file-name-safe namespace prefix
pub(crate) fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(48)
        .collect();

    if cleaned.is_empty() {
        "test".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("store::writes_rows"), "store__writes_rows");
        assert_eq!(sanitize("a b/c"), "a_b_c");
        assert_eq!(sanitize(""), "test");
        assert_eq!(sanitize(&"x".repeat(100)).len(), 48);
    }

    #[test]
    fn test_with_connection() {
        let conn = Connection::open_in_memory().unwrap();
        let ns = StoreNamespace::new("mem", PathBuf::from(":memory:"), Arc::new(Mutex::new(conn)));

        ns.execute_batch("CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT);").unwrap();
        ns.execute("INSERT INTO items (label) VALUES (?1)", ["first"]).unwrap();

        assert_eq!(ns.count("items").unwrap(), 1);
        assert!(matches!(ns.count("missing"), Err(StoreError::Query(_))));
    }
}
