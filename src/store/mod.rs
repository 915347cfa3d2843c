//! Fixture store
//!
//! SQLite-backed persistent store shared by every test in a suite. Under
//! fully parallel mode each test gets its own namespace (a separate database
//! file); under serialized mode all tests share the main database.

mod namespace;
mod sqlite;

pub use namespace::StoreNamespace;
pub(crate) use namespace::sanitize;
pub use sqlite::FixtureStore;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to create store root under {path}: {source}")]
    CreateRoot {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to open database {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("Database {path} did not answer a test query: {source}")]
    Unreachable {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("Setup script failed on {path}: {source}")]
    Setup {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("Failed to read setup script {path}: {source}")]
    SetupFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Failed to close main database: {0}")]
    Close(rusqlite::Error),

    #[error("Failed to remove store root {path}: {source}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Store was not provisioned for this suite")]
    Disabled,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Store settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory the store root is created in (system temp dir when unset)
    #[serde(default)]
    pub parent_dir: Option<PathBuf>,

    /// SQL applied to the main database and to every namespace
    #[serde(default)]
    pub setup_sql: Option<String>,

    /// File holding setup SQL, appended after `setup_sql`
    #[serde(default)]
    pub setup_file: Option<PathBuf>,

    /// SQLite busy timeout
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            parent_dir: None,
            setup_sql: None,
            setup_file: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn with_setup_sql(mut self, sql: impl Into<String>) -> Self {
        self.setup_sql = Some(sql.into());
        self
    }

    pub fn with_parent_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.parent_dir = Some(dir.into());
        self
    }

    /// Combined setup script, if any
    pub(crate) fn setup_script(&self) -> Result<Option<String>, StoreError> {
        let mut script = self.setup_sql.clone().unwrap_or_default();

        if let Some(path) = &self.setup_file {
            let content = std::fs::read_to_string(path).map_err(|source| StoreError::SetupFile {
                path: path.clone(),
                source,
            })?;
            if !script.is_empty() {
                script.push('\n');
            }
            script.push_str(&content);
        }

        Ok((!script.trim().is_empty()).then_some(script))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert!(config.parent_dir.is_none());
        assert_eq!(config.busy_timeout_ms, 5000);
    }

    #[test]
    fn test_setup_script_combines_sources() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("schema.sql");
        std::fs::write(&file, "CREATE TABLE b (id INTEGER);").unwrap();

        let config = StoreConfig {
            setup_sql: Some("CREATE TABLE a (id INTEGER);".to_string()),
            setup_file: Some(file),
            ..Default::default()
        };

        let script = config.setup_script().unwrap().unwrap();
        assert!(script.contains("TABLE a"));
        assert!(script.contains("TABLE b"));
    }

    #[test]
    fn test_blank_setup_is_none() {
        let config = StoreConfig::default().with_setup_sql("   ");
        assert!(config.setup_script().unwrap().is_none());
    }

    #[test]
    fn test_missing_setup_file() {
        let config = StoreConfig {
            setup_file: Some(PathBuf::from("/nonexistent/schema.sql")),
            ..Default::default()
        };
        assert!(matches!(
            config.setup_script(),
            Err(StoreError::SetupFile { .. })
        ));
    }
}
