//! Configuration module
//!
//! Handles loading and managing harness configuration.

mod env;

pub use env::{
    print_env_help, EnvBuilder, EnvConfig, EnvGuard, FULLY_PARALLEL_VAR, TEST_THREADS_VAR,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::context::ProvisionOptions;
use crate::resources::{ResourcesConfig, RouteConfig, StubConfig};
use crate::runner::{OutputFormat, ResultFormatter};
use crate::store::StoreConfig;

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./fixture-harness.yaml",
    "./fixture-harness.yml",
    "./fixture-harness.json",
    "./.fixture-harness/config.yaml",
    "~/.config/fixture-harness/config.yaml",
];

fn default_true() -> bool {
    true
}

fn default_report_format() -> String {
    "table".to_string()
}

/// Harness configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Provision the fixture store
    #[serde(default = "default_true")]
    pub enable_store: bool,

    /// Provision service stubs and external resources
    #[serde(default = "default_true")]
    pub enable_resources: bool,

    /// Store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Stub and external resource settings
    #[serde(default)]
    pub resources: ResourcesConfig,

    /// Summary format for the in-process runner (table, json, json-pretty, summary)
    #[serde(default = "default_report_format")]
    pub report_format: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            enable_store: true,
            enable_resources: true,
            store: StoreConfig::default(),
            resources: ResourcesConfig::default(),
            report_format: default_report_format(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        let config: Self = if is_yaml(path.as_ref()) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = if is_yaml(path.as_ref()) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Starter configuration written by `config init`
    pub fn example() -> Self {
        Self {
            store: StoreConfig::default().with_setup_sql(
                "CREATE TABLE IF NOT EXISTS events (id INTEGER PRIMARY KEY, kind TEXT NOT NULL);",
            ),
            resources: ResourcesConfig::default().stub(
                StubConfig::new("notifications")
                    .route(RouteConfig::new("POST", "/send", 202, r#"{"queued":true}"#)),
            ),
            ..Default::default()
        }
    }

    /// Find the first existing config file in the well-known locations
    pub fn discover() -> Option<PathBuf> {
        CONFIG_LOCATIONS
            .iter()
            .map(|p| expand_path(p))
            .find(|p| p.is_file())
    }

    /// Resolve configuration: explicit path, then environment, then discovery
    pub fn resolve(explicit: Option<&Path>, env: &EnvConfig) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| env.config_file.as_deref().map(expand_path))
            .or_else(Self::discover);

        let mut config = match path {
            Some(path) => {
                debug!("Loading harness config from {}", path.display());
                Self::load(&path)
                    .with_context(|| format!("Invalid config file {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Some(dir) = &env.store_dir {
            config.store.parent_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    /// Summary format named by `report_format`; unknown names fall back to table
    pub fn output_format(&self) -> OutputFormat {
        OutputFormat::from_str(&self.report_format).unwrap_or_else(|| {
            warn!("Unknown report format {:?}, using table", self.report_format);
            OutputFormat::Table
        })
    }

    /// Formatter for the in-process runner's summary
    pub fn formatter(&self) -> ResultFormatter {
        ResultFormatter::new(self.output_format())
    }

    /// Options handed to the provisioner
    pub fn provision_options(&self) -> ProvisionOptions {
        ProvisionOptions {
            enable_store: self.enable_store,
            enable_resources: self.enable_resources,
            store: self.store.clone(),
            resources: self.resources.clone(),
        }
    }
}

/// Expand a leading `~/` to the home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert!(config.enable_store);
        assert!(config.enable_resources);
        assert_eq!(config.report_format, "table");
    }

    #[test]
    fn test_missing_fields_default_to_enabled() {
        let config: HarnessConfig = serde_yaml::from_str("report_format: json\n").unwrap();
        assert!(config.enable_store);
        assert!(config.enable_resources);
        assert_eq!(config.report_format, "json");
    }

    #[test]
    fn test_output_format() {
        let mut config = HarnessConfig::default();
        assert_eq!(config.output_format(), OutputFormat::Table);

        config.report_format = "json".to_string();
        assert_eq!(config.output_format(), OutputFormat::Json);
        assert_eq!(config.formatter().format(), OutputFormat::Json);

        config.report_format = "xml".to_string();
        assert_eq!(config.output_format(), OutputFormat::Table);
    }

    #[test]
    fn test_yaml_stub_definition() {
        let yaml = r#"
enable_store: false
resources:
  stubs:
    - name: billing
      routes:
        - path: /invoices
          status: 201
          body: '{"id": 1}'
  external:
    - name: search
      url: http://127.0.0.1:9200
"#;
        let config: HarnessConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.enable_store);
        assert_eq!(config.resources.stubs.len(), 1);
        assert_eq!(config.resources.stubs[0].routes[0].status, 201);
        assert_eq!(config.resources.stubs[0].routes[0].method, "GET");
        assert_eq!(config.resources.external[0].health_path, "/");
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("harness.json");

        let config = HarnessConfig {
            enable_resources: false,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = HarnessConfig::load(&path).unwrap();
        assert!(!loaded.enable_resources);
    }

    #[test]
    fn test_example_survives_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fixture-harness.yaml");
        HarnessConfig::example().save(&path).unwrap();

        let loaded = HarnessConfig::load(&path).unwrap();
        assert_eq!(loaded.resources.stubs[0].name, "notifications");
        assert_eq!(loaded.resources.stubs[0].routes[0].status, 202);
        assert!(loaded.store.setup_sql.is_some());
    }

    #[test]
    fn test_resolve_applies_store_dir() {
        let env = EnvConfig {
            store_dir: Some("/tmp/fixture-root".to_string()),
            ..Default::default()
        };
        let config = HarnessConfig::resolve(None, &env).unwrap();
        assert_eq!(
            config.store.parent_dir.as_deref(),
            Some(Path::new("/tmp/fixture-root"))
        );
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("./local.yaml"), PathBuf::from("./local.yaml"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/h.yaml"), home.join("h.yaml"));
        }
    }

    #[test]
    fn test_resolve_reports_bad_file() {
        let env = EnvConfig::default();
        let result = HarnessConfig::resolve(Some(Path::new("/nonexistent/harness.yaml")), &env);
        assert!(result.is_err());
    }
}
