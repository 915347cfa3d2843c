//! Shared external resources
//!
//! Starts in-process HTTP stubs and checks configured external services,
//! all hosted on a runtime owned by the resource set.

mod health;
mod stub;

pub use health::{ReadinessConfig, ReadinessCheck};
pub use stub::{RecordedRequest, StubHandle, HEALTH_PATH, NAMESPACE_HEADER};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info, warn};

use crate::policy::ExecutionMode;

/// Resource errors
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Resources cannot be provisioned from inside an async runtime")]
    NestedRuntime,

    #[error("Failed to build resource runtime: {0}")]
    Runtime(std::io::Error),

    #[error("Failed to build health client: {0}")]
    Client(String),

    #[error("Duplicate resource name: {0}")]
    DuplicateName(String),

    #[error("Stub {name} could not bind {addr}: {source}")]
    Bind {
        name: String,
        addr: String,
        source: std::io::Error,
    },

    #[error("Resource {name} unreachable at {url}: {reason}")]
    Unreachable {
        name: String,
        url: String,
        reason: String,
    },

    #[error("Stub {name} did not shut down cleanly: {reason}")]
    Shutdown { name: String, reason: String },
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_status() -> u16 {
    200
}

fn default_content_type() -> String {
    "application/json".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_health_path() -> String {
    "/".to_string()
}

fn default_grace_ms() -> u64 {
    2000
}

/// Canned stub response
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub body: String,
}

impl RouteConfig {
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            status,
            content_type: default_content_type(),
            body: body.into(),
        }
    }
}

/// In-process HTTP stub
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StubConfig {
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    /// 0 picks a free port
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl StubConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: default_host(),
            port: 0,
            routes: Vec::new(),
        }
    }

    pub fn route(mut self, route: RouteConfig) -> Self {
        self.routes.push(route);
        self
    }
}

/// Externally managed service that must be reachable
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExternalConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

impl ExternalConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            health_path: default_health_path(),
        }
    }

    pub fn health_url(&self) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), self.health_path)
    }
}

/// Resource set settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourcesConfig {
    #[serde(default)]
    pub stubs: Vec<StubConfig>,
    #[serde(default)]
    pub external: Vec<ExternalConfig>,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    /// How long a stub may take to stop
    #[serde(default = "default_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            stubs: Vec::new(),
            external: Vec::new(),
            readiness: ReadinessConfig::default(),
            shutdown_grace_ms: default_grace_ms(),
        }
    }
}

impl ResourcesConfig {
    pub fn stub(mut self, stub: StubConfig) -> Self {
        self.stubs.push(stub);
        self
    }

    pub fn external(mut self, external: ExternalConfig) -> Self {
        self.external.push(external);
        self
    }

    fn check_names(&self) -> Result<(), ResourceError> {
        let mut seen = HashSet::new();
        let names = self
            .stubs
            .iter()
            .map(|s| &s.name)
            .chain(self.external.iter().map(|e| &e.name));

        for name in names {
            if !seen.insert(name.as_str()) {
                return Err(ResourceError::DuplicateName(name.clone()));
            }
        }
        Ok(())
    }
}

/// Started stubs plus verified external services
pub struct ResourceSet {
    mode: ExecutionMode,
    runtime: Option<Runtime>,
    stubs: Vec<StubHandle>,
    external: Vec<ExternalConfig>,
    grace: Duration,
}

impl ResourceSet {
    /// Start every stub and wait until all resources answer their health check
    pub fn start(config: &ResourcesConfig, mode: ExecutionMode) -> Result<Self, ResourceError> {
        if Handle::try_current().is_ok() {
            return Err(ResourceError::NestedRuntime);
        }
        config.check_names()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("fixture-stubs")
            .enable_all()
            .build()
            .map_err(ResourceError::Runtime)?;

        let mut set = Self {
            mode,
            runtime: Some(runtime),
            stubs: Vec::with_capacity(config.stubs.len()),
            external: Vec::new(),
            grace: Duration::from_millis(config.shutdown_grace_ms),
        };

        if let Err(e) = set.start_all(config) {
            if let Err(teardown) = set.shutdown() {
                warn!("Partial resource teardown failed: {}", teardown);
            }
            return Err(e);
        }

        info!(
            "Resources ready: {} stub(s), {} external ({})",
            set.stubs.len(),
            set.external.len(),
            mode
        );

        Ok(set)
    }

    fn start_all(&mut self, config: &ResourcesConfig) -> Result<(), ResourceError> {
        let Some(runtime) = self.runtime.as_ref() else {
            return Ok(());
        };
        let readiness = ReadinessCheck::new(config.readiness.clone())?;

        for stub_config in &config.stubs {
            let stub = runtime.block_on(StubHandle::start(stub_config, self.mode))?;
            let health_url = stub.health_url();
            self.stubs.push(stub);
            runtime.block_on(readiness.wait_ready(&stub_config.name, &health_url))?;
        }

        for external in &config.external {
            runtime.block_on(readiness.wait_ready(&external.name, &external.health_url()))?;
            self.external.push(external.clone());
        }

        Ok(())
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn stubs(&self) -> &[StubHandle] {
        &self.stubs
    }

    pub fn stub(&self, name: &str) -> Option<&StubHandle> {
        self.stubs.iter().find(|s| s.name() == name)
    }

    pub fn stub_url(&self, name: &str) -> Option<String> {
        self.stub(name).map(StubHandle::url)
    }

    pub fn external(&self) -> &[ExternalConfig] {
        &self.external
    }

    pub fn external_url(&self, name: &str) -> Option<&str> {
        self.external
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.url.as_str())
    }

    /// Stop stubs in reverse start order, then the runtime
    ///
    /// Calling this again after a successful shutdown is a no-op.
    pub fn shutdown(&mut self) -> Result<(), ResourceError> {
        let Some(runtime) = self.runtime.take() else {
            return Ok(());
        };

        let mut tasks = Vec::with_capacity(self.stubs.len());
        for stub in self.stubs.iter_mut().rev() {
            debug!("Stopping stub {}", stub.name());
            stub.signal_shutdown();
            if let Some(task) = stub.take_task() {
                tasks.push((stub.name().to_string(), task));
            }
        }

        let grace = self.grace;
        let outcomes = runtime.block_on(join_all(tasks.into_iter().map(|(name, task)| async move {
            let outcome = match tokio::time::timeout(grace, task).await {
                Ok(Ok(Ok(()))) => Ok(()),
                Ok(Ok(Err(e))) => Err(e.to_string()),
                Ok(Err(e)) => Err(format!("server task failed: {e}")),
                Err(_) => Err(format!("not stopped within {}ms", grace.as_millis())),
            };
            (name, outcome)
        })));

        runtime.shutdown_timeout(grace);

        let mut first_error = None;
        for (name, outcome) in outcomes {
            match outcome {
                Ok(()) => debug!("Stub {} stopped", name),
                Err(reason) => {
                    warn!("Stub {} shutdown: {}", name, reason);
                    first_error.get_or_insert(ResourceError::Shutdown { name, reason });
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    pub fn is_shut_down(&self) -> bool {
        self.runtime.is_none()
    }
}

impl Drop for ResourceSet {
    fn drop(&mut self) {
        if self.runtime.is_some() {
            if let Err(e) = self.shutdown() {
                warn!("Resource teardown on drop failed: {}", e);
            }
        }
    }
}

/// Environment variable name fragment for a resource name
pub fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
