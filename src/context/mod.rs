//! Shared resource context and its provisioner
//!
//! The context is built once per suite, owned by the orchestrator, and lent
//! to the runner by reference. Release happens exactly once, in reverse
//! order of acquisition.

mod scope;
mod shared;

pub use scope::TestScope;
pub use shared::SharedResourceContext;

use thiserror::Error;
use tracing::{info, warn};

use crate::policy::{ExecutionMode, ParallelismConfig};
use crate::resources::{ResourceError, ResourceSet, ResourcesConfig};
use crate::store::{FixtureStore, StoreConfig, StoreError};

/// Provisioning errors; all of them abort the suite
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Store provisioning failed: {0}")]
    Store(#[from] StoreError),

    #[error("Resource provisioning failed: {0}")]
    Resources(#[from] ResourceError),

    #[error("Provisioning failed: {0}")]
    Backend(String),
}

/// Teardown errors; logged, never turned into a suite failure
#[derive(Error, Debug)]
pub enum TeardownError {
    #[error("Resource teardown failed: {0}")]
    Resources(ResourceError),

    #[error("Store teardown failed: {0}")]
    Store(StoreError),

    #[error("Resource teardown failed ({resources}) and store teardown failed ({store})")]
    Both {
        resources: ResourceError,
        store: StoreError,
    },

    #[error("Teardown failed: {0}")]
    Backend(String),
}

/// What the provisioner builds
#[derive(Clone, Debug)]
pub struct ProvisionOptions {
    pub enable_store: bool,
    pub enable_resources: bool,
    pub store: StoreConfig,
    pub resources: ResourcesConfig,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            enable_store: true,
            enable_resources: true,
            store: StoreConfig::default(),
            resources: ResourcesConfig::default(),
        }
    }
}

impl ProvisionOptions {
    pub fn without_store(mut self) -> Self {
        self.enable_store = false;
        self
    }

    pub fn without_resources(mut self) -> Self {
        self.enable_resources = false;
        self
    }
}

/// Builds and releases a suite's shared context
pub trait Provisioner {
    type Context;

    /// Build the context; any error aborts the suite before tests run
    fn provision(
        &self,
        mode: ExecutionMode,
        parallelism: &ParallelismConfig,
    ) -> Result<Self::Context, ProvisionError>;

    /// Tear the context down
    fn release(&self, ctx: Self::Context) -> Result<(), TeardownError>;
}

/// Provisioner for the SQLite store and HTTP resources
#[derive(Clone, Debug, Default)]
pub struct FixtureProvisioner {
    options: ProvisionOptions,
}

impl FixtureProvisioner {
    pub fn new(options: ProvisionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ProvisionOptions {
        &self.options
    }
}

impl Provisioner for FixtureProvisioner {
    type Context = SharedResourceContext;

    fn provision(
        &self,
        mode: ExecutionMode,
        parallelism: &ParallelismConfig,
    ) -> Result<SharedResourceContext, ProvisionError> {
        let store = if self.options.enable_store {
            Some(FixtureStore::open(&self.options.store, mode)?)
        } else {
            None
        };

        let resources = if self.options.enable_resources {
            match ResourceSet::start(&self.options.resources, mode) {
                Ok(set) => Some(set),
                Err(e) => {
                    if let Some(store) = store {
                        if let Err(close) = store.close() {
                            warn!("Store cleanup after failed provisioning: {}", close);
                        }
                    }
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        info!(
            "Provisioned fixtures (store: {}, resources: {}, mode: {})",
            store.is_some(),
            resources.is_some(),
            mode
        );

        Ok(SharedResourceContext::new(
            mode,
            parallelism.worker_count(mode),
            store,
            resources,
        ))
    }

    fn release(&self, mut ctx: SharedResourceContext) -> Result<(), TeardownError> {
        ctx.release()
    }
}
