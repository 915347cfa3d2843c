//! The suite-wide fixture context

use tracing::{debug, warn};

use super::{TeardownError, TestScope};
use crate::policy::ExecutionMode;
use crate::resources::{env_key, ResourceSet};
use crate::store::{FixtureStore, StoreError};

/// Store and resource handles for one suite invocation
pub struct SharedResourceContext {
    mode: ExecutionMode,
    workers: usize,
    store: Option<FixtureStore>,
    resources: Option<ResourceSet>,
    released: bool,
}

impl SharedResourceContext {
    pub(crate) fn new(
        mode: ExecutionMode,
        workers: usize,
        store: Option<FixtureStore>,
        resources: Option<ResourceSet>,
    ) -> Self {
        Self {
            mode,
            workers: workers.max(1),
            store,
            resources,
            released: false,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Concurrent test cases the runner may schedule
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    pub fn store(&self) -> Option<&FixtureStore> {
        self.store.as_ref()
    }

    pub fn resources(&self) -> Option<&ResourceSet> {
        self.resources.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Per-test view of the fixtures
    pub fn scope(&self, test_name: &str) -> Result<TestScope<'_>, StoreError> {
        TestScope::new(self, test_name)
    }

    /// Variables an out-of-process runner needs to reach the fixtures
    pub fn exported_env(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            (
                "FIXTURE_EXECUTION_MODE".to_string(),
                self.mode.as_str().to_string(),
            ),
            ("FIXTURE_WORKERS".to_string(), self.workers.to_string()),
        ];

        if let Some(store) = &self.store {
            vars.push((
                "FIXTURE_STORE_DIR".to_string(),
                store.root().display().to_string(),
            ));
            vars.push((
                "FIXTURE_STORE_DB".to_string(),
                store.main_path().display().to_string(),
            ));
        }

        if let Some(resources) = &self.resources {
            for stub in resources.stubs() {
                vars.push((format!("FIXTURE_STUB_{}_URL", env_key(stub.name())), stub.url()));
            }
            for external in resources.external() {
                vars.push((
                    format!("FIXTURE_EXTERNAL_{}_URL", env_key(&external.name)),
                    external.url.clone(),
                ));
            }
        }

        vars
    }

    /// Tear down resources, then the store
    ///
    /// Only the first call does work; later calls return `Ok(())`.
    pub fn release(&mut self) -> Result<(), TeardownError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let resources = match self.resources.take() {
            Some(mut set) => set.shutdown().err(),
            None => None,
        };
        let store = self.store.take().and_then(|s| s.close().err());

        debug!("Shared resource context released");

        match (resources, store) {
            (None, None) => Ok(()),
            (Some(resources), None) => Err(TeardownError::Resources(resources)),
            (None, Some(store)) => Err(TeardownError::Store(store)),
            (Some(resources), Some(store)) => Err(TeardownError::Both { resources, store }),
        }
    }
}

impl Drop for SharedResourceContext {
    fn drop(&mut self) {
        if !self.released {
            warn!("Shared resource context dropped without release, tearing down");
            if let Err(e) = self.release() {
                warn!("Teardown on drop failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for SharedResourceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedResourceContext")
            .field("mode", &self.mode)
            .field("workers", &self.workers)
            .field("store", &self.store.as_ref().map(|s| s.root().to_path_buf()))
            .field("resources", &self.resources.as_ref().map(|r| r.stubs().len()))
            .field("released", &self.released)
            .finish()
    }
}
