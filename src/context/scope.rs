//! Per-test view of the shared context

use super::SharedResourceContext;
use crate::policy::ExecutionMode;
use crate::resources::{RecordedRequest, NAMESPACE_HEADER};
use crate::store::{sanitize, StoreError, StoreNamespace};

/// Namespace used by every test in serialized mode
const SHARED_NAMESPACE: &str = "main";

/// Borrowed fixtures for one test case
///
/// Under fully parallel mode the scope carries its own store namespace and
/// a matching stub namespace, so concurrent tests never see each other's
/// writes.
pub struct TestScope<'a> {
    ctx: &'a SharedResourceContext,
    test_name: String,
    namespace: String,
    store: Option<StoreNamespace>,
}

impl<'a> TestScope<'a> {
    pub(crate) fn new(ctx: &'a SharedResourceContext, test_name: &str) -> Result<Self, StoreError> {
        let store = ctx.store().map(|s| s.namespace(test_name)).transpose()?;

        let namespace = match (ctx.mode(), &store) {
            (ExecutionMode::Serialized, _) => SHARED_NAMESPACE.to_string(),
            (ExecutionMode::FullyParallel, Some(ns)) => ns.name().to_string(),
            (ExecutionMode::FullyParallel, None) => {
                format!("{}-{:08x}", sanitize(test_name), rand::random::<u32>())
            }
        };

        Ok(Self {
            ctx,
            test_name: test_name.to_string(),
            namespace,
            store,
        })
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn mode(&self) -> ExecutionMode {
        self.ctx.mode()
    }

    pub fn context(&self) -> &'a SharedResourceContext {
        self.ctx
    }

    /// This test's store namespace
    pub fn store(&self) -> Result<&StoreNamespace, StoreError> {
        self.store.as_ref().ok_or(StoreError::Disabled)
    }

    pub fn stub_url(&self, name: &str) -> Option<String> {
        self.ctx.resources().and_then(|r| r.stub_url(name))
    }

    pub fn external_url(&self, name: &str) -> Option<&'a str> {
        self.ctx.resources().and_then(|r| r.external_url(name))
    }

    /// Header to attach to stub requests so they land in this test's journal
    pub fn namespace_header(&self) -> (&'static str, &str) {
        (NAMESPACE_HEADER, &self.namespace)
    }

    /// Requests `stub` recorded for this test
    pub fn recorded_requests(&self, stub: &str) -> Vec<RecordedRequest> {
        self.ctx
            .resources()
            .and_then(|r| r.stub(stub))
            .map(|s| s.requests(Some(&self.namespace)))
            .unwrap_or_default()
    }
}
