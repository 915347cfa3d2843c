//! HTTP service stubs
//!
//! Each stub is an axum server answering canned routes and journaling the
//! requests it receives.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{ResourceError, RouteConfig, StubConfig};
use crate::policy::ExecutionMode;

/// Health route served by every stub
pub const HEALTH_PATH: &str = "/__fixture/health";

/// Header tests use to scope their requests to a namespace
pub const NAMESPACE_HEADER: &str = "x-fixture-namespace";

/// Journal key used when requests are not scoped
const SHARED_JOURNAL: &str = "";

/// A request observed by a stub
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub namespace: Option<String>,
    pub body: String,
}

struct StubState {
    name: String,
    mode: ExecutionMode,
    routes: Vec<RouteConfig>,
    journal: Mutex<HashMap<String, Vec<RecordedRequest>>>,
}

impl StubState {
    fn journal_key<'a>(&self, namespace: Option<&'a str>) -> &'a str {
        match self.mode {
            ExecutionMode::FullyParallel => namespace.unwrap_or(SHARED_JOURNAL),
            ExecutionMode::Serialized => SHARED_JOURNAL,
        }
    }

    fn record(&self, request: RecordedRequest) {
        let key = self.journal_key(request.namespace.as_deref()).to_string();
        self.journal.lock().entry(key).or_default().push(request);
    }

    fn find_route(&self, method: &Method, path: &str) -> Option<&RouteConfig> {
        self.routes
            .iter()
            .find(|r| r.path == path && r.method.eq_ignore_ascii_case(method.as_str()))
    }
}

/// Running stub server
pub struct StubHandle {
    name: String,
    addr: SocketAddr,
    state: Arc<StubState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<std::io::Result<()>>>,
}

impl StubHandle {
    /// Bind and start serving; must run inside a tokio runtime
    pub async fn start(config: &StubConfig, mode: ExecutionMode) -> Result<Self, ResourceError> {
        let bind = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind)
            .await
            .map_err(|source| ResourceError::Bind {
                name: config.name.clone(),
                addr: bind.clone(),
                source,
            })?;
        let addr = listener
            .local_addr()
            .map_err(|source| ResourceError::Bind {
                name: config.name.clone(),
                addr: bind,
                source,
            })?;

        let state = Arc::new(StubState {
            name: config.name.clone(),
            mode,
            routes: config.routes.clone(),
            journal: Mutex::new(HashMap::new()),
        });

        let app = Router::new()
            .route(HEALTH_PATH, get(|| async { StatusCode::OK }))
            .fallback(handle_request)
            .with_state(Arc::clone(&state));

        let (tx, rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
        });

        debug!("Stub {} listening on {}", config.name, addr);

        Ok(Self {
            name: config.name.clone(),
            addr,
            state,
            shutdown: Some(tx),
            task: Some(task),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn health_url(&self) -> String {
        format!("{}{}", self.url(), HEALTH_PATH)
    }

    /// Requests recorded for `namespace`
    ///
    /// Under serialized mode every request lands in one shared journal and
    /// the namespace is ignored.
    pub fn requests(&self, namespace: Option<&str>) -> Vec<RecordedRequest> {
        let key = self.state.journal_key(namespace);
        self.state
            .journal
            .lock()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Total requests recorded across all namespaces
    pub fn request_count(&self) -> usize {
        self.state.journal.lock().values().map(Vec::len).sum()
    }

    /// Whether the server task is still owned by this handle
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Signal the server to stop accepting connections
    pub(crate) fn signal_shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    /// Server task, once
    pub(crate) fn take_task(&mut self) -> Option<JoinHandle<std::io::Result<()>>> {
        self.task.take()
    }
}

impl std::fmt::Debug for StubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StubHandle")
            .field("name", &self.name)
            .field("addr", &self.addr)
            .finish()
    }
}

async fn handle_request(
    State(state): State<Arc<StubState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let namespace = headers
        .get(NAMESPACE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    state.record(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        namespace,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    match state.find_route(&method, uri.path()) {
        Some(route) => {
            let status = StatusCode::from_u16(route.status).unwrap_or_else(|_| {
                warn!(
                    "Stub {} route {} has invalid status {}",
                    state.name, route.path, route.status
                );
                StatusCode::INTERNAL_SERVER_ERROR
            });
            (
                status,
                [(header::CONTENT_TYPE, route.content_type.clone())],
                route.body.clone(),
            )
                .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            format!("no stub route for {} {}", method, uri.path()),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(mode: ExecutionMode) -> StubState {
        StubState {
            name: "billing".to_string(),
            mode,
            routes: vec![RouteConfig::new("POST", "/invoices", 201, "{}")],
            journal: Mutex::new(HashMap::new()),
        }
    }

    fn request(namespace: Option<&str>) -> RecordedRequest {
        RecordedRequest {
            method: "POST".to_string(),
            path: "/invoices".to_string(),
            query: None,
            namespace: namespace.map(str::to_string),
            body: String::new(),
        }
    }

    #[test]
    fn test_route_matching_ignores_method_case() {
        let state = state(ExecutionMode::Serialized);
        assert!(state.find_route(&Method::POST, "/invoices").is_some());
        assert!(state.find_route(&Method::GET, "/invoices").is_none());
        assert!(state.find_route(&Method::POST, "/other").is_none());
    }

    #[test]
    fn test_parallel_journal_is_per_namespace() {
        let state = state(ExecutionMode::FullyParallel);
        state.record(request(Some("a")));
        state.record(request(Some("b")));
        state.record(request(Some("b")));

        let journal = state.journal.lock();
        assert_eq!(journal.get("a").map(Vec::len), Some(1));
        assert_eq!(journal.get("b").map(Vec::len), Some(2));
    }

    #[test]
    fn test_serialized_journal_is_shared() {
        let state = state(ExecutionMode::Serialized);
        state.record(request(Some("a")));
        state.record(request(Some("b")));

        let journal = state.journal.lock();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.get(SHARED_JOURNAL).map(Vec::len), Some(2));
    }
}
