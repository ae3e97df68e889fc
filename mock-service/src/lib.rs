//! In-process stand-in for the timestamp API that throng drives: `/lasttimestamp`, `/add`, `/get`.
use axum::{
    body::Body,
    debug_handler,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub use axum::http::StatusCode;

const MIN_ENTRIES: u64 = 1;
const MAX_ENTRIES: u64 = 5;

#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Paths that answer `failure_status` instead of their normal response.
    pub failing: Vec<String>,
    pub failure_status: StatusCode,
    /// Added before every response.
    pub delay: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            failing: vec![],
            failure_status: StatusCode::INTERNAL_SERVER_ERROR,
            delay: Duration::ZERO,
        }
    }
}

impl MockConfig {
    pub fn failing(mut self, path: &str) -> Self {
        self.failing.push(path.to_string());
        self
    }

    pub fn failure_status(mut self, status: StatusCode) -> Self {
        self.failure_status = status;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct Store {
    total: AtomicU64,
    last_timestamp: AtomicU64,
    hits: Mutex<HashMap<String, u64>>,
}

impl Store {
    fn hit(&self, path: &str) {
        *self
            .hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_string())
            .or_insert(0) += 1;
    }

    fn hits(&self, path: &str) -> u64 {
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Clone)]
struct AppState {
    config: Arc<MockConfig>,
    store: Arc<Store>,
}

/// A mock server running on a background task. Aborted on drop.
pub struct MockHandle {
    pub addr: SocketAddr,
    store: Arc<Store>,
    task: JoinHandle<()>,
}

impl MockHandle {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received on `path`, failed ones included.
    pub fn hits(&self, path: &str) -> u64 {
        self.store.hits(path)
    }

    /// Entries accepted by `/add` so far.
    pub fn total(&self) -> u64 {
        self.store.total.load(Ordering::Acquire)
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Binds an ephemeral port on 127.0.0.1 and serves `config` from a background task.
pub async fn spawn(config: MockConfig) -> anyhow::Result<MockHandle> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let store = Arc::new(Store::default());
    let app = router(config, Arc::clone(&store));

    let task = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!("Mock service stopped: {err}");
        }
    });

    debug!("Mock service listening on {addr}");
    Ok(MockHandle { addr, store, task })
}

/// Serves `config` on `addr` until the process exits.
pub async fn run(addr: SocketAddr, config: MockConfig) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Mock service listening on {}", listener.local_addr()?);
    axum::serve(listener, router(config, Arc::new(Store::default()))).await?;
    Ok(())
}

fn router(config: MockConfig, store: Arc<Store>) -> Router {
    let state = AppState {
        config: Arc::new(config),
        store,
    };

    Router::new()
        .route("/lasttimestamp", get(last_timestamp))
        .route("/add", post(add))
        .route("/get", get(current))
        .layer(middleware::from_fn_with_state(state.clone(), inject))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn inject(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    state.store.hit(&path);

    if !state.config.delay.is_zero() {
        tokio::time::sleep(state.config.delay).await;
    }

    if state.config.failing.iter().any(|failing| *failing == path) {
        debug!("Injecting {} on {path}", state.config.failure_status);
        return (state.config.failure_status, Body::from("injected failure")).into_response();
    }

    next.run(request).await
}

#[derive(Debug, Serialize)]
struct Timestamp {
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct Added {
    added: u64,
    total: u64,
}

#[derive(Debug, Serialize)]
struct Current {
    total: u64,
    timestamp: u64,
}

#[debug_handler]
async fn last_timestamp(State(state): State<AppState>) -> Json<Timestamp> {
    Json(Timestamp {
        timestamp: state.store.last_timestamp.load(Ordering::Acquire),
    })
}

#[debug_handler]
async fn add(State(state): State<AppState>, body: String) -> Result<Json<Added>, StatusCode> {
    let added = body
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|count| (MIN_ENTRIES..=MAX_ENTRIES).contains(count))
        .ok_or(StatusCode::BAD_REQUEST)?;

    let total = state.store.total.fetch_add(added, Ordering::AcqRel) + added;
    state.store.last_timestamp.store(unix_millis(), Ordering::Release);
    Ok(Json(Added { added, total }))
}

#[debug_handler]
async fn current(State(state): State<AppState>) -> Json<Current> {
    Json(Current {
        total: state.store.total.load(Ordering::Acquire),
        timestamp: state.store.last_timestamp.load(Ordering::Acquire),
    })
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_millis() as u64)
        .unwrap_or_default()
}
