//! End-to-end scenarios for the key-value HTTP surface, exercised against
//! a fake in-process store rather than a real Redis instance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request as HttpRequest, StatusCode};
use axum::routing::{delete, get, post};
use axum::Router;
use tower::ServiceExt;

use batch_sidecar::backends::key_value::{KvOp, KvOutput};
use batch_sidecar::config::SharedConfig;
use batch_sidecar::core::{Batcher, BatcherConfig, Executor, GroupSpec};
use batch_sidecar::error::{AgentError, Result};
use batch_sidecar::http::kv_routes::{self, KvAppState};

/// In-memory stand-in for the Redis backend: one pipeline call per batch,
/// applied against a shared map, so round-trip semantics are exercised
/// for real rather than canned.
struct FakeKvStore {
    store: Mutex<HashMap<String, String>>,
    calls: AtomicUsize,
}

impl FakeKvStore {
    fn new() -> Self {
        Self { store: Mutex::new(HashMap::new()), calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Executor<KvOp> for FakeKvStore {
    async fn execute(&self, groups: &[GroupSpec<KvOp>]) -> Vec<Result<KvOutput>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut store = self.store.lock().unwrap();
        groups
            .iter()
            .map(|g| match &g.representative {
                KvOp::Get { key } => Ok(KvOutput::Value(store.get(key).cloned().unwrap_or_default())),
                KvOp::Set { key, value } => {
                    store.insert(key.clone(), value.clone());
                    Ok(KvOutput::Ack)
                },
                KvOp::Del { key } => {
                    let existed = store.remove(key).is_some();
                    Ok(KvOutput::Deleted(if existed { 1 } else { 0 }))
                },
                KvOp::Exists { key } => {
                    Ok(KvOutput::Exists(if store.contains_key(key) { 1 } else { 0 }))
                },
            })
            .collect()
    }
}

struct FakeAlwaysErr {
    calls: AtomicUsize,
}

#[async_trait]
impl Executor<KvOp> for FakeAlwaysErr {
    async fn execute(&self, groups: &[GroupSpec<KvOp>]) -> Vec<Result<KvOutput>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let err = AgentError::Backend("connection refused".into());
        groups.iter().map(|_| Err(err.clone())).collect()
    }
}

fn test_config() -> SharedConfig {
    SharedConfig {
        port: 0,
        batching_enabled: true,
        batch_window: Duration::from_millis(30),
        max_batch_size: 10,
        debug: false,
    }
}

fn build_router<E: Executor<KvOp>>(
    executor: Arc<E>,
    config: SharedConfig,
) -> (Router, Arc<Batcher<KvOp, E>>) {
    let batcher = Batcher::new(
        BatcherConfig {
            enabled: config.batching_enabled,
            batch_window: config.batch_window,
            max_batch_size: config.max_batch_size,
        },
        executor,
    );
    let state = KvAppState { batcher: batcher.clone(), config: Arc::new(config) };
    let router = Router::new()
        .route("/redis/get", get(kv_routes::get::<E>))
        .route("/redis/set", post(kv_routes::set::<E>))
        .route("/redis/del", delete(kv_routes::del::<E>))
        .route("/redis/exists", get(kv_routes::exists::<E>))
        .with_state(state);
    (router, batcher)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn round_trip_set_then_get_then_del_then_exists() {
    let executor = Arc::new(FakeKvStore::new());
    let (router, batcher) = build_router(executor, test_config());

    let set_resp = router
        .clone()
        .oneshot(HttpRequest::builder().method("POST").uri("/redis/set?key=k&value=v").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(set_resp.status(), StatusCode::OK);

    let get_resp = router
        .clone()
        .oneshot(HttpRequest::builder().uri("/redis/get?key=k").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(get_resp).await["value"], "v");

    let del_resp = router
        .clone()
        .oneshot(HttpRequest::builder().method("DELETE").uri("/redis/del?key=k").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(del_resp).await["deleted"], 1);

    let exists_resp = router
        .clone()
        .oneshot(HttpRequest::builder().uri("/redis/exists?key=k").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(exists_resp).await["exists"], false);

    batcher.shutdown().await;
}

#[tokio::test]
async fn get_on_never_set_key_returns_empty_value_not_error() {
    let executor = Arc::new(FakeKvStore::new());
    let (router, batcher) = build_router(executor, test_config());

    let response = router
        .oneshot(HttpRequest::builder().uri("/redis/get?key=missing").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["value"], "");
    batcher.shutdown().await;
}

#[tokio::test]
async fn s2_distinct_keys_share_one_pipeline_round_trip() {
    let executor = Arc::new(FakeKvStore::new());
    {
        let mut store = executor.store.lock().unwrap();
        store.insert("a".into(), "1".into());
        store.insert("b".into(), "2".into());
        store.insert("c".into(), "3".into());
    }
    let (router, batcher) = build_router(executor.clone(), test_config());

    let mut handles = Vec::new();
    for key in ["a", "b", "c"] {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            let response = router
                .oneshot(HttpRequest::builder().uri(format!("/redis/get?key={key}")).body(Body::empty()).unwrap())
                .await
                .unwrap();
            body_json(response).await["value"].as_str().unwrap().to_string()
        }));
    }
    let mut values: Vec<String> = Vec::new();
    for h in handles {
        values.push(h.await.unwrap());
    }
    values.sort();
    assert_eq!(values, vec!["1", "2", "3"]);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    batcher.shutdown().await;
}

#[tokio::test]
async fn s3_duplicate_keys_coalesce_into_one_command() {
    let executor = Arc::new(FakeKvStore::new());
    {
        let mut store = executor.store.lock().unwrap();
        store.insert("x".into(), "same".into());
    }
    let (router, batcher) = build_router(executor.clone(), test_config());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            let response = router
                .oneshot(HttpRequest::builder().uri("/redis/get?key=x").body(Body::empty()).unwrap())
                .await
                .unwrap();
            body_json(response).await["value"].as_str().unwrap().to_string()
        }));
    }
    for h in handles {
        assert_eq!(h.await.unwrap(), "same");
    }
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    batcher.shutdown().await;
}

#[tokio::test]
async fn s5_backend_error_reaches_all_coalesced_callers_identically() {
    let executor = Arc::new(FakeAlwaysErr { calls: AtomicUsize::new(0) });
    let (router, batcher) = build_router(executor.clone(), test_config());

    let mut handles = Vec::new();
    for _ in 0..3 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            let response = router
                .oneshot(HttpRequest::builder().uri("/redis/exists?key=a").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            String::from_utf8(bytes.to_vec()).unwrap()
        }));
    }
    let mut bodies = Vec::new();
    for h in handles {
        bodies.push(h.await.unwrap());
    }
    assert!(bodies.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    batcher.shutdown().await;
}

#[tokio::test]
async fn validation_missing_value_on_set_returns_400() {
    let executor = Arc::new(FakeKvStore::new());
    let (router, batcher) = build_router(executor.clone(), test_config());

    let response = router
        .oneshot(HttpRequest::builder().method("POST").uri("/redis/set?key=k").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    batcher.shutdown().await;
}
