//! Key-value HTTP surface (spec.md §6, key-value variant).
//!
//! Handlers are generic over the [`Executor`] implementation so tests can
//! substitute a fake backend the same way the batching core is tested
//! against a fake `Executor` rather than a real Redis client.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::backends::key_value::{KvOp, KvOutput};
use crate::config::SharedConfig;
use crate::core::{Batcher, Executor, Request};
use crate::error::Result;
use crate::http::require_param;

pub struct KvAppState<E: Executor<KvOp>> {
    pub batcher: Arc<Batcher<KvOp, E>>,
    pub config: Arc<SharedConfig>,
}

impl<E: Executor<KvOp>> Clone for KvAppState<E> {
    fn clone(&self) -> Self {
        Self { batcher: self.batcher.clone(), config: self.config.clone() }
    }
}

async fn submit<E: Executor<KvOp>>(state: &KvAppState<E>, op: KvOp) -> Result<KvOutput> {
    let (request, handle) = Request::new(op);
    state.batcher.submit(request).await;
    handle.wait().await
}

pub async fn get<E: Executor<KvOp>>(
    State(state): State<KvAppState<E>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let key = match require_param(&params, "key") {
        Ok(k) => k,
        Err(e) => return e.into_response(),
    };

    match submit(&state, KvOp::Get { key }).await {
        Ok(KvOutput::Value(value)) => Json(json!({ "value": value })).into_response(),
        Ok(_) => unreachable_output().into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn set<E: Executor<KvOp>>(
    State(state): State<KvAppState<E>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let key = match require_param(&params, "key") {
        Ok(k) => k,
        Err(e) => return e.into_response(),
    };
    let value = match require_param(&params, "value") {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };

    match submit(&state, KvOp::Set { key, value }).await {
        Ok(KvOutput::Ack) => Json(json!({ "result": "OK" })).into_response(),
        Ok(_) => unreachable_output().into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn del<E: Executor<KvOp>>(
    State(state): State<KvAppState<E>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let key = match require_param(&params, "key") {
        Ok(k) => k,
        Err(e) => return e.into_response(),
    };

    match submit(&state, KvOp::Del { key }).await {
        Ok(KvOutput::Deleted(n)) => Json(json!({ "deleted": n })).into_response(),
        Ok(_) => unreachable_output().into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn exists<E: Executor<KvOp>>(
    State(state): State<KvAppState<E>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let key = match require_param(&params, "key") {
        Ok(k) => k,
        Err(e) => return e.into_response(),
    };

    match submit(&state, KvOp::Exists { key }).await {
        Ok(KvOutput::Exists(n)) => Json(json!({ "exists": n > 0 })).into_response(),
        Ok(_) => unreachable_output().into_response(),
        Err(e) => e.into_response(),
    }
}

fn unreachable_output() -> crate::error::AgentError {
    crate::error::AgentError::Serialization("unexpected executor output".into())
}
