//! Object-store HTTP surface (spec.md §6, object-store variant).
//!
//! Handlers are generic over the [`Executor`] implementation so tests can
//! substitute a fake backend the same way the batching core is tested
//! against a fake `Executor` rather than a real S3 client.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::backends::object_store::{S3Op, S3Output};
use crate::config::SharedConfig;
use crate::core::{Batcher, Executor, Request};
use crate::error::{AgentError, Result};
use crate::http::require_param;

pub struct S3AppState<E: Executor<S3Op>> {
    pub batcher: Arc<Batcher<S3Op, E>>,
    pub config: Arc<SharedConfig>,
    pub default_bucket: Option<String>,
}

impl<E: Executor<S3Op>> Clone for S3AppState<E> {
    fn clone(&self) -> Self {
        Self {
            batcher: self.batcher.clone(),
            config: self.config.clone(),
            default_bucket: self.default_bucket.clone(),
        }
    }
}

async fn submit<E: Executor<S3Op>>(state: &S3AppState<E>, op: S3Op) -> Result<S3Output> {
    let (request, handle) = Request::new(op);
    state.batcher.submit(request).await;
    handle.wait().await
}

fn resolve_bucket<E: Executor<S3Op>>(
    state: &S3AppState<E>,
    params: &HashMap<String, String>,
) -> Result<String> {
    match params.get("bucket").filter(|v| !v.is_empty()) {
        Some(bucket) => Ok(bucket.clone()),
        None => state
            .default_bucket
            .clone()
            .ok_or_else(|| AgentError::Validation("missing required parameter \"bucket\"".into())),
    }
}

pub async fn list_buckets<E: Executor<S3Op>>(State(state): State<S3AppState<E>>) -> Response {
    match submit(&state, S3Op::ListBuckets).await {
        Ok(S3Output::Listing(value)) => Json(value).into_response(),
        Ok(_) => AgentError::Serialization("unexpected executor output".into()).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn list_objects<E: Executor<S3Op>>(
    State(state): State<S3AppState<E>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let bucket = match resolve_bucket(&state, &params) {
        Ok(b) => b,
        Err(e) => return e.into_response(),
    };
    let prefix = params.get("prefix").cloned().unwrap_or_default();
    let max_keys = params
        .get("max_keys")
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(1000);

    match submit(&state, S3Op::ListObjects { bucket, prefix, max_keys }).await {
        Ok(S3Output::Listing(value)) => Json(value).into_response(),
        Ok(_) => AgentError::Serialization("unexpected executor output".into()).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_object<E: Executor<S3Op>>(
    State(state): State<S3AppState<E>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let bucket = match resolve_bucket(&state, &params) {
        Ok(b) => b,
        Err(e) => return e.into_response(),
    };
    let key = match require_param(&params, "key") {
        Ok(k) => k,
        Err(e) => return e.into_response(),
    };

    match submit(&state, S3Op::GetObject { bucket, key }).await {
        Ok(S3Output::Object { content_type, content_length, body }) => (
            [
                (header::CONTENT_TYPE, content_type),
                (header::CONTENT_LENGTH, content_length.to_string()),
            ],
            body,
        )
            .into_response(),
        Ok(_) => AgentError::Serialization("unexpected executor output".into()).into_response(),
        Err(e) => e.into_response(),
    }
}
