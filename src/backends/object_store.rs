//! Object-store backend adapter: bucket-scoped operations against an
//! S3-compatible client. No pipelining notion applies here — each group
//! is an independent network call, run concurrently.

use async_trait::async_trait;
use serde_json::json;

use crate::core::request::Operation;
use crate::core::{Executor, GroupSpec};
use crate::error::{AgentError, Result};
use crate::metrics;

/// The closed set of operations the object-store agent supports
/// (spec.md §3/§4.1).
#[derive(Debug, Clone)]
pub enum S3Op {
    ListBuckets,
    ListObjects { bucket: String, prefix: String, max_keys: i32 },
    GetObject { bucket: String, key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum S3GroupKey {
    ListBuckets,
    ListObjects(String, String, i32),
    GetObject(String, String),
}

/// Success payloads. `GetObject`'s body is `Bytes` so that coalesced
/// callers each get an independently consumable, cheaply-cloned copy —
/// the "buffer fully" resolution to the streaming-fan-out open question
/// (spec.md §9).
#[derive(Debug, Clone)]
pub enum S3Output {
    Listing(serde_json::Value),
    Object { content_type: String, content_length: u64, body: bytes::Bytes },
}

impl Operation for S3Op {
    type GroupKey = S3GroupKey;
    type Output = S3Output;

    fn group_key(&self) -> Option<S3GroupKey> {
        Some(match self {
            S3Op::ListBuckets => S3GroupKey::ListBuckets,
            S3Op::ListObjects { bucket, prefix, max_keys } => {
                S3GroupKey::ListObjects(bucket.clone(), prefix.clone(), *max_keys)
            },
            S3Op::GetObject { bucket, key } => S3GroupKey::GetObject(bucket.clone(), key.clone()),
        })
    }
}

pub struct ObjectStoreExecutor {
    client: aws_sdk_s3::Client,
}

impl ObjectStoreExecutor {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Best-effort connectivity probe used at startup (non-fatal on failure).
    pub async fn probe(&self) -> std::result::Result<(), String> {
        self.client.list_buckets().send().await.map(|_| ()).map_err(|e| e.to_string())
    }

    async fn run_one(&self, op: &S3Op) -> Result<S3Output> {
        let result = match op {
            S3Op::ListBuckets => self.list_buckets().await,
            S3Op::ListObjects { bucket, prefix, max_keys } => {
                self.list_objects(bucket, prefix, *max_keys).await
            },
            S3Op::GetObject { bucket, key } => self.get_object(bucket, key).await,
        };

        metrics::record_backend_outcome("s3", op_name(op), result.is_ok());
        result
    }

    async fn list_buckets(&self) -> Result<S3Output> {
        let resp = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| AgentError::Backend(format!("ListBuckets failed: {e}")))?;

        let buckets: Vec<_> = resp
            .buckets()
            .iter()
            .map(|b| {
                json!({
                    "name": b.name(),
                    "creation_date": b.creation_date().map(|d| d.to_string()),
                })
            })
            .collect();

        Ok(S3Output::Listing(json!({ "buckets": buckets })))
    }

    async fn list_objects(&self, bucket: &str, prefix: &str, max_keys: i32) -> Result<S3Output> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(|e| AgentError::Backend(format!("ListObjects failed: {e}")))?;

        let objects: Vec<_> = resp
            .contents()
            .iter()
            .map(|o| {
                json!({
                    "key": o.key(),
                    "size": o.size(),
                    "last_modified": o.last_modified().map(|d| d.to_string()),
                })
            })
            .collect();

        Ok(S3Output::Listing(json!({ "objects": objects, "bucket": bucket })))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<S3Output> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AgentError::Backend(format!("GetObject failed: {e}")))?;

        let content_type = resp.content_type().unwrap_or("application/octet-stream").to_string();

        let aggregated = resp
            .body
            .collect()
            .await
            .map_err(|e| AgentError::Backend(format!("failed to read object body: {e}")))?;
        let body = aggregated.into_bytes();
        let content_length = body.len() as u64;

        Ok(S3Output::Object { content_type, content_length, body })
    }
}

fn op_name(op: &S3Op) -> &'static str {
    match op {
        S3Op::ListBuckets => "ListBuckets",
        S3Op::ListObjects { .. } => "ListObjects",
        S3Op::GetObject { .. } => "GetObject",
    }
}

#[async_trait]
impl Executor<S3Op> for ObjectStoreExecutor {
    async fn execute(&self, groups: &[GroupSpec<S3Op>]) -> Vec<Result<S3Output>> {
        let calls = groups.iter().map(|g| self.run_one(&g.representative));
        futures::future::join_all(calls).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouping_key_collapses_list_buckets() {
        let a = S3Op::ListBuckets.group_key();
        let b = S3Op::ListBuckets.group_key();
        assert_eq!(a, b);
    }

    #[test]
    fn grouping_key_distinguishes_by_bucket_prefix_max_keys() {
        let a = S3Op::ListObjects { bucket: "b1".into(), prefix: "p".into(), max_keys: 10 }.group_key();
        let b = S3Op::ListObjects { bucket: "b2".into(), prefix: "p".into(), max_keys: 10 }.group_key();
        assert_ne!(a, b);
    }

    #[test]
    fn grouping_key_matches_for_equivalent_get_object() {
        let a = S3Op::GetObject { bucket: "b".into(), key: "k".into() }.group_key();
        let b = S3Op::GetObject { bucket: "b".into(), key: "k".into() }.group_key();
        assert_eq!(a, b);
    }
}
