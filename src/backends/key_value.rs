//! Key-value backend adapter: a Redis-compatible store accessed through a
//! pooled connection. Unlike the object-store side, every group in a batch
//! is folded into a single pipelined round trip (spec.md §4.2/§4.3).

use async_trait::async_trait;
use bb8_redis::RedisConnectionManager;
use redis::Value as RedisValue;

use crate::core::request::Operation;
use crate::core::{Executor, GroupSpec};
use crate::error::{AgentError, Result};
use crate::metrics;

/// The closed set of operations the key-value agent supports
/// (spec.md §3/§4.1).
#[derive(Debug, Clone)]
pub enum KvOp {
    Get { key: String },
    Set { key: String, value: String },
    Del { key: String },
    Exists { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KvGroupKey {
    Get(String),
    Set(String, String),
    Del(String),
    Exists(String),
}

#[derive(Debug, Clone)]
pub enum KvOutput {
    /// A `GET` on a missing key yields an empty value, not an error.
    Value(String),
    Ack,
    Deleted(i64),
    Exists(i64),
}

impl Operation for KvOp {
    type GroupKey = KvGroupKey;
    type Output = KvOutput;

    fn group_key(&self) -> Option<KvGroupKey> {
        Some(match self {
            KvOp::Get { key } => KvGroupKey::Get(key.clone()),
            KvOp::Set { key, value } => KvGroupKey::Set(key.clone(), value.clone()),
            KvOp::Del { key } => KvGroupKey::Del(key.clone()),
            KvOp::Exists { key } => KvGroupKey::Exists(key.clone()),
        })
    }
}

pub struct KeyValueExecutor {
    pool: bb8::Pool<RedisConnectionManager>,
}

impl KeyValueExecutor {
    pub async fn new(redis_url: &str, pool_size: u32) -> std::result::Result<Self, String> {
        let manager = RedisConnectionManager::new(redis_url).map_err(|e| e.to_string())?;
        let pool = bb8::Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .await
            .map_err(|e| e.to_string())?;
        Ok(Self { pool })
    }

    /// Best-effort connectivity probe used at startup (non-fatal on failure).
    pub async fn probe(&self) -> std::result::Result<(), String> {
        let mut conn = self.pool.get().await.map_err(|e| e.to_string())?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut *conn)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    fn append_command(pipeline: &mut redis::Pipeline, op: &KvOp) {
        match op {
            KvOp::Get { key } => {
                pipeline.cmd("GET").arg(key);
            },
            KvOp::Set { key, value } => {
                pipeline.cmd("SET").arg(key).arg(value);
            },
            KvOp::Del { key } => {
                pipeline.cmd("DEL").arg(key);
            },
            KvOp::Exists { key } => {
                pipeline.cmd("EXISTS").arg(key);
            },
        }
    }

    fn decode(op: &KvOp, value: RedisValue) -> Result<KvOutput> {
        match op {
            KvOp::Get { .. } => match value {
                RedisValue::Nil => Ok(KvOutput::Value(String::new())),
                RedisValue::Data(bytes) => Ok(KvOutput::Value(
                    String::from_utf8_lossy(&bytes).into_owned(),
                )),
                other => Err(AgentError::Backend(format!("unexpected GET reply: {other:?}"))),
            },
            KvOp::Set { .. } => match value {
                RedisValue::Okay => Ok(KvOutput::Ack),
                other => Err(AgentError::Backend(format!("unexpected SET reply: {other:?}"))),
            },
            KvOp::Del { .. } => match value {
                RedisValue::Int(n) => Ok(KvOutput::Deleted(n)),
                other => Err(AgentError::Backend(format!("unexpected DEL reply: {other:?}"))),
            },
            KvOp::Exists { .. } => match value {
                RedisValue::Int(n) => Ok(KvOutput::Exists(n)),
                other => Err(AgentError::Backend(format!("unexpected EXISTS reply: {other:?}"))),
            },
        }
    }

    fn op_name(op: &KvOp) -> &'static str {
        match op {
            KvOp::Get { .. } => "Get",
            KvOp::Set { .. } => "Set",
            KvOp::Del { .. } => "Del",
            KvOp::Exists { .. } => "Exists",
        }
    }
}

#[async_trait]
impl Executor<KvOp> for KeyValueExecutor {
    async fn execute(&self, groups: &[GroupSpec<KvOp>]) -> Vec<Result<KvOutput>> {
        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                let err = AgentError::Backend(format!("failed to acquire redis connection: {e}"));
                for group in groups {
                    metrics::record_backend_outcome("kv", Self::op_name(&group.representative), false);
                }
                return groups.iter().map(|_| Err(err.clone())).collect();
            },
        };

        // `redis::pipe()` defaults to non-atomic (no MULTI/EXEC) — exactly
        // the "single pipelined round trip, not a transaction" contract
        // the spec requires, so no extra mode call is needed here.
        let mut pipeline = redis::pipe();
        for group in groups {
            Self::append_command(&mut pipeline, &group.representative);
        }

        let replies: std::result::Result<Vec<RedisValue>, redis::RedisError> =
            pipeline.query_async(&mut *conn).await;

        match replies {
            Ok(values) => groups
                .iter()
                .zip(values)
                .map(|(group, value)| {
                    let decoded = Self::decode(&group.representative, value);
                    metrics::record_backend_outcome("kv", Self::op_name(&group.representative), decoded.is_ok());
                    decoded
                })
                .collect(),
            Err(e) => {
                let err = AgentError::Backend(format!("pipeline execution failed: {e}"));
                for group in groups {
                    metrics::record_backend_outcome("kv", Self::op_name(&group.representative), false);
                }
                groups.iter().map(|_| Err(err.clone())).collect()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouping_key_coalesces_identical_get() {
        let a = KvOp::Get { key: "k".into() }.group_key();
        let b = KvOp::Get { key: "k".into() }.group_key();
        assert_eq!(a, b);
    }

    #[test]
    fn grouping_key_distinguishes_set_by_value() {
        let a = KvOp::Set { key: "k".into(), value: "v1".into() }.group_key();
        let b = KvOp::Set { key: "k".into(), value: "v2".into() }.group_key();
        assert_ne!(a, b);
    }

    #[test]
    fn decode_get_nil_is_empty_value_not_error() {
        let out = KeyValueExecutor::decode(&KvOp::Get { key: "k".into() }, RedisValue::Nil).unwrap();
        match out {
            KvOutput::Value(v) => assert_eq!(v, ""),
            _ => panic!("expected Value"),
        }
    }

    #[test]
    fn decode_set_okay() {
        let out = KeyValueExecutor::decode(
            &KvOp::Set { key: "k".into(), value: "v".into() },
            RedisValue::Okay,
        )
        .unwrap();
        assert!(matches!(out, KvOutput::Ack));
    }
}
