//! Node-local request-batching proxy: shared library for the `s3-agent`
//! and `kv-agent` binaries. The two agents share everything except the
//! backend adapter (`backends::object_store` vs `backends::key_value`)
//! and the HTTP route set built on top of it.

pub mod backends;
pub mod config;
pub mod core;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod metrics;

pub use error::{AgentError, Result};
