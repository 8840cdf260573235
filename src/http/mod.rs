//! HTTP Front (C4): parses incoming HTTP requests into Request Objects,
//! submits them to the Batcher, blocks on delivery, writes the response.

pub mod kv_routes;
pub mod s3_routes;

use std::collections::HashMap;

use crate::error::{AgentError, Result};

/// Pull a required query parameter, yielding a [`AgentError::Validation`]
/// when it is absent — the HTTP Front never submits an incomplete request
/// (spec.md §4.4 step 1).
pub fn require_param(params: &HashMap<String, String>, name: &str) -> Result<String> {
    params
        .get(name)
        .cloned()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AgentError::Validation(format!("missing required parameter {name:?}")))
}
