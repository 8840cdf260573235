//! Backend Executor (C1) — per-backend adapters. The two families share
//! the same [`crate::core::Executor`] contract; only what happens inside
//! `execute` differs.

pub mod key_value;
pub mod object_store;
