//! The batching core shared by both agent binaries: the Request Object
//! (C2) and the Batcher (C3). Only the per-operation "execute" step
//! (the [`batcher::Executor`] implementations in `backends/`) differs
//! between the object-store and key-value agents.

pub mod batcher;
pub mod request;

pub use batcher::{Batcher, BatcherConfig, Executor, GroupSpec};
pub use request::{Operation, Request, ResponseHandle};
