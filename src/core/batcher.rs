//! The Batcher (C3) — the heart of the system.
//!
//! Queues requests, forms batches bounded by size and time, groups
//! equivalent requests within a batch, asks an [`Executor`] to run each
//! group, and fans results back out. See spec.md §4.3 for the full
//! worker algorithm this implements.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::core::request::{Operation, Request};
use crate::error::AgentError;
use crate::metrics;

/// One distinct grouping key within a batch, paired with a representative
/// operation value used to build the single backend call.
pub struct GroupSpec<Op: Operation> {
    pub representative: Op,
    pub member_count: usize,
}

/// Given the groups formed from one batch, perform exactly one backend
/// call per group (or, for backends that support it, one pipelined round
/// trip covering every group) and return one result per group, in the
/// same order the groups were given.
#[async_trait]
pub trait Executor<Op: Operation>: Send + Sync + 'static {
    async fn execute(
        &self,
        groups: &[GroupSpec<Op>],
    ) -> Vec<std::result::Result<Op::Output, AgentError>>;
}

/// Batcher configuration (spec.md §4.3).
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    pub enabled: bool,
    pub batch_window: Duration,
    pub max_batch_size: usize,
}

struct Group<Op: Operation> {
    key: Op::GroupKey,
    members: Vec<Request<Op>>,
}

/// Long-lived batcher state: configuration, submission channel, worker
/// task handle, shutdown flag, and a handle to the backend executor.
pub struct Batcher<Op: Operation, E: Executor<Op>> {
    config: BatcherConfig,
    tx: Mutex<Option<mpsc::Sender<Request<Op>>>>,
    shutting_down: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    executor: Arc<E>,
}

impl<Op: Operation, E: Executor<Op>> Batcher<Op, E> {
    pub fn new(config: BatcherConfig, executor: Arc<E>) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.max_batch_size.max(1) * 10);

        let batcher = Arc::new(Self {
            config: config.clone(),
            tx: Mutex::new(Some(tx)),
            shutting_down: AtomicBool::new(false),
            worker: Mutex::new(None),
            executor,
        });

        let worker_batcher = batcher.clone();
        let handle = tokio::spawn(async move {
            worker_batcher.run_worker(rx).await;
        });
        *batcher.worker.lock() = Some(handle);

        batcher
    }

    /// Non-blocking when enabled and the submission channel is not full.
    /// When disabled, executes synchronously on the caller. When shutting
    /// down, fails the request immediately with [`AgentError::ShuttingDown`].
    pub async fn submit(&self, request: Request<Op>) {
        if !self.config.enabled {
            self.execute_direct(request).await;
            return;
        }

        if self.shutting_down.load(Ordering::Acquire) {
            request.fail(AgentError::ShuttingDown);
            return;
        }

        let maybe_tx = self.tx.lock().clone();
        match maybe_tx {
            Some(tx) => {
                if let Err(send_error) = tx.send(request).await {
                    send_error.0.fail(AgentError::ShuttingDown);
                }
            },
            None => request.fail(AgentError::ShuttingDown),
        }
    }

    /// Executes a single request directly against the backend, bypassing
    /// the queue and window entirely (batching disabled path).
    async fn execute_direct(&self, request: Request<Op>) {
        let Request { op, .. } = &request;
        match op.group_key() {
            Some(_) => {
                let spec = [GroupSpec { representative: op.clone(), member_count: 1 }];
                let mut results = self.executor.execute(&spec).await;
                let result = results.pop().unwrap_or_else(|| {
                    Err(AgentError::Backend("executor returned no result".into()))
                });
                request.complete(result);
            },
            None => request.fail(AgentError::UnsupportedOperation(format!(
                "{:?} not recognized",
                std::any::type_name::<Op>()
            ))),
        }
    }

    /// Closes the submission channel, waits for the worker to drain
    /// in-flight batches, then returns. After this returns, no further
    /// submissions are accepted.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.tx.lock().take();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn run_worker(&self, mut rx: mpsc::Receiver<Request<Op>>) {
        loop {
            // Step 1: block for the first request of a new batch.
            let first = match rx.recv().await {
                Some(request) => request,
                None => {
                    debug!("batcher worker exiting: submission channel closed");
                    return;
                },
            };

            // Step 2: start the batch and its window timer.
            let mut batch = Vec::with_capacity(self.config.max_batch_size);
            batch.push(first);
            let deadline = Instant::now() + self.config.batch_window;

            // Step 3: collect until full or the timer fires; closure during
            // collection ends collection but keeps what was already admitted.
            loop {
                if batch.len() >= self.config.max_batch_size {
                    break;
                }

                tokio::select! {
                    biased;
                    maybe_request = rx.recv() => {
                        match maybe_request {
                            Some(request) => batch.push(request),
                            None => break,
                        }
                    }
                    _ = tokio::time::sleep_until(deadline) => break,
                }
            }

            // Steps 5-6: group, execute, distribute.
            self.process_batch(batch).await;
        }
    }

    async fn process_batch(&self, batch: Vec<Request<Op>>) {
        let batch_size = batch.len();
        let mut groups: Vec<Group<Op>> = Vec::new();
        let mut index_of: HashMap<Op::GroupKey, usize> = HashMap::new();

        for request in batch {
            match request.op.group_key() {
                Some(key) => {
                    if let Some(&idx) = index_of.get(&key) {
                        groups[idx].members.push(request);
                    } else {
                        index_of.insert(key.clone(), groups.len());
                        groups.push(Group { key, members: vec![request] });
                    }
                },
                None => request.fail(AgentError::UnsupportedOperation(
                    "operation type not recognized by this agent".into(),
                )),
            }
        }

        if groups.is_empty() {
            return;
        }

        let specs: Vec<GroupSpec<Op>> = groups
            .iter()
            .map(|g| GroupSpec {
                representative: g.members[0].op.clone(),
                member_count: g.members.len(),
            })
            .collect();

        metrics::record_batch(batch_size, groups.len());

        let results = self.executor.execute(&specs).await;
        debug_assert_eq!(results.len(), groups.len());

        for (group, result) in groups.into_iter().zip(results.into_iter()) {
            for member in group.members {
                member.complete(result.clone());
            }
        }

        info!(
            batch_size,
            backend_calls = specs.len(),
            "batch processed"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct TestKey(u32);

    #[derive(Debug, Clone)]
    struct TestOp {
        key: Option<u32>,
    }

    impl Operation for TestOp {
        type GroupKey = TestKey;
        type Output = u32;

        fn group_key(&self) -> Option<TestKey> {
            self.key.map(TestKey)
        }
    }

    struct CountingExecutor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Executor<TestOp> for CountingExecutor {
        async fn execute(
            &self,
            groups: &[GroupSpec<TestOp>],
        ) -> Vec<std::result::Result<u32, AgentError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            groups.iter().map(|g| Ok(g.representative.key.unwrap_or(0))).collect()
        }
    }

    fn test_config(max_batch_size: usize) -> BatcherConfig {
        BatcherConfig {
            enabled: true,
            batch_window: Duration::from_millis(50),
            max_batch_size,
        }
    }

    #[tokio::test]
    async fn batch_closes_immediately_at_max_batch_size() {
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0) });
        let batcher = Batcher::new(test_config(3), executor.clone());

        let started = Instant::now();
        let mut handles = Vec::new();
        for i in 0..3 {
            let batcher = batcher.clone();
            handles.push(tokio::spawn(async move {
                let (request, handle) = Request::new(TestOp { key: Some(i) });
                batcher.submit(request).await;
                handle.wait().await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        batcher.shutdown().await;
    }

    #[tokio::test]
    async fn unsupported_operation_fails_without_backend_call() {
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0) });
        let batcher = Batcher::new(test_config(10), executor.clone());

        let (request, handle) = Request::new(TestOp { key: None });
        batcher.submit(request).await;
        let result = handle.wait().await;

        assert!(matches!(result, Err(AgentError::UnsupportedOperation(_))));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
        batcher.shutdown().await;
    }

    #[tokio::test]
    async fn disabled_batching_executes_every_submit_directly() {
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0) });
        let mut config = test_config(10);
        config.enabled = false;
        let batcher = Batcher::new(config, executor.clone());

        for i in 0..3 {
            let (request, handle) = Request::new(TestOp { key: Some(i) });
            batcher.submit(request).await;
            assert_eq!(handle.wait().await.unwrap(), i);
        }

        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
        batcher.shutdown().await;
    }

    #[tokio::test]
    async fn submit_after_shutdown_fails_without_backend_call() {
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0) });
        let batcher = Batcher::new(test_config(10), executor.clone());
        batcher.shutdown().await;

        let (request, handle) = Request::new(TestOp { key: Some(1) });
        batcher.submit(request).await;

        assert!(matches!(handle.wait().await, Err(AgentError::ShuttingDown)));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn coalesces_equivalent_requests_into_one_backend_call() {
        let executor = Arc::new(CountingExecutor { calls: AtomicUsize::new(0) });
        let batcher = Batcher::new(test_config(10), executor.clone());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let batcher = batcher.clone();
            handles.push(tokio::spawn(async move {
                let (request, handle) = Request::new(TestOp { key: Some(7) });
                batcher.submit(request).await;
                handle.wait().await.unwrap()
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), 7);
        }

        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        batcher.shutdown().await;
    }
}
