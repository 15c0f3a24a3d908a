//! Worker pool management for request dispatch
//!
//! This module provides a fixed set of dispatch workers. Each worker owns a
//! FIFO task queue and every request from a given connection lands on the
//! same queue, so one connection's messages are handled in arrival order.
//! A slow handler only holds up the connections that share its worker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, error, info};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::core::connection::ConnectionId;
use crate::core::router::{Request, RouterTable};
use crate::error::{RealmError, Result};

/// Fixed-size pool of dispatch workers
pub struct WorkerPool {
    /// One sender per worker queue
    queues: Vec<mpsc::Sender<Request>>,
    /// Worker task handles, taken on shutdown
    workers: Mutex<Vec<JoinHandle<()>>>,
    /// Maximum number of tasks each worker queue can hold
    max_queued_tasks: usize,
    /// Requests accepted but not yet dispatched
    pending: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Create a new worker pool and start its workers on the current runtime
    ///
    /// # Arguments
    /// * `worker_count` - Number of workers (and queues) to create
    /// * `max_queued_tasks` - Capacity of each worker's queue
    /// * `router` - Table every worker dispatches through
    ///
    /// # Returns
    /// A `Result` containing the `WorkerPool` or an error when called outside a runtime
    pub fn new(worker_count: usize, max_queued_tasks: usize, router: Arc<RouterTable>) -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| {
            RealmError::System(format!("Worker pool needs a running tokio runtime: {}", e))
        })?;

        let worker_count = worker_count.max(1);
        let max_queued_tasks = max_queued_tasks.max(1);
        let shutdown = CancellationToken::new();
        let pending = Arc::new(AtomicUsize::new(0));

        let mut queues = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let (tx, rx) = mpsc::channel(max_queued_tasks);
            queues.push(tx);
            workers.push(handle.spawn(run_worker(
                index,
                rx,
                Arc::clone(&router),
                Arc::clone(&pending),
                shutdown.clone(),
            )));
        }

        info!("Started worker pool with {} workers and {} max queued tasks per worker",
              worker_count, max_queued_tasks);

        Ok(Self {
            queues,
            workers: Mutex::new(workers),
            max_queued_tasks,
            pending,
            shutdown,
        })
    }

    /// Create a worker pool from server configuration
    pub fn from_config(config: &ServerConfig, router: Arc<RouterTable>) -> Result<Self> {
        Self::new(config.worker_pool_size, config.max_worker_tasks, router)
    }

    /// Queue index serving a connection
    pub fn worker_index(&self, connection_id: ConnectionId) -> usize {
        connection_id as usize % self.queues.len()
    }

    /// Enqueue a request on its connection's worker, waiting while that queue is full
    pub async fn submit(&self, request: Request) -> Result<()> {
        let index = self.worker_index(request.connection().id);
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.queues[index].send(request).await.is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(RealmError::System(format!("worker {} is shut down", index)));
        }
        Ok(())
    }

    /// Number of requests queued or in flight across all workers
    pub fn pending_tasks(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Get the number of workers in the pool
    pub fn worker_count(&self) -> usize {
        self.queues.len()
    }

    pub fn max_queued_tasks(&self) -> usize {
        self.max_queued_tasks
    }

    /// Stop the workers after they finish what is already queued
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let workers: Vec<JoinHandle<()>> = {
            let mut guard = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            guard.drain(..).collect()
        };
        if workers.is_empty() {
            return;
        }
        info!("Shutting down worker pool with {} workers", workers.len());
        for worker in workers {
            if let Err(e) = worker.await {
                error!("Worker task ended abnormally: {}", e);
            }
        }
    }
}

async fn run_worker(
    index: usize,
    mut rx: mpsc::Receiver<Request>,
    router: Arc<RouterTable>,
    pending: Arc<AtomicUsize>,
    shutdown: CancellationToken,
) {
    debug!("Worker {} started", index);
    loop {
        let request = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            request = rx.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };
        router.dispatch(request).await;
        pending.fetch_sub(1, Ordering::AcqRel);
    }

    // Finish whatever was accepted before the shutdown signal
    rx.close();
    while let Some(request) = rx.recv().await {
        router.dispatch(request).await;
        pending.fetch_sub(1, Ordering::AcqRel);
    }
    debug!("Worker {} stopped", index);
}

/// Worker pool shared between the server and its connections
pub type SharedWorkerPool = Arc<WorkerPool>;

/// Create a new shared worker pool
///
/// # Arguments
/// * `config` - Server configuration containing worker pool parameters
/// * `router` - Routing table the workers dispatch through
///
/// # Returns
/// A `Result` containing the shared worker pool or an error
pub fn create_worker_pool(config: &ServerConfig, router: Arc<RouterTable>) -> Result<SharedWorkerPool> {
    let pool = WorkerPool::from_config(config, router)?;
    Ok(Arc::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::Message;
    use crate::core::connection::Connection;
    use crate::core::outbound::SendPolicy;
    use crate::core::router::Router;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    struct OrderRecorder {
        seen: Arc<Mutex<Vec<(ConnectionId, u32)>>>,
    }

    #[async_trait]
    impl Router for OrderRecorder {
        async fn handle(&self, request: &Request) -> crate::error::Result<()> {
            let seq = u32::from_le_bytes(request.data().try_into().unwrap());
            self.seen.lock().unwrap().push((request.connection().id, seq));
            Ok(())
        }
    }

    struct Gate {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl Router for Gate {
        async fn handle(&self, _request: &Request) -> crate::error::Result<()> {
            self.release.notified().await;
            Ok(())
        }
    }

    struct Signal {
        done: Arc<Notify>,
    }

    #[async_trait]
    impl Router for Signal {
        async fn handle(&self, _request: &Request) -> crate::error::Result<()> {
            self.done.notify_one();
            Ok(())
        }
    }

    fn connection(id: ConnectionId) -> Arc<Connection> {
        Arc::new(Connection::new(id, "127.0.0.1:1".parse().unwrap(), 4, SendPolicy::Reject))
    }

    #[tokio::test]
    async fn test_pool_creation() {
        let pool = WorkerPool::new(3, 8, Arc::new(RouterTable::new())).unwrap();
        assert_eq!(pool.worker_count(), 3);
        pool.shutdown().await;
    }

    #[test]
    fn test_requires_runtime() {
        assert!(WorkerPool::new(2, 8, Arc::new(RouterTable::new())).is_err());
    }

    #[tokio::test]
    async fn test_worker_index_is_modulo() {
        let pool = WorkerPool::new(4, 8, Arc::new(RouterTable::new())).unwrap();
        assert_eq!(pool.worker_index(0), 0);
        assert_eq!(pool.worker_index(5), 1);
        assert_eq!(pool.worker_index(7), 3);
        assert_eq!(pool.worker_index(8), 0);
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_per_connection_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut table = RouterTable::new();
        table.register(1, OrderRecorder { seen: Arc::clone(&seen) }).unwrap();
        let pool = WorkerPool::new(3, 16, Arc::new(table)).unwrap();

        let conns: Vec<_> = (10..14).map(connection).collect();
        for seq in 0..200u32 {
            for conn in &conns {
                let message = Message::new(1, seq.to_le_bytes().to_vec());
                pool.submit(Request::new(Arc::clone(conn), message)).await.unwrap();
            }
        }
        pool.shutdown().await;
        assert_eq!(pool.pending_tasks(), 0);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 800);
        for conn in &conns {
            let order: Vec<u32> = seen
                .iter()
                .filter(|(id, _)| *id == conn.id)
                .map(|(_, seq)| *seq)
                .collect();
            assert_eq!(order, (0..200).collect::<Vec<_>>());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slow_worker_does_not_block_others() {
        let release = Arc::new(Notify::new());
        let done = Arc::new(Notify::new());
        let mut table = RouterTable::new();
        table.register(1, Gate { release: Arc::clone(&release) }).unwrap();
        table.register(2, Signal { done: Arc::clone(&done) }).unwrap();
        let pool = WorkerPool::new(2, 8, Arc::new(table)).unwrap();

        // connection 0 -> worker 0 (blocked), connection 1 -> worker 1
        pool.submit(Request::new(connection(0), Message::new(1, Vec::new()))).await.unwrap();
        pool.submit(Request::new(connection(1), Message::new(2, Vec::new()))).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), done.notified())
            .await
            .expect("worker 1 should not wait on worker 0");

        release.notify_one();
        pool.shutdown().await;
    }
}
