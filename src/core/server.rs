//! TCP server that owns the listener and the live connection set
//!
//! Wires the pieces together: accepted sockets become [`Connection`]s, their
//! read loops feed the worker pool, and the worker pool dispatches through
//! the [`RouterTable`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::ServerConfig;
use crate::core::codec::MessageCodec;
use crate::core::connection::{Connection, ConnectionId};
use crate::core::router::RouterTable;
use crate::core::worker_pool::{create_worker_pool, SharedWorkerPool};
use crate::error::{RealmError, Result};

/// Application callbacks around a connection's lifetime.
///
/// `on_connect` runs before the connection's read loop starts, so anything it
/// binds on the connection is visible to the first handler. `on_disconnect`
/// runs exactly once, after both loops have stopped.
#[async_trait]
pub trait ConnectionHooks: Send + Sync {
    async fn on_connect(&self, _connection: Arc<Connection>) -> Result<()> {
        Ok(())
    }

    async fn on_disconnect(&self, _connection: Arc<Connection>) {}
}

/// Hooks that do nothing
pub struct NoHooks;

impl ConnectionHooks for NoHooks {}

pub struct Server {
    config: ServerConfig,
    router: Arc<RouterTable>,
    hooks: Arc<dyn ConnectionHooks>,
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    next_id: AtomicU32,
    pool: OnceLock<SharedWorkerPool>,
    local_addr: OnceLock<SocketAddr>,
    started: AtomicBool,
    stopped: AtomicBool,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl Server {
    pub fn new(config: ServerConfig, router: RouterTable, hooks: Arc<dyn ConnectionHooks>) -> Self {
        Self {
            config,
            router: Arc::new(router),
            hooks,
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU32::new(0),
            pool: OnceLock::new(),
            local_addr: OnceLock::new(),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Bind the listener, start the worker pool and begin accepting.
    ///
    /// Returns the bound address (useful when binding port 0).
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(RealmError::System("server already started".to_string()));
        }
        self.config.validate()?;

        let listener = TcpListener::bind(self.config.bind_addr()).await.map_err(|e| {
            RealmError::Transport(format!("failed to bind {}: {}", self.config.bind_addr(), e))
        })?;
        let addr = listener.local_addr()?;
        let _ = self.local_addr.set(addr);

        let pool = create_worker_pool(&self.config, Arc::clone(&self.router))?;
        let _ = self.pool.set(pool);

        info!("Rusty Realm listening on {} ({} routes, max {} connections)",
              addr, self.router.len(), self.config.max_connections);

        let server = Arc::clone(self);
        self.tasks.spawn(async move { server.accept_loop(listener).await });
        Ok(addr)
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => self.handle_accept(stream, peer_addr).await,
                Err(e) => {
                    // Usually fd exhaustion; back off instead of spinning
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
        info!("Listener stopped");
    }

    async fn handle_accept(self: &Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        let Some(pool) = self.pool.get().cloned() else {
            error!("Connection from {} accepted before the worker pool was ready", peer_addr);
            return;
        };

        let connection = {
            let mut connections = self.connections.write().await;
            if connections.len() >= self.config.max_connections {
                warn!("Rejecting connection from {}: {} live connections (max {})",
                      peer_addr, connections.len(), self.config.max_connections);
                return;
            }

            let id = self.allocate_id(&connections);
            let connection = Arc::new(
                Connection::new(id, peer_addr, self.config.outbound_queue, self.config.send_policy)
                    .with_shutdown_token(self.shutdown.child_token()),
            );
            connections.insert(id, Arc::clone(&connection));
            info!("Client connected: {} (connection {}), current connections: {}",
                  peer_addr, id, connections.len());
            connection
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", peer_addr, e);
        }

        let server = Arc::clone(self);
        self.tasks.spawn(async move {
            server.supervise(connection, stream, pool).await;
        });
    }

    fn allocate_id(&self, live: &HashMap<ConnectionId, Arc<Connection>>) -> ConnectionId {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if !live.contains_key(&id) {
                return id;
            }
        }
    }

    /// Drive one connection from hook to hook
    async fn supervise(&self, connection: Arc<Connection>, stream: TcpStream, pool: SharedWorkerPool) {
        match self.hooks.on_connect(Arc::clone(&connection)).await {
            Ok(()) => {
                let codec = MessageCodec::new(self.config.max_packet_size);
                let (reader, writer) =
                    connection.spawn_loops(stream, codec, pool, self.config.drain_timeout);
                let (read_result, write_result) = tokio::join!(reader, writer);
                if let Err(e) = read_result {
                    error!("Read loop for connection {} failed: {}", connection.id, e);
                }
                if let Err(e) = write_result {
                    error!("Write loop for connection {} failed: {}", connection.id, e);
                }
            }
            Err(e) => {
                warn!("Connect hook refused connection {}: {}", connection.id, e);
                drop(stream);
            }
        }

        connection.close();
        self.hooks.on_disconnect(Arc::clone(&connection)).await;

        let remaining = {
            let mut connections = self.connections.write().await;
            connections.remove(&connection.id);
            connections.len()
        };
        info!("Client disconnected: connection {}, current connections: {}",
              connection.id, remaining);
    }

    /// Close the listener and every live connection, then wait for them to finish.
    ///
    /// Safe to call more than once; later calls return immediately.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Stopping server");
        self.shutdown.cancel();

        let live: Vec<Arc<Connection>> = {
            let connections = self.connections.read().await;
            connections.values().cloned().collect()
        };
        for connection in &live {
            connection.close();
        }

        self.tasks.close();
        self.tasks.wait().await;

        if let Some(pool) = self.pool.get() {
            pool.shutdown().await;
        }
        info!("Server stopped");
    }

    /// Resolves once `stop` has been requested
    pub async fn stopped(&self) {
        self.shutdown.cancelled().await
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub async fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections.get(&id).cloned()
    }

    /// Get connection count
    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

// Shared reference to the server
pub type SharedServer = Arc<Server>;
