//! Client connection management
//! Handles the lifecycle of one TCP client: read loop, write loop, property store

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{debug, info, trace, warn};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::core::codec::{Message, MessageCodec};
use crate::core::outbound::{OutboundQueue, SendPolicy};
use crate::core::router::Request;
use crate::core::worker_pool::SharedWorkerPool;
use crate::error::{RealmError, Result};

pub type ConnectionId = u32;

type Property = Arc<dyn Any + Send + Sync>;

/// Represents the state of a single client connection.
///
/// The socket halves are owned by the read and write loops; the connection
/// holds what both loops and the handlers share: the outbound queue, the
/// property store and the shutdown signal.
pub struct Connection {
    pub id: ConnectionId,
    pub peer_addr: SocketAddr,
    pub connected_at: Instant,
    outbound: OutboundQueue,
    properties: RwLock<HashMap<String, Property>>,
    closing: AtomicBool,
    shutdown: CancellationToken,
}

impl Connection {
    /// Create a connection with its own shutdown signal
    pub fn new(
        id: ConnectionId,
        peer_addr: SocketAddr,
        outbound_capacity: usize,
        policy: SendPolicy,
    ) -> Self {
        Self {
            id,
            peer_addr,
            connected_at: Instant::now(),
            outbound: OutboundQueue::new(outbound_capacity, policy),
            properties: RwLock::new(HashMap::new()),
            closing: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Tie this connection's shutdown to an outer signal (usually the server's)
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Queue a message for this client
    pub async fn send(&self, tag: u32, payload: impl Into<Bytes>) -> Result<()> {
        self.send_message(Message::new(tag, payload)).await
    }

    /// Queue an already built message for this client
    pub async fn send_message(&self, message: Message) -> Result<()> {
        if self.is_closing() {
            return Err(RealmError::ConnectionClosed);
        }
        let tag = message.tag;
        match self.outbound.push(message).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Failed to queue message {} for connection {}: {}", tag, self.id, e);
                Err(e)
            }
        }
    }

    /// Attach a value to this connection under `key`
    pub fn set_property<T: Any + Send + Sync>(&self, key: &str, value: T) {
        let mut properties = self
            .properties
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        properties.insert(key.to_string(), Arc::new(value));
    }

    /// Read a property back. `None` if absent or stored with another type.
    pub fn get_property<T: Any + Clone>(&self, key: &str) -> Option<T> {
        let properties = self
            .properties
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        properties
            .get(key)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    pub fn remove_property(&self, key: &str) -> bool {
        let mut properties = self
            .properties
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        properties.remove(key).is_some()
    }

    /// Begin shutting the connection down.
    ///
    /// Returns `true` only for the call that actually initiated the close.
    pub fn close(&self) -> bool {
        if self.closing.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.outbound.close();
        self.shutdown.cancel();
        debug!("Connection {} closing", self.id);
        true
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Resolves once the connection has been told to shut down
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }

    pub fn outbound(&self) -> &OutboundQueue {
        &self.outbound
    }

    /// Calculate the connection duration
    pub fn connection_duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Split the socket and spawn the read and write loops
    pub(crate) fn spawn_loops(
        self: &Arc<Self>,
        stream: TcpStream,
        codec: MessageCodec,
        pool: SharedWorkerPool,
        drain_timeout: Duration,
    ) -> (JoinHandle<()>, JoinHandle<()>) {
        let (read_half, write_half) = stream.into_split();
        let reader = FramedRead::new(read_half, codec);
        let writer = FramedWrite::new(write_half, codec);

        let read_task = tokio::spawn(Arc::clone(self).read_loop(reader, pool));
        let write_task = tokio::spawn(Arc::clone(self).write_loop(writer, drain_timeout));
        (read_task, write_task)
    }

    async fn read_loop(
        self: Arc<Self>,
        mut reader: FramedRead<OwnedReadHalf, MessageCodec>,
        pool: SharedWorkerPool,
    ) {
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                frame = reader.next() => frame,
            };

            match frame {
                Some(Ok(message)) => {
                    trace!("Connection {} received tag {} ({} bytes)",
                           self.id, message.tag, message.payload_len());
                    let request = Request::new(Arc::clone(&self), message);
                    if let Err(e) = pool.submit(request).await {
                        warn!("Connection {} could not enqueue request: {}", self.id, e);
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("Dropping connection {} from {}: {}", self.id, self.peer_addr, e);
                    break;
                }
                None => {
                    debug!("Connection {} closed by peer", self.id);
                    break;
                }
            }
        }

        self.close();
    }

    async fn write_loop(
        self: Arc<Self>,
        mut writer: FramedWrite<OwnedWriteHalf, MessageCodec>,
        drain_timeout: Duration,
    ) {
        let result = {
            let write_all = async {
                while let Some(message) = self.outbound.pop().await {
                    writer.send(message).await?;
                }
                Ok::<(), RealmError>(())
            };
            tokio::pin!(write_all);

            tokio::select! {
                result = &mut write_all => result,
                _ = self.shutdown.cancelled() => {
                    // The queue refuses new pushes from here; flush what is left
                    self.close();
                    match tokio::time::timeout(drain_timeout, &mut write_all).await {
                        Ok(result) => result,
                        Err(_) => {
                            warn!("Connection {} discarded {} queued messages on close",
                                  self.id, self.outbound.len());
                            Ok(())
                        }
                    }
                }
            }
        };

        if let Err(e) = result {
            warn!("Write failed on connection {}: {}", self.id, e);
        }
        self.close();

        if let Err(e) = writer.close().await {
            trace!("Connection {} write shutdown: {}", self.id, e);
        }
        info!("Connection {} from {} closed after {:?}",
              self.id, self.peer_addr, self.connection_duration());
    }
}

/// Shared handle to a connection
pub type SharedConnection = Arc<Connection>;
