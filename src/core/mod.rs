//! Core functionality for the session server

pub mod codec;
pub mod connection;
pub mod outbound;
pub mod router;
pub mod server;
pub mod worker_pool;

// Re-export main components for convenience
pub use codec::{Message, MessageCodec};
pub use connection::{Connection, ConnectionId, SharedConnection};
pub use outbound::{OutboundQueue, SendPolicy};
pub use router::{Request, Router, RouterTable};
pub use server::{ConnectionHooks, NoHooks, Server, SharedServer};
pub use worker_pool::{create_worker_pool, SharedWorkerPool, WorkerPool};
