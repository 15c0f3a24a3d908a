//! Rusty Realm - A multi-client world session server implemented in Rust
//!
//! This library provides the transport core (framing, connections, routing
//! and a worker pool) and a shared world with grid-based area-of-interest
//! replication on top of it.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod modules;
pub mod protocol;
pub mod world;

// Re-export main components
pub use config::*;
pub use constants::*;
pub use error::{RealmError, Result};
pub use world::{SharedWorld, World};
