//! Actors placed in the world and the ids that name them

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard, Weak};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::core::connection::{Connection, ConnectionId};
use crate::error::{RealmError, Result};
use crate::modules::{ActorContext, ModuleSet};

pub type ActorId = i32;

/// Position in the world plane plus height and heading
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Heading in degrees
    pub v: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32, v: f32) -> Self {
        Self { x, y, z, v }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.v.is_finite()
    }
}

/// A player in the world.
///
/// The registry owns actors; the actor only refers back to its connection,
/// so a dropped connection never keeps an actor alive or vice versa.
pub struct Actor {
    pub id: ActorId,
    connection: Weak<Connection>,
    connection_id: ConnectionId,
    position: RwLock<Position>,
    context: ActorContext,
    modules: Mutex<ModuleSet>,
}

impl Actor {
    pub fn new(
        id: ActorId,
        connection: &Arc<Connection>,
        position: Position,
        context: ActorContext,
        modules: ModuleSet,
    ) -> Self {
        Self {
            id,
            connection: Arc::downgrade(connection),
            connection_id: connection.id,
            position: RwLock::new(position),
            context,
            modules: Mutex::new(modules),
        }
    }

    pub fn position(&self) -> Position {
        *self.position.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access to the position. Callers keep AOI membership in step
    /// while holding it.
    pub(crate) fn position_mut(&self) -> RwLockWriteGuard<'_, Position> {
        self.position.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.upgrade()
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn context(&self) -> &ActorContext {
        &self.context
    }

    pub async fn modules(&self) -> MutexGuard<'_, ModuleSet> {
        self.modules.lock().await
    }

    /// Queue a message on the actor's connection
    pub async fn send(&self, tag: u32, payload: impl Into<Bytes>) -> Result<()> {
        match self.connection() {
            Some(connection) => connection.send(tag, payload).await,
            None => Err(RealmError::ConnectionClosed),
        }
    }

    /// Persist every module
    pub async fn save(&self) -> Result<()> {
        let modules = self.modules.lock().await;
        modules.save(&self.context).await
    }
}

/// Process-wide source of actor ids, starting at 1
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicI32,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: ActorId) -> Self {
        Self {
            next: AtomicI32::new(first),
        }
    }

    pub fn next_id(&self) -> ActorId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outbound::SendPolicy;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique_across_threads() {
        let ids = Arc::new(IdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..250).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(id >= 1);
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[tokio::test]
    async fn test_send_after_connection_dropped() {
        let conn = Arc::new(Connection::new(3, "127.0.0.1:1".parse().unwrap(), 4, SendPolicy::Reject));
        let dir = tempfile::tempdir().unwrap();
        let context = ActorContext::new(1, dir.path());
        let actor = Actor::new(1, &conn, Position::default(), context, ModuleSet::default());

        actor.send(1, &b"hi"[..]).await.unwrap();
        assert_eq!(conn.outbound().len(), 1);

        drop(conn);
        assert!(actor.connection().is_none());
        assert!(matches!(
            actor.send(1, &b"hi"[..]).await,
            Err(RealmError::ConnectionClosed)
        ));
    }
}
