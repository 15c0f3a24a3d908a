//! Registry of actors currently in the world

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{RealmError, Result};
use crate::world::actor::{Actor, ActorId};

/// Map from actor id to actor.
///
/// `all()` hands out a snapshot so broadcasts iterate without holding the
/// lock; actors joining or leaving meanwhile may be missed.
#[derive(Default)]
pub struct WorldRegistry {
    actors: RwLock<HashMap<ActorId, Arc<Actor>>>,
}

impl WorldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actor, replacing any previous entry with the same id
    pub fn add(&self, actor: Arc<Actor>) {
        let mut actors = self.actors.write().unwrap_or_else(PoisonError::into_inner);
        actors.insert(actor.id, actor);
    }

    pub fn remove(&self, id: ActorId) -> Option<Arc<Actor>> {
        let mut actors = self.actors.write().unwrap_or_else(PoisonError::into_inner);
        actors.remove(&id)
    }

    pub fn get(&self, id: ActorId) -> Option<Arc<Actor>> {
        let actors = self.actors.read().unwrap_or_else(PoisonError::into_inner);
        actors.get(&id).cloned()
    }

    /// Like `get`, but a miss is a `NotFound` error
    pub fn lookup(&self, id: ActorId) -> Result<Arc<Actor>> {
        self.get(id)
            .ok_or_else(|| RealmError::NotFound(format!("actor {}", id)))
    }

    pub fn all(&self) -> Vec<Arc<Actor>> {
        let actors = self.actors.read().unwrap_or_else(PoisonError::into_inner);
        actors.values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        let actors = self.actors.read().unwrap_or_else(PoisonError::into_inner);
        actors.len()
    }
}
