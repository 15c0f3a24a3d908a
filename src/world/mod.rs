//! The shared world: actors, who can see whom, and how that changes
//!
//! [`World`] is created once at startup and handed to the session hooks and
//! the routers. It owns the two pieces of global state (the registry and the
//! AOI grid) and is the only thing that mutates them.

pub mod actor;
pub mod aoi;
pub mod registry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info};
use rand::Rng;

use crate::config::{AoiConfig, ServerConfig};
use crate::constants::{SPAWN_BASE_X, SPAWN_BASE_Z, SPAWN_SPREAD_X, SPAWN_SPREAD_Z};
use crate::core::connection::Connection;
use crate::error::{RealmError, Result};
use crate::modules::{ActorContext, ModuleSet};
use crate::protocol::{
    encode_body, Broadcast, PlayerState, SyncPid, SyncPlayers, MSG_BROADCAST, MSG_SYNC_PID,
    MSG_SYNC_PLAYERS, MSG_VANISH,
};

pub use actor::{Actor, ActorId, IdGenerator, Position};
pub use aoi::{AoiGrid, CellId, CellTransition};
pub use registry::WorldRegistry;

pub struct World {
    registry: WorldRegistry,
    grid: AoiGrid,
    ids: IdGenerator,
    save_path: PathBuf,
}

impl World {
    pub fn new(aoi: AoiConfig, save_path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            registry: WorldRegistry::new(),
            grid: AoiGrid::new(aoi)?,
            ids: IdGenerator::new(),
            save_path: save_path.into(),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Self::new(config.aoi.clone(), config.save_path.clone())
    }

    pub fn registry(&self) -> &WorldRegistry {
        &self.registry
    }

    pub fn grid(&self) -> &AoiGrid {
        &self.grid
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    /// Look up a registered actor; a miss is `NotFound`
    pub fn actor(&self, id: ActorId) -> Result<Arc<Actor>> {
        self.registry.lookup(id)
    }

    /// Create an actor for a connection at a random point of the spawn area.
    /// The actor is not visible to anyone until [`World::enter`].
    pub async fn spawn(&self, connection: &Arc<Connection>) -> Result<Arc<Actor>> {
        let position = {
            let mut rng = rand::thread_rng();
            Position::new(
                SPAWN_BASE_X + rng.gen_range(0.0..SPAWN_SPREAD_X),
                0.0,
                SPAWN_BASE_Z + rng.gen_range(0.0..SPAWN_SPREAD_Z),
                0.0,
            )
        };
        self.spawn_at(connection, position).await
    }

    /// Create an actor at a given position, loading its saved modules
    pub async fn spawn_at(&self, connection: &Arc<Connection>, position: Position) -> Result<Arc<Actor>> {
        let id = self.ids.next_id();
        let context = ActorContext::new(id, &self.save_path);
        tokio::fs::create_dir_all(&context.dir).await.map_err(|e| {
            RealmError::Storage(format!("failed to create {}: {}", context.dir.display(), e))
        })?;
        let modules = ModuleSet::load(&context).await?;
        info!("Spawned actor {} for connection {} at ({:.1}, {:.1})",
              id, connection.id, position.x, position.z);
        Ok(Arc::new(Actor::new(id, connection, position, context, modules)))
    }

    /// Make an actor visible: tell it who it is and where, register it, then
    /// exchange appearances with everyone around it.
    pub async fn enter(&self, actor: &Arc<Actor>) -> Result<()> {
        actor.send(MSG_SYNC_PID, encode_body(&SyncPid { pid: actor.id })?).await?;
        actor.send(MSG_BROADCAST, encode_body(&Broadcast::appear(actor.id, actor.position()))?).await?;

        self.registry.add(Arc::clone(actor));
        let position = {
            let position = actor.position_mut();
            self.grid.add(actor.id, self.grid.cell_of(position.x, position.z));
            *position
        };

        let appear = encode_body(&Broadcast::appear(actor.id, position))?;
        let mut players = Vec::new();
        for peer in self.peers_near(actor.id, position) {
            notify(&peer, MSG_BROADCAST, appear.clone()).await;
            players.push(PlayerState {
                pid: peer.id,
                p: peer.position(),
            });
        }
        actor.send(MSG_SYNC_PLAYERS, encode_body(&SyncPlayers { ps: players })?).await?;
        Ok(())
    }

    /// Move an actor and update everyone whose view changed.
    ///
    /// Per affected peer the order is vanish, then appear, then the move update.
    pub async fn move_actor(&self, id: ActorId, to: Position) -> Result<()> {
        let actor = self.actor(id)?;
        let transition = self.reposition(&actor, to)?;

        if let Some(transition) = transition {
            debug!("Actor {} moved from cell {} to cell {}", id, transition.from, transition.to);

            let vanish = encode_body(&SyncPid { pid: id })?;
            for peer in self.peers_in(id, &transition.leaving) {
                notify(&peer, MSG_VANISH, vanish.clone()).await;
                notify(&actor, MSG_VANISH, encode_body(&SyncPid { pid: peer.id })?).await;
            }

            let appear = encode_body(&Broadcast::appear(id, to))?;
            for peer in self.peers_in(id, &transition.entering) {
                notify(&peer, MSG_BROADCAST, appear.clone()).await;
                let seen = Broadcast::appear(peer.id, peer.position());
                notify(&actor, MSG_BROADCAST, encode_body(&seen)?).await;
            }
        }

        let update = encode_body(&Broadcast::moved(id, to))?;
        for peer in self.peers_near(id, to) {
            notify(&peer, MSG_BROADCAST, update.clone()).await;
        }
        Ok(())
    }

    /// World chat to every registered actor, the speaker included
    pub async fn talk(&self, id: ActorId, content: &str) -> Result<()> {
        let actor = self.actor(id)?;
        let message = encode_body(&Broadcast::chat(actor.id, content))?;
        for peer in self.registry.all() {
            notify(&peer, MSG_BROADCAST, message.clone()).await;
        }
        Ok(())
    }

    /// Take an actor out of the world and save it. Unknown ids are ignored.
    pub async fn leave(&self, id: ActorId) -> Result<()> {
        let Some(actor) = self.registry.get(id) else {
            debug!("Actor {} already left", id);
            return Ok(());
        };

        // Registry and grid removal happen under the position lock, so a move
        // that already looked the actor up cannot put it back into a cell
        let position = {
            let position = actor.position_mut();
            if self.registry.remove(id).is_none() {
                debug!("Actor {} already left", id);
                return Ok(());
            }
            self.grid.remove(id, self.grid.cell_of(position.x, position.z));
            *position
        };

        let vanish = encode_body(&SyncPid { pid: id })?;
        for peer in self.peers_near(id, position) {
            notify(&peer, MSG_VANISH, vanish.clone()).await;
        }

        info!("Actor {} left the world, {} actors remain", id, self.registry.count());
        if let Err(e) = actor.save().await {
            error!("Failed to save modules for actor {}: {}", id, e);
            return Err(e);
        }
        Ok(())
    }

    /// Persist every module of an actor on demand
    pub async fn save_all(&self, id: ActorId) -> Result<()> {
        let actor = self.actor(id)?;
        actor.save().await
    }

    /// Store the new position and move the grid membership with it.
    /// Fails with `NotFound` once the actor has left.
    fn reposition(&self, actor: &Actor, to: Position) -> Result<Option<CellTransition>> {
        let mut position = actor.position_mut();
        if self.registry.get(actor.id).is_none() {
            return Err(RealmError::NotFound(format!("actor {}", actor.id)));
        }
        let from = self.grid.cell_of(position.x, position.z);
        let target = self.grid.cell_of(to.x, to.z);
        *position = to;
        Ok(self.grid.relocate(actor.id, from, target))
    }

    fn peers_in(&self, id: ActorId, cells: &[CellId]) -> Vec<Arc<Actor>> {
        self.grid
            .occupants_in(cells)
            .into_iter()
            .filter(|&other| other != id)
            .filter_map(|other| self.registry.get(other))
            .collect()
    }

    fn peers_near(&self, id: ActorId, position: Position) -> Vec<Arc<Actor>> {
        let cells = self.grid.neighbors_of(self.grid.cell_of(position.x, position.z));
        self.peers_in(id, &cells)
    }
}

/// Send to a peer, logging instead of failing when it is gone
async fn notify(peer: &Actor, tag: u32, payload: bytes::Bytes) {
    if let Err(e) = peer.send(tag, payload).await {
        debug!("Could not deliver tag {} to actor {}: {}", tag, peer.id, e);
    }
}

/// Shared handle to the world
pub type SharedWorld = Arc<World>;
