//! Routers and lifecycle hooks that connect the transport to the world

pub mod chat;
pub mod game;
pub mod movement;
pub mod session;

use std::sync::Arc;

use crate::constants::PID_PROPERTY;
use crate::core::connection::Connection;
use crate::core::router::RouterTable;
use crate::error::{RealmError, Result};
use crate::protocol::{MSG_GAME, MSG_MOVE, MSG_TALK};
use crate::world::{Actor, ActorId, World};

pub use chat::TalkRouter;
pub use game::GameRouter;
pub use movement::MoveRouter;
pub use session::SessionHooks;

/// Register every bundled router on `table`
pub fn register_routes(table: &mut RouterTable, world: Arc<World>) -> Result<()> {
    table.register(MSG_TALK, TalkRouter::new(Arc::clone(&world)))?;
    table.register(MSG_MOVE, MoveRouter::new(Arc::clone(&world)))?;
    table.register(MSG_GAME, GameRouter::new(world))?;
    Ok(())
}

/// Actor id bound to a connection by the connect hook
pub fn bound_actor_id(connection: &Connection) -> Result<ActorId> {
    connection.get_property::<ActorId>(PID_PROPERTY).ok_or_else(|| {
        RealmError::NotFound(format!("no actor bound to connection {}", connection.id))
    })
}

/// Actor behind a connection; missing binding or a departed actor is `NotFound`
pub fn bound_actor(world: &World, connection: &Connection) -> Result<Arc<Actor>> {
    world.actor(bound_actor_id(connection)?)
}
