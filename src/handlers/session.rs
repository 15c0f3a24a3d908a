use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error};

use crate::constants::PID_PROPERTY;
use crate::core::connection::Connection;
use crate::core::server::ConnectionHooks;
use crate::error::Result;
use crate::handlers::bound_actor_id;
use crate::handlers::game::MENU;
use crate::protocol::{encode_body, GameCommand, MSG_GAME};
use crate::world::World;

/// Puts an actor in the world for every connection and takes it out again
pub struct SessionHooks {
    world: Arc<World>,
}

impl SessionHooks {
    pub fn new(world: Arc<World>) -> Self {
        Self { world }
    }
}

#[async_trait]
impl ConnectionHooks for SessionHooks {
    async fn on_connect(&self, connection: Arc<Connection>) -> Result<()> {
        let actor = self.world.spawn(&connection).await?;
        // Must be bound before the read loop starts
        connection.set_property(PID_PROPERTY, actor.id);

        let name = actor.modules().await.profile().name.clone();
        let greeting = GameCommand {
            content: format!("welcome {}, {}", name, MENU),
        };
        connection.send(MSG_GAME, encode_body(&greeting)?).await?;

        self.world.enter(&actor).await
    }

    async fn on_disconnect(&self, connection: Arc<Connection>) {
        let Ok(pid) = bound_actor_id(&connection) else {
            debug!("Connection {} had no actor bound", connection.id);
            return;
        };
        if let Err(e) = self.world.leave(pid).await {
            error!("Actor {} did not leave cleanly: {}", pid, e);
        }
    }
}
