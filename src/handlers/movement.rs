use std::sync::Arc;

use async_trait::async_trait;

use crate::core::router::{Request, Router};
use crate::error::{RealmError, Result};
use crate::handlers::bound_actor_id;
use crate::protocol::decode_body;
use crate::world::{Position, World};

/// Position updates (tag 3)
pub struct MoveRouter {
    world: Arc<World>,
}

impl MoveRouter {
    pub fn new(world: Arc<World>) -> Self {
        Self { world }
    }
}

#[async_trait]
impl Router for MoveRouter {
    async fn handle(&self, request: &Request) -> Result<()> {
        let pid = bound_actor_id(request.connection())?;
        let position: Position = decode_body(request.data())?;
        if !position.is_finite() {
            return Err(RealmError::Handler(format!(
                "non-finite position from connection {}",
                request.connection().id
            )));
        }
        self.world.move_actor(pid, position).await
    }
}
