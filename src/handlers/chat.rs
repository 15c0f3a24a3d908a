use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::core::router::{Request, Router};
use crate::error::Result;
use crate::handlers::bound_actor_id;
use crate::protocol::{decode_body, Talk};
use crate::world::World;

/// World chat (tag 2)
pub struct TalkRouter {
    world: Arc<World>,
}

impl TalkRouter {
    pub fn new(world: Arc<World>) -> Self {
        Self { world }
    }
}

#[async_trait]
impl Router for TalkRouter {
    async fn handle(&self, request: &Request) -> Result<()> {
        let pid = bound_actor_id(request.connection())?;
        let talk: Talk = decode_body(request.data())?;
        debug!("Actor {} says: {}", pid, talk.content);
        self.world.talk(pid, &talk.content).await
    }
}
