//! Tag-based message routing
//!
//! Each application tag maps to one [`Router`] whose three hooks run in
//! order for every request carrying that tag. Routes are registered while
//! building the table at startup; the table is read-only once shared.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use log::{debug, error};

use crate::core::codec::Message;
use crate::core::connection::Connection;
use crate::error::{RealmError, Result};

/// One inbound message together with the connection it arrived on
pub struct Request {
    connection: Arc<Connection>,
    message: Message,
}

impl Request {
    pub fn new(connection: Arc<Connection>, message: Message) -> Self {
        Self {
            connection,
            message,
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn tag(&self) -> u32 {
        self.message.tag
    }

    pub fn data(&self) -> &[u8] {
        &self.message.payload
    }
}

/// Handler registered for a tag.
///
/// Errors returned from any hook are logged at the dispatch boundary and go
/// no further. A failing hook skips the hooks after it for that request.
#[async_trait]
pub trait Router: Send + Sync {
    async fn pre_handle(&self, _request: &Request) -> Result<()> {
        Ok(())
    }

    async fn handle(&self, request: &Request) -> Result<()>;

    async fn post_handle(&self, _request: &Request) -> Result<()> {
        Ok(())
    }
}

/// Registry mapping message tags to routers
#[derive(Default)]
pub struct RouterTable {
    routes: HashMap<u32, Arc<dyn Router>>,
}

impl RouterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the router for a tag. A tag can only be registered once.
    pub fn register<R: Router + 'static>(&mut self, tag: u32, router: R) -> Result<()> {
        if self.routes.contains_key(&tag) {
            return Err(RealmError::DuplicateRoute(tag));
        }
        self.routes.insert(tag, Arc::new(router));
        debug!("Registered router for tag {}", tag);
        Ok(())
    }

    pub fn get(&self, tag: u32) -> Option<&Arc<dyn Router>> {
        self.routes.get(&tag)
    }

    pub fn contains(&self, tag: u32) -> bool {
        self.routes.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Run pre/handle/post for the request's tag.
    ///
    /// Never fails: unknown tags are ignored, hook errors and panics are logged.
    pub async fn dispatch(&self, request: Request) {
        let tag = request.tag();
        let conn_id = request.connection().id;

        let Some(router) = self.routes.get(&tag) else {
            debug!("No router for tag {} from connection {}, ignoring", tag, conn_id);
            return;
        };

        let outcome = AssertUnwindSafe(run_hooks(router.as_ref(), &request))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Handler for tag {} failed on connection {}: {}", tag, conn_id, e);
            }
            Err(panic) => {
                error!("Handler for tag {} panicked on connection {}: {}",
                       tag, conn_id, panic_message(&*panic));
            }
        }
    }
}

async fn run_hooks(router: &dyn Router, request: &Request) -> Result<()> {
    router.pre_handle(request).await?;
    router.handle(request).await?;
    router.post_handle(request).await
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outbound::SendPolicy;
    use std::sync::Mutex;

    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
        fail_pre: bool,
    }

    #[async_trait]
    impl Router for Recorder {
        async fn pre_handle(&self, request: &Request) -> Result<()> {
            self.log.lock().unwrap().push(format!("pre:{}", request.tag()));
            if self.fail_pre {
                return Err(RealmError::Handler("rejected".into()));
            }
            Ok(())
        }

        async fn handle(&self, request: &Request) -> Result<()> {
            self.log.lock().unwrap().push(format!("handle:{}", request.tag()));
            Ok(())
        }

        async fn post_handle(&self, request: &Request) -> Result<()> {
            self.log.lock().unwrap().push(format!("post:{}", request.tag()));
            Ok(())
        }
    }

    struct Panicker;

    #[async_trait]
    impl Router for Panicker {
        async fn handle(&self, _request: &Request) -> Result<()> {
            panic!("handler blew up");
        }
    }

    fn request(tag: u32) -> Request {
        let conn = Connection::new(1, "127.0.0.1:1".parse().unwrap(), 4, SendPolicy::Reject);
        Request::new(Arc::new(conn), Message::new(tag, &b"x"[..]))
    }

    #[tokio::test]
    async fn test_hooks_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = RouterTable::new();
        table
            .register(2, Recorder { log: Arc::clone(&log), fail_pre: false })
            .unwrap();

        table.dispatch(request(2)).await;
        assert_eq!(*log.lock().unwrap(), vec!["pre:2", "handle:2", "post:2"]);
    }

    #[tokio::test]
    async fn test_failed_pre_hook_skips_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut table = RouterTable::new();
        table
            .register(3, Recorder { log: Arc::clone(&log), fail_pre: true })
            .unwrap();

        table.dispatch(request(3)).await;
        assert_eq!(*log.lock().unwrap(), vec!["pre:3"]);
    }

    #[tokio::test]
    async fn test_unknown_tag_is_ignored() {
        let table = RouterTable::new();
        table.dispatch(request(99)).await;
        assert!(table.get(99).is_none());
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let mut table = RouterTable::new();
        table.register(5, Panicker).unwrap();
        table.dispatch(request(5)).await;
        // still usable afterwards
        table.dispatch(request(5)).await;
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut table = RouterTable::new();
        table.register(5, Panicker).unwrap();
        assert!(matches!(
            table.register(5, Panicker),
            Err(RealmError::DuplicateRoute(5))
        ));
        assert_eq!(table.len(), 1);
    }
}
