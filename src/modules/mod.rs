//! Gameplay modules attached to every actor
//!
//! The world treats modules as opaque units with a load/save/init lifecycle.
//! The set is closed: [`ModuleSet`] holds one of each and offers a typed
//! accessor per module.

pub mod bag;
pub mod profile;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;

use crate::error::{RealmError, Result};
use crate::world::actor::ActorId;

pub use bag::BagModule;
pub use profile::ProfileModule;

/// Where an actor's module state lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub actor_id: ActorId,
    pub dir: PathBuf,
}

impl ActorContext {
    /// Context for `actor_id` under the save root `<root>/<actor_id>`
    pub fn new(actor_id: ActorId, save_root: impl AsRef<Path>) -> Self {
        Self {
            actor_id,
            dir: save_root.as_ref().join(actor_id.to_string()),
        }
    }

    pub fn module_file(&self, module: &str) -> PathBuf {
        self.dir.join(format!("{}.json", module))
    }
}

/// Lifecycle every gameplay module implements
#[async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &'static str;

    /// Reset to the state of a brand new actor
    fn init(&mut self, ctx: &ActorContext);

    /// Hydrate from storage, falling back to `init` when nothing was saved
    async fn load(&mut self, ctx: &ActorContext) -> Result<()>;

    async fn save(&self, ctx: &ActorContext) -> Result<()>;
}

/// Read a module's saved JSON. `Ok(None)` when the file does not exist.
pub(crate) async fn read_state<T: DeserializeOwned>(ctx: &ActorContext, module: &str) -> Result<Option<T>> {
    let path = ctx.module_file(module);
    match fs::read(&path).await {
        Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RealmError::Storage(format!("failed to read {}: {}", path.display(), e))),
    }
}

pub(crate) async fn write_state<T: Serialize>(ctx: &ActorContext, module: &str, state: &T) -> Result<()> {
    fs::create_dir_all(&ctx.dir).await.map_err(|e| {
        RealmError::Storage(format!("failed to create {}: {}", ctx.dir.display(), e))
    })?;
    let path = ctx.module_file(module);
    let raw = serde_json::to_vec_pretty(state)?;
    fs::write(&path, raw)
        .await
        .map_err(|e| RealmError::Storage(format!("failed to write {}: {}", path.display(), e)))?;
    debug!("Saved module {} for actor {}", module, ctx.actor_id);
    Ok(())
}

/// Every module an actor carries
#[derive(Debug, Clone, Default)]
pub struct ModuleSet {
    profile: ProfileModule,
    bag: BagModule,
}

impl ModuleSet {
    /// Load every module for an actor
    pub async fn load(ctx: &ActorContext) -> Result<Self> {
        let mut set = Self::default();
        for module in set.modules_mut() {
            module.load(ctx).await?;
        }
        Ok(set)
    }

    /// Fresh modules for a new actor, without touching storage
    pub fn init(ctx: &ActorContext) -> Self {
        let mut set = Self::default();
        for module in set.modules_mut() {
            module.init(ctx);
        }
        set
    }

    pub async fn save(&self, ctx: &ActorContext) -> Result<()> {
        for module in self.modules() {
            module.save(ctx).await?;
        }
        Ok(())
    }

    pub fn modules(&self) -> [&dyn Module; 2] {
        [&self.profile, &self.bag]
    }

    fn modules_mut(&mut self) -> [&mut dyn Module; 2] {
        [&mut self.profile, &mut self.bag]
    }

    pub fn profile(&self) -> &ProfileModule {
        &self.profile
    }

    pub fn profile_mut(&mut self) -> &mut ProfileModule {
        &mut self.profile
    }

    pub fn bag(&self) -> &BagModule {
        &self.bag
    }

    pub fn bag_mut(&mut self) -> &mut BagModule {
        &mut self.bag
    }
}
