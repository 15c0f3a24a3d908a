//! Social profile shown to other players

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::modules::{read_state, write_state, ActorContext, Module};

const MODULE_NAME: &str = "profile";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileModule {
    pub name: String,
    pub sign: String,
    pub icon: u32,
    pub card: u32,
    pub birthday: Option<NaiveDate>,
    pub last_login: DateTime<Utc>,
}

impl ProfileModule {
    /// Text reply for the profile command
    pub fn describe(&self) -> String {
        let birthday = self
            .birthday
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unset".to_string());
        format!(
            "name: {}, sign: {}, icon: {}, card: {}, birthday: {}, last login: {}",
            self.name,
            self.sign,
            self.icon,
            self.card,
            birthday,
            self.last_login.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

#[async_trait]
impl Module for ProfileModule {
    fn name(&self) -> &'static str {
        MODULE_NAME
    }

    fn init(&mut self, ctx: &ActorContext) {
        *self = Self {
            name: format!("Player{}", ctx.actor_id),
            last_login: Utc::now(),
            ..Self::default()
        };
    }

    async fn load(&mut self, ctx: &ActorContext) -> Result<()> {
        match read_state::<Self>(ctx, MODULE_NAME).await? {
            Some(saved) => {
                *self = saved;
                self.last_login = Utc::now();
            }
            None => self.init(ctx),
        }
        Ok(())
    }

    async fn save(&self, ctx: &ActorContext) -> Result<()> {
        write_state(ctx, MODULE_NAME, self).await
    }
}
