//! Scripted game commands (tag 4)
//!
//! A command is a number optionally followed by arguments, e.g. `1`,
//! `1 sign hello there` or `2 add 1001 5`. Each command gets a
//! `GameCommand` reply on the caller's connection; bad arguments get a usage
//! reply rather than an error.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::info;

use crate::core::router::{Request, Router};
use crate::error::{RealmError, Result};
use crate::handlers::bound_actor;
use crate::protocol::{decode_body, encode_body, GameCommand, MSG_GAME};
use crate::world::{Actor, World};

pub const CMD_PROFILE: &str = "1";
pub const CMD_BAG: &str = "2";
pub const CMD_SAVE: &str = "8";

/// Sent to every client right after it connects
pub const MENU: &str =
    "choose: 1 profile (1 name|sign|icon|card|birthday <value>), 2 bag (2 add|remove <item> <count>), 8 save";

const PROFILE_USAGE: &str = "usage: 1 [name <text> | sign <text> | icon <n> | card <n> | birthday <YYYY-MM-DD>]";
const BAG_USAGE: &str = "usage: 2 [add <item> <count> | remove <item> <count>]";

#[derive(Debug, Clone, PartialEq)]
pub enum GameAction {
    Profile,
    SetName(String),
    SetSign(String),
    SetIcon(u32),
    SetCard(u32),
    SetBirthday(NaiveDate),
    Bag,
    AddItem { item: u32, amount: u64 },
    RemoveItem { item: u32, amount: u64 },
    Save,
    Unknown(String),
}

impl GameAction {
    /// Parse a command line. Known commands with bad arguments are errors
    /// carrying the usage text.
    pub fn parse(content: &str) -> Result<Self> {
        let content = content.trim();
        let (command, args) = split_word(content);
        let (sub, arg) = split_word(args);

        let action = match (command, sub) {
            (CMD_PROFILE, "") => Self::Profile,
            (CMD_PROFILE, "name") if !arg.is_empty() => Self::SetName(arg.to_string()),
            (CMD_PROFILE, "sign") => Self::SetSign(arg.to_string()),
            (CMD_PROFILE, "icon") => Self::SetIcon(number(arg, PROFILE_USAGE)?),
            (CMD_PROFILE, "card") => Self::SetCard(number(arg, PROFILE_USAGE)?),
            (CMD_PROFILE, "birthday") => Self::SetBirthday(
                NaiveDate::parse_from_str(arg, "%Y-%m-%d")
                    .map_err(|_| RealmError::Handler(PROFILE_USAGE.to_string()))?,
            ),
            (CMD_PROFILE, _) => return Err(RealmError::Handler(PROFILE_USAGE.to_string())),
            (CMD_BAG, "") => Self::Bag,
            (CMD_BAG, "add") | (CMD_BAG, "remove") => {
                let (item, amount) = split_word(arg);
                let item = number(item, BAG_USAGE)?;
                let amount = number(amount, BAG_USAGE)?;
                if sub == "add" {
                    Self::AddItem { item, amount }
                } else {
                    Self::RemoveItem { item, amount }
                }
            }
            (CMD_BAG, _) => return Err(RealmError::Handler(BAG_USAGE.to_string())),
            (CMD_SAVE, "") => Self::Save,
            _ => Self::Unknown(content.to_string()),
        };
        Ok(action)
    }
}

fn split_word(input: &str) -> (&str, &str) {
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

fn number<T: std::str::FromStr>(raw: &str, usage: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| RealmError::Handler(usage.to_string()))
}

pub struct GameRouter {
    world: Arc<World>,
}

impl GameRouter {
    pub fn new(world: Arc<World>) -> Self {
        Self { world }
    }

    async fn apply(&self, actor: &Actor, action: GameAction) -> Result<String> {
        let reply = match action {
            GameAction::Profile => actor.modules().await.profile().describe(),
            GameAction::SetName(name) => {
                actor.modules().await.profile_mut().name = name.clone();
                format!("name set to {}", name)
            }
            GameAction::SetSign(sign) => {
                actor.modules().await.profile_mut().sign = sign.clone();
                format!("sign set to {}", sign)
            }
            GameAction::SetIcon(icon) => {
                actor.modules().await.profile_mut().icon = icon;
                format!("icon set to {}", icon)
            }
            GameAction::SetCard(card) => {
                actor.modules().await.profile_mut().card = card;
                format!("card set to {}", card)
            }
            GameAction::SetBirthday(date) => {
                actor.modules().await.profile_mut().birthday = Some(date);
                format!("birthday set to {}", date.format("%Y-%m-%d"))
            }
            GameAction::Bag => actor.modules().await.bag().describe(),
            GameAction::AddItem { item, amount } => {
                let total = actor.modules().await.bag_mut().add_item(item, amount);
                format!("item {} x{}", item, total)
            }
            GameAction::RemoveItem { item, amount } => {
                let left = actor.modules().await.bag_mut().remove_item(item, amount)?;
                format!("item {} x{} left", item, left)
            }
            GameAction::Save => {
                self.world.save_all(actor.id).await?;
                info!("Saved all modules for actor {}", actor.id);
                "all modules saved".to_string()
            }
            GameAction::Unknown(other) => format!("unknown command: {}", other),
        };
        Ok(reply)
    }
}

#[async_trait]
impl Router for GameRouter {
    async fn handle(&self, request: &Request) -> Result<()> {
        let actor = bound_actor(&self.world, request.connection())?;
        let command: GameCommand = decode_body(request.data())?;

        let outcome = match GameAction::parse(&command.content) {
            Ok(action) => self.apply(&actor, action).await,
            Err(e) => Err(e),
        };
        let reply = match outcome {
            Ok(reply) => reply,
            // Rejected commands are answered, the connection carries on
            Err(RealmError::Handler(msg)) => msg,
            Err(RealmError::NotFound(what)) => format!("{} not found", what),
            Err(e) => return Err(e),
        };

        let body = encode_body(&GameCommand { content: reply })?;
        request.connection().send(MSG_GAME, body).await
    }
}
