//! Application message tags and payload bodies
//!
//! The transport only sees a tag and opaque bytes; this module gives those
//! bytes a JSON shape for the handlers bundled with the server.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::world::actor::{ActorId, Position};

/// S→C: the client's actor id
pub const MSG_SYNC_PID: u32 = 1;
/// C→S: world chat
pub const MSG_TALK: u32 = 2;
/// C→S: move request
pub const MSG_MOVE: u32 = 3;
/// C↔S: scripted game command and its reply
pub const MSG_GAME: u32 = 4;
/// S→C: chat, appear and move broadcasts
pub const MSG_BROADCAST: u32 = 200;
/// S→C: an actor left the client's view
pub const MSG_VANISH: u32 = 201;
/// S→C: actors currently around the client
pub const MSG_SYNC_PLAYERS: u32 = 202;

/// Broadcast kinds carried in `Broadcast::tp`
pub const TP_CHAT: u32 = 1;
pub const TP_APPEAR: u32 = 2;
pub const TP_MOVE: u32 = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPid {
    pub pid: ActorId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Talk {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameCommand {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastData {
    Content(String),
    Position(Position),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    pub pid: ActorId,
    pub tp: u32,
    pub data: BroadcastData,
}

impl Broadcast {
    pub fn chat(pid: ActorId, content: impl Into<String>) -> Self {
        Self {
            pid,
            tp: TP_CHAT,
            data: BroadcastData::Content(content.into()),
        }
    }

    pub fn appear(pid: ActorId, position: Position) -> Self {
        Self {
            pid,
            tp: TP_APPEAR,
            data: BroadcastData::Position(position),
        }
    }

    pub fn moved(pid: ActorId, position: Position) -> Self {
        Self {
            pid,
            tp: TP_MOVE,
            data: BroadcastData::Position(position),
        }
    }

    pub fn position(&self) -> Option<Position> {
        match self.data {
            BroadcastData::Position(position) => Some(position),
            BroadcastData::Content(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub pid: ActorId,
    pub p: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPlayers {
    pub ps: Vec<PlayerState>,
}

/// Serialize a payload body
pub fn encode_body<T: Serialize>(body: &T) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(body)?))
}

/// Parse a payload body received from a client
pub fn decode_body<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(data)?)
}
