use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::config::WorldBounds;
use crate::vec3::Vec3;

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Integer block coordinate. This is the key of the voxel store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Truncates each component toward zero. Values beyond `i32` saturate.
    pub fn from_vec3(v: Vec3) -> Self {
        Self {
            x: v.x as i32,
            y: v.y as i32,
            z: v.z as i32,
        }
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

// === Server -> Client ===

/// Outbound event. Serialized as `{"type": ..., "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(tag = "type", content = "data")]
pub enum ServerMsg {
    #[serde(rename = "world_state")]
    WorldState(WorldStateMsg),
    #[serde(rename = "block_update")]
    BlockUpdate(BlockUpdateMsg),
    #[serde(rename = "player_update")]
    PlayerUpdate(PlayerUpdateMsg),
    #[serde(rename = "chat_message")]
    ChatMessage(ChatMsg),
    #[serde(rename = "player_joined")]
    PlayerJoined(PlayerJoinedMsg),
    #[serde(rename = "player_left")]
    PlayerLeft(PlayerLeftMsg),
    #[serde(rename = "pong")]
    Pong(PongMsg),
    #[serde(rename = "stats_update")]
    StatsUpdate(StatsUpdateMsg),
    #[serde(rename = "world_reset")]
    WorldReset(WorldResetMsg),
}

impl ServerMsg {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMsg::WorldState(_) => "world_state",
            ServerMsg::BlockUpdate(_) => "block_update",
            ServerMsg::PlayerUpdate(_) => "player_update",
            ServerMsg::ChatMessage(_) => "chat_message",
            ServerMsg::PlayerJoined(_) => "player_joined",
            ServerMsg::PlayerLeft(_) => "player_left",
            ServerMsg::Pong(_) => "pong",
            ServerMsg::StatsUpdate(_) => "stats_update",
            ServerMsg::WorldReset(_) => "world_reset",
        }
    }
}

/// A `ServerMsg` stamped with the server time it was produced at.
/// Serialized as `{"type": ..., "data": {...}, "timestamp": "<rfc3339>"}`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerEnvelope {
    #[serde(flatten)]
    pub msg: ServerMsg,
    pub timestamp: DateTime<Utc>,
}

impl ServerEnvelope {
    pub fn now(msg: ServerMsg) -> Self {
        Self {
            msg,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct WorldStateMsg {
    pub protocol_version: u32,
    pub self_id: String,
    pub blocks: Vec<BlockWire>,
    pub players: Vec<PlayerWire>,
    pub bounds: WorldBounds,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct BlockWire {
    pub position: BlockPos,
    #[serde(rename = "type")]
    pub block_type: u8,
    #[serde(default)]
    pub placed_by: Option<String>,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct PlayerWire {
    pub id: String,
    pub position: Vec3,
    pub rotation: Vec3,
    pub connected_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct BlockUpdateMsg {
    pub position: BlockPos,
    pub block_type: u8,
    pub player_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct PlayerUpdateMsg {
    pub player_id: String,
    pub position: Vec3,
    pub rotation: Vec3,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct ChatMsg {
    pub player_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct PlayerJoinedMsg {
    pub player_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct PlayerLeftMsg {
    pub player_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct PongMsg {}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct StatsUpdateMsg {
    pub players_online: u32,
    pub total_blocks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct WorldResetMsg {
    pub blocks: Vec<BlockWire>,
}

// === Client -> Server ===

/// Inbound message. Serialized as `{"type": ..., "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
#[serde(tag = "type", content = "data")]
pub enum ClientMsg {
    #[serde(rename = "block_update")]
    BlockUpdate(BlockUpdateData),
    #[serde(rename = "player_update")]
    PlayerUpdate(PlayerUpdateData),
    #[serde(rename = "chat_message")]
    ChatMessage(ChatData),
    #[serde(rename = "ping")]
    Ping(PingData),
}

/// `block_type` stays signed so out-of-range ids reach the store and are
/// rejected there rather than failing to decode.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct BlockUpdateData {
    pub position: Vec3,
    pub block_type: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct PlayerUpdateData {
    pub position: Vec3,
    pub rotation: Vec3,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct ChatData {
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct PingData {}
