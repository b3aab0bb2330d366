use serde::Deserialize;
use voxel_shared::config::MAX_CHAT_CHARS;
use voxel_shared::protocol::{
    BlockWire, ChatData, ClientMsg, PingData, PlayerWire, ServerEnvelope, ServerMsg, WorldStateMsg,
    PROTOCOL_VERSION,
};

use crate::error::ServerError;
use crate::hub::{Payload, SessionId};
use crate::player::Player;
use crate::voxels::Block;
use crate::world::WorldSnapshot;

/// Result of decoding one inbound frame
#[derive(Debug, Clone)]
pub enum Decoded {
    Message(ClientMsg),
    /// Well-formed envelope with a `type` this server does not handle
    Unknown(String),
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

fn data<T: serde::de::DeserializeOwned>(kind: &str, value: serde_json::Value) -> Result<T, ServerError> {
    serde_json::from_value(value)
        .map_err(|e| ServerError::MalformedMessage(format!("{}: {}", kind, e)))
}

/// Decode a `{"type": ..., "data": {...}}` frame.
pub fn decode(text: &str) -> Result<Decoded, ServerError> {
    let raw: RawEnvelope =
        serde_json::from_str(text).map_err(|e| ServerError::MalformedMessage(e.to_string()))?;

    let msg = match raw.kind.as_str() {
        "block_update" => ClientMsg::BlockUpdate(data(&raw.kind, raw.data)?),
        "player_update" => ClientMsg::PlayerUpdate(data(&raw.kind, raw.data)?),
        "chat_message" => {
            let chat: ChatData = data(&raw.kind, raw.data)?;
            let len = chat.message.chars().count();
            if len > MAX_CHAT_CHARS {
                return Err(ServerError::MalformedMessage(format!(
                    "chat_message: {} chars exceeds {}",
                    len, MAX_CHAT_CHARS
                )));
            }
            if chat.message.trim().is_empty() {
                return Err(ServerError::MalformedMessage(
                    "chat_message: empty message".to_string(),
                ));
            }
            ClientMsg::ChatMessage(chat)
        }
        "ping" => ClientMsg::Ping(PingData::default()),
        other => return Ok(Decoded::Unknown(other.to_string())),
    };
    Ok(Decoded::Message(msg))
}

/// Stamp and serialize an outbound message.
pub fn encode(msg: ServerMsg) -> Option<Payload> {
    let kind = msg.kind();
    match serde_json::to_string(&ServerEnvelope::now(msg)) {
        Ok(json) => Some(Payload::from(json)),
        Err(e) => {
            tracing::error!("Failed to encode {}: {}", kind, e);
            None
        }
    }
}

// === Conversion helpers ===

pub fn block_wire(block: &Block) -> BlockWire {
    BlockWire {
        position: block.position,
        block_type: block.block_type,
        placed_by: block.placed_by.clone(),
        placed_at: block.placed_at,
    }
}

pub fn player_wire(player: &Player) -> PlayerWire {
    PlayerWire {
        id: player.id.to_string(),
        position: player.position,
        rotation: player.rotation,
        connected_at: player.connected_at,
        last_active: player.last_active,
    }
}

pub fn world_state_msg(self_id: &SessionId, snapshot: &WorldSnapshot) -> WorldStateMsg {
    WorldStateMsg {
        protocol_version: PROTOCOL_VERSION,
        self_id: self_id.to_string(),
        blocks: snapshot.blocks.iter().map(block_wire).collect(),
        players: snapshot.players.iter().map(player_wire).collect(),
        bounds: snapshot.bounds,
        created_at: snapshot.created_at,
        last_modified: snapshot.last_modified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxel_shared::protocol::PlayerLeftMsg;
    use voxel_shared::Vec3;

    fn expect_message(text: &str) -> ClientMsg {
        match decode(text) {
            Ok(Decoded::Message(msg)) => msg,
            other => panic!("Expected message, got {:?}", other),
        }
    }

    fn expect_malformed(text: &str) {
        match decode(text) {
            Err(ServerError::MalformedMessage(_)) => {}
            other => panic!("Expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn decodes_block_update() {
        let msg = expect_message(
            r#"{"type":"block_update","data":{"position":{"x":0,"y":10.7,"z":-0.2},"block_type":1}}"#,
        );
        match msg {
            ClientMsg::BlockUpdate(d) => {
                assert_eq!(d.position, Vec3::new(0.0, 10.7, -0.2));
                assert_eq!(d.block_type, 1);
            }
            other => panic!("Expected BlockUpdate, got {:?}", other),
        }
    }

    #[test]
    fn decodes_player_update() {
        let msg = expect_message(
            r#"{"type":"player_update","data":{"position":{"x":1,"y":2,"z":3},"rotation":{"x":0.1,"y":0.2,"z":0}}}"#,
        );
        assert!(matches!(msg, ClientMsg::PlayerUpdate(_)));
    }

    #[test]
    fn ping_needs_no_data() {
        assert!(matches!(expect_message(r#"{"type":"ping"}"#), ClientMsg::Ping(_)));
        assert!(matches!(
            expect_message(r#"{"type":"ping","data":{}}"#),
            ClientMsg::Ping(_)
        ));
    }

    #[test]
    fn out_of_range_block_type_still_decodes() {
        let msg = expect_message(
            r#"{"type":"block_update","data":{"position":{"x":0,"y":0,"z":0},"block_type":42}}"#,
        );
        assert!(matches!(msg, ClientMsg::BlockUpdate(d) if d.block_type == 42));
    }

    #[test]
    fn malformed_frames_are_reported() {
        expect_malformed("not json");
        expect_malformed(r#"{"data":{}}"#);
        expect_malformed(r#"{"type":"block_update"}"#);
        expect_malformed(r#"{"type":"block_update","data":{"position":{"x":0,"y":0},"block_type":1}}"#);
        expect_malformed(r#"{"type":"player_update","data":{"position":"here"}}"#);
        expect_malformed(r#"{"type":"chat_message","data":{}}"#);
    }

    #[test]
    fn unknown_kind_is_not_an_error() {
        match decode(r#"{"type":"teleport","data":{"x":1}}"#) {
            Ok(Decoded::Unknown(kind)) => assert_eq!(kind, "teleport"),
            other => panic!("Expected Unknown, got {:?}", other),
        }
    }

    #[test]
    fn chat_length_is_counted_in_chars() {
        let ok = format!(
            r#"{{"type":"chat_message","data":{{"message":"{}"}}}}"#,
            "é".repeat(MAX_CHAT_CHARS)
        );
        assert!(matches!(expect_message(&ok), ClientMsg::ChatMessage(_)));

        let too_long = format!(
            r#"{{"type":"chat_message","data":{{"message":"{}"}}}}"#,
            "a".repeat(MAX_CHAT_CHARS + 1)
        );
        expect_malformed(&too_long);
        expect_malformed(r#"{"type":"chat_message","data":{"message":"   "}}"#);
    }

    #[test]
    fn encode_stamps_envelope() {
        let payload = encode(ServerMsg::PlayerLeft(PlayerLeftMsg {
            player_id: "p9".to_string(),
        }))
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "player_left");
        assert_eq!(value["data"]["player_id"], "p9");
        assert!(value["timestamp"].is_string());
    }
}
