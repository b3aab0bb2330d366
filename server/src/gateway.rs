//! Per-connection protocol handling.
//!
//! A connection moves `Connecting -> Active -> Closed`. The transport owns
//! the socket and calls `open`, then `handle_frame` for every inbound text
//! frame, then `close` once the socket is gone or `handle_frame` asks for it.
//! Everything the client should see goes through the session hub.
//!
//! World mutations and the fan-out of their results happen under one
//! sequencing lock, so every session queues events in the order the world
//! applied them. Hub sends are `try_send`, so holding it never waits on a
//! client.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use voxel_shared::protocol::{
    BlockUpdateMsg, ChatMsg, ClientMsg, PlayerJoinedMsg, PlayerLeftMsg, PlayerUpdateMsg, PongMsg,
    ServerMsg, StatsUpdateMsg, WorldResetMsg,
};
use voxel_shared::BlockPos;

use crate::hub::{FanOut, Outbound, SessionHub, SessionId};
use crate::protocol::{block_wire, decode, encode, world_state_msg, Decoded};
use crate::world::WorldEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Active,
    Closed,
}

/// What the transport should do after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

#[derive(Debug)]
pub struct Connection {
    id: SessionId,
    state: ConnectionState,
}

impl Connection {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

pub struct Gateway {
    world: Arc<WorldEngine>,
    hub: Arc<SessionHub>,
    max_frame_bytes: usize,
    sequence: Mutex<()>,
}

impl Gateway {
    pub fn new(world: Arc<WorldEngine>, hub: Arc<SessionHub>, max_frame_bytes: usize) -> Self {
        Self {
            world,
            hub,
            max_frame_bytes,
            sequence: Mutex::new(()),
        }
    }

    fn sequenced(&self) -> MutexGuard<'_, ()> {
        self.sequence.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn world(&self) -> &Arc<WorldEngine> {
        &self.world
    }

    pub fn hub(&self) -> &Arc<SessionHub> {
        &self.hub
    }

    /// Register the session, send it the world and announce it to the rest.
    pub fn open(&self, id: SessionId, tx: Outbound) -> Connection {
        let mut conn = Connection {
            id,
            state: ConnectionState::Connecting,
        };

        // an edit can't land between the snapshot and the world_state frame
        let order = self.sequenced();
        self.hub.register(conn.id.clone(), tx);
        let snapshot = self.world.snapshot();
        self.send(
            &conn.id,
            ServerMsg::WorldState(world_state_msg(&conn.id, &snapshot)),
        );
        self.broadcast_except(
            ServerMsg::PlayerJoined(PlayerJoinedMsg {
                player_id: conn.id.to_string(),
            }),
            &conn.id,
        );
        self.broadcast_stats();
        drop(order);

        conn.state = ConnectionState::Active;
        tracing::info!(
            "Player {} connected. Total connections: {}",
            conn.id,
            self.hub.count()
        );
        conn
    }

    /// Handle one inbound text frame. Bad frames are dropped and the
    /// connection stays up; only oversized frames end it.
    pub fn handle_frame(&self, conn: &mut Connection, text: &str) -> Flow {
        if conn.state != ConnectionState::Active {
            return Flow::Close;
        }
        if text.len() > self.max_frame_bytes {
            tracing::warn!(
                "Player {} sent {} byte frame (limit {}), closing",
                conn.id,
                text.len(),
                self.max_frame_bytes
            );
            return Flow::Close;
        }

        match decode(text) {
            Ok(Decoded::Message(msg)) => self.dispatch(&conn.id, msg),
            Ok(Decoded::Unknown(kind)) => {
                tracing::debug!("Unknown message type {:?} from {}", kind, conn.id);
            }
            Err(e) => {
                tracing::warn!("Dropping message from {}: {}", conn.id, e);
            }
        }
        Flow::Continue
    }

    fn dispatch(&self, id: &SessionId, msg: ClientMsg) {
        match msg {
            ClientMsg::BlockUpdate(data) => {
                let pos = BlockPos::from_vec3(data.position);
                let _order = self.sequenced();
                match self.world.place_block(pos, data.block_type, id) {
                    Ok(_) => {
                        // the actor gets its own edit back as the authoritative copy
                        self.broadcast(ServerMsg::BlockUpdate(BlockUpdateMsg {
                            position: pos,
                            block_type: data.block_type as u8,
                            player_id: id.to_string(),
                        }));
                    }
                    Err(e) => tracing::debug!("Rejected block update from {}: {}", id, e),
                }
            }
            ClientMsg::PlayerUpdate(data) => {
                let _order = self.sequenced();
                self.world.move_player(id, data.position, data.rotation);
                self.broadcast_except(
                    ServerMsg::PlayerUpdate(PlayerUpdateMsg {
                        player_id: id.to_string(),
                        position: data.position,
                        rotation: data.rotation,
                    }),
                    id,
                );
            }
            ClientMsg::ChatMessage(data) => {
                tracing::debug!("Chat from {}: {}", id, data.message);
                self.broadcast(ServerMsg::ChatMessage(ChatMsg {
                    player_id: id.to_string(),
                    message: data.message,
                }));
            }
            ClientMsg::Ping(_) => {
                self.send(id, ServerMsg::Pong(PongMsg::default()));
            }
        }
    }

    /// Tear the session down and tell everyone else. Safe to call twice.
    pub fn close(&self, conn: &mut Connection) {
        if conn.state == ConnectionState::Closed {
            return;
        }
        conn.state = ConnectionState::Closed;

        let order = self.sequenced();
        self.hub.unregister(&conn.id);
        self.world.drop_player(&conn.id);
        self.broadcast(ServerMsg::PlayerLeft(PlayerLeftMsg {
            player_id: conn.id.to_string(),
        }));
        self.broadcast_stats();
        drop(order);

        tracing::info!(
            "Player {} disconnected. Total connections: {}",
            conn.id,
            self.hub.count()
        );
    }

    /// Clear and reseed the world, then push the new terrain to everyone.
    /// Returns the block count after the reset.
    pub fn reset_world(&self) -> usize {
        let _order = self.sequenced();
        let blocks = self.world.reset();
        let count = blocks.len();
        self.broadcast(ServerMsg::WorldReset(WorldResetMsg {
            blocks: blocks.iter().map(block_wire).collect(),
        }));
        self.broadcast_stats();
        count
    }

    pub fn broadcast_stats(&self) -> FanOut {
        self.broadcast(ServerMsg::StatsUpdate(StatsUpdateMsg {
            players_online: self.hub.count() as u32,
            total_blocks: self.world.block_count() as u32,
        }))
    }

    fn send(&self, id: &SessionId, msg: ServerMsg) -> bool {
        encode(msg).is_some_and(|payload| self.hub.send_to(id, payload))
    }

    fn broadcast(&self, msg: ServerMsg) -> FanOut {
        encode(msg)
            .map(|payload| self.hub.broadcast(payload))
            .unwrap_or_default()
    }

    fn broadcast_except(&self, msg: ServerMsg, excluded: &SessionId) -> FanOut {
        encode(msg)
            .map(|payload| self.hub.broadcast_except(payload, excluded))
            .unwrap_or_default()
    }
}
