//! Session registry and fan-out.
//!
//! Each connected session owns a bounded outbound queue. The hub only ever
//! `try_send`s into those queues, so a slow client never stalls everyone
//! else, and no send happens while the registry lock is held.
//!
//! Frames are world deltas, so a session that misses one is out of sync for
//! good. Any failed send (queue full or receiver gone) reaps the session;
//! its socket task then sees the queue close and disconnects, and the client
//! starts over from a fresh `world_state`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Encoded frame, shared between all recipients of a fan-out
pub type Payload = Arc<str>;

/// Sending half of a session's outbound queue
pub type Outbound = mpsc::Sender<Payload>;

/// Opaque per-connection identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Fresh random id, 32 hex digits.
    pub fn random() -> Self {
        let bits: u128 = rand::random();
        Self(format!("{:032x}", bits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Sessions a send was attempted on
    pub attempted: usize,
    /// Sessions removed because their queue was full or closed
    pub reaped: usize,
}

/// Returns whether the frame was queued.
fn try_deliver(id: &SessionId, tx: &Outbound, payload: Payload) -> bool {
    match tx.try_send(payload) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::warn!("Session {} is lagging, disconnecting it", id);
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

#[derive(Debug, Default)]
pub struct SessionHub {
    sessions: Mutex<HashMap<SessionId, Outbound>>,
}

impl SessionHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, Outbound>> {
        // The map stays consistent even if a holder panicked
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the outbound queue for `id`. Ids are expected to be unique;
    /// a duplicate replaces the earlier queue.
    pub fn register(&self, id: SessionId, tx: Outbound) {
        if self.sessions().insert(id.clone(), tx).is_some() {
            tracing::warn!("Session {} registered twice, previous queue replaced", id);
        }
    }

    /// Returns whether the session was registered.
    pub fn unregister(&self, id: &SessionId) -> bool {
        self.sessions().remove(id).is_some()
    }

    /// Queue `payload` for one session. Returns whether it was queued.
    /// A failed send unregisters the session.
    pub fn send_to(&self, id: &SessionId, payload: Payload) -> bool {
        let Some(tx) = self.sessions().get(id).cloned() else {
            return false;
        };
        if try_deliver(id, &tx, payload) {
            return true;
        }
        self.reap(id, &tx);
        false
    }

    pub fn broadcast(&self, payload: Payload) -> FanOut {
        self.fan_out(payload, None)
    }

    pub fn broadcast_except(&self, payload: Payload, excluded: &SessionId) -> FanOut {
        self.fan_out(payload, Some(excluded))
    }

    fn fan_out(&self, payload: Payload, excluded: Option<&SessionId>) -> FanOut {
        let targets: Vec<(SessionId, Outbound)> = self
            .sessions()
            .iter()
            .filter(|(id, _)| excluded != Some(*id))
            .map(|(id, tx)| (id.clone(), tx.clone()))
            .collect();

        let mut result = FanOut::default();
        for (id, tx) in &targets {
            result.attempted += 1;
            if !try_deliver(id, tx, payload.clone()) && self.reap(id, tx) {
                result.reaped += 1;
            }
        }
        result
    }

    /// Remove `id` if it is still bound to the queue that failed.
    fn reap(&self, id: &SessionId, failed: &Outbound) -> bool {
        let mut sessions = self.sessions();
        match sessions.get(id) {
            Some(current) if current.same_channel(failed) => {
                sessions.remove(id);
                tracing::debug!("Reaped session {}", id);
                true
            }
            _ => false,
        }
    }

    pub fn count(&self) -> usize {
        self.sessions().len()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions().keys().cloned().collect()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions().contains_key(id)
    }
}
