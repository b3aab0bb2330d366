use chrono::{DateTime, Utc};
use std::collections::HashMap;
use voxel_shared::Vec3;

use crate::hub::SessionId;

/// Pose of a connected player
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: SessionId,
    pub position: Vec3,
    /// pitch / yaw / roll
    pub rotation: Vec3,
    pub connected_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// Players keyed by session. Entries appear on the first movement update,
/// not at connect time.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: HashMap<SessionId, Player>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the player on first sight, otherwise update its pose.
    pub fn upsert(&mut self, id: &SessionId, position: Vec3, rotation: Vec3) {
        let now = Utc::now();
        self.players
            .entry(id.clone())
            .and_modify(|p| {
                p.position = position;
                p.rotation = rotation;
                p.last_active = now;
            })
            .or_insert_with(|| Player {
                id: id.clone(),
                position,
                rotation,
                connected_at: now,
                last_active: now,
            });
    }

    /// Returns the removed player, if any.
    pub fn remove(&mut self, id: &SessionId) -> Option<Player> {
        self.players.remove(id)
    }

    pub fn get(&self, id: &SessionId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn count(&self) -> usize {
        self.players.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_upsert_creates_player() {
        let mut registry = PlayerRegistry::new();
        let id = SessionId::from("p1");
        registry.upsert(&id, Vec3::new(1.0, 2.0, 3.0), Vec3::default());
        let p = registry.get(&id).unwrap();
        assert_eq!(p.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(p.connected_at, p.last_active);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn later_upserts_update_pose_but_keep_connected_at() {
        let mut registry = PlayerRegistry::new();
        let id = SessionId::from("p1");
        registry.upsert(&id, Vec3::default(), Vec3::default());
        let connected_at = registry.get(&id).unwrap().connected_at;

        registry.upsert(&id, Vec3::new(4.0, 5.0, 6.0), Vec3::new(0.1, 0.2, 0.0));
        let p = registry.get(&id).unwrap();
        assert_eq!(p.position, Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(p.rotation, Vec3::new(0.1, 0.2, 0.0));
        assert_eq!(p.connected_at, connected_at);
        assert!(p.last_active >= connected_at);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn remove_is_noop_for_unknown_session() {
        let mut registry = PlayerRegistry::new();
        let id = SessionId::from("p1");
        assert!(registry.remove(&id).is_none());
        registry.upsert(&id, Vec3::default(), Vec3::default());
        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert_eq!(registry.iter().count(), 0);
    }
}
