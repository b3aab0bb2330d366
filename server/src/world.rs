use chrono::{DateTime, NaiveDate, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use voxel_shared::{BlockPos, Vec3, WorldBounds};

use crate::error::ServerError;
use crate::hub::SessionId;
use crate::persistence::{WorldCounters, WorldSave};
use crate::player::{Player, PlayerRegistry};
use crate::terrain;
use crate::voxels::{Block, Placement, VoxelStore};

/// Point-in-time copy of the world
#[derive(Debug, Clone)]
pub struct WorldSnapshot {
    pub blocks: Vec<Block>,
    pub players: Vec<Player>,
    pub bounds: WorldBounds,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct WorldStats {
    pub total_blocks: usize,
    pub active_players: usize,
    pub blocks_placed_today: u64,
    pub blocks_destroyed_today: u64,
    pub total_operations: u64,
    pub uptime_seconds: u64,
}

/// Everything behind the engine lock. Block and player maps share one lock
/// so snapshots never see one updated without the other.
struct WorldState {
    voxels: VoxelStore,
    players: PlayerRegistry,
    counters: WorldCounters,
    /// UTC day the "today" counters belong to
    counter_day: NaiveDate,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
}

impl WorldState {
    /// Every mutation lands on `now`'s day, so counters never outlive it.
    fn touch(&mut self, now: DateTime<Utc>) {
        self.roll_day(now.date_naive());
        self.last_modified = self.last_modified.max(now);
    }

    fn roll_day(&mut self, today: NaiveDate) {
        if today != self.counter_day {
            self.counters.blocks_placed_today = 0;
            self.counters.blocks_destroyed_today = 0;
            self.counter_day = today;
        }
    }
}

/// Authoritative world: voxels plus connected players.
///
/// All mutation goes through this type. Each operation takes the lock once,
/// so operations are individually atomic; nothing is held across an await.
pub struct WorldEngine {
    state: Mutex<WorldState>,
    started: Instant,
}

impl WorldEngine {
    /// Empty world. Call `seed_default_terrain` or `load_snapshot` next.
    pub fn new(bounds: WorldBounds) -> Self {
        let now = Utc::now();
        Self {
            state: Mutex::new(WorldState {
                voxels: VoxelStore::new(bounds),
                players: PlayerRegistry::new(),
                counters: WorldCounters::default(),
                counter_day: now.date_naive(),
                created_at: now,
                last_modified: now,
            }),
            started: Instant::now(),
        }
    }

    fn state(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn bounds(&self) -> WorldBounds {
        self.state().voxels.bounds()
    }

    /// Place a block, or clear the cell for type 0, on behalf of `actor`.
    pub fn place_block(
        &self,
        pos: BlockPos,
        block_type: i32,
        actor: &SessionId,
    ) -> Result<Placement, ServerError> {
        let now = Utc::now();
        let mut state = self.state();
        let placement = state
            .voxels
            .place_or_clear(pos, block_type, Some(actor.as_str()))?;

        state.roll_day(now.date_naive());
        match placement {
            Placement::Placed => state.counters.blocks_placed_today += 1,
            Placement::Cleared => state.counters.blocks_destroyed_today += 1,
        }
        state.counters.total_operations += 1;
        state.touch(now);
        Ok(placement)
    }

    pub fn move_player(&self, id: &SessionId, position: Vec3, rotation: Vec3) {
        let mut state = self.state();
        state.players.upsert(id, position, rotation);
        state.touch(Utc::now());
    }

    pub fn drop_player(&self, id: &SessionId) -> Option<Player> {
        let mut state = self.state();
        let removed = state.players.remove(id);
        if removed.is_some() {
            state.touch(Utc::now());
        }
        removed
    }

    pub fn block_at(&self, pos: BlockPos) -> Option<Block> {
        self.state().voxels.get(pos).cloned()
    }

    pub fn player(&self, id: &SessionId) -> Option<Player> {
        self.state().players.get(id).cloned()
    }

    pub fn block_count(&self) -> usize {
        self.state().voxels.count()
    }

    pub fn players(&self) -> Vec<Player> {
        self.state().players.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        let state = self.state();
        WorldSnapshot {
            blocks: state.voxels.iter().cloned().collect(),
            players: state.players.iter().cloned().collect(),
            bounds: state.voxels.bounds(),
            created_at: state.created_at,
            last_modified: state.last_modified,
        }
    }

    pub fn stats(&self) -> WorldStats {
        let today = Utc::now().date_naive();
        let state = self.state();
        let same_day = state.counter_day == today;
        WorldStats {
            total_blocks: state.voxels.count(),
            active_players: state.players.count(),
            blocks_placed_today: if same_day {
                state.counters.blocks_placed_today
            } else {
                0
            },
            blocks_destroyed_today: if same_day {
                state.counters.blocks_destroyed_today
            } else {
                0
            },
            total_operations: state.counters.total_operations,
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }

    /// Seed the default hills and trees. Seeded blocks do not count as
    /// player operations. Returns the block count afterwards.
    pub fn seed_default_terrain(&self) -> usize {
        let mut state = self.state();
        let count = terrain::seed_default(&mut state.voxels);
        state.touch(Utc::now());
        tracing::info!("Generated {} initial blocks", count);
        count
    }

    /// Clear every block and reseed the default terrain. Players and
    /// counters are kept. Returns the new blocks.
    pub fn reset(&self) -> Vec<Block> {
        let mut state = self.state();
        state.voxels.clear();
        let count = terrain::seed_default(&mut state.voxels);
        state.touch(Utc::now());
        tracing::info!("World reset, {} blocks after reseed", count);
        state.voxels.iter().cloned().collect()
    }

    /// Replace all blocks with those of `save` and merge its counters.
    /// Blocks that violate bounds or type rules are skipped. Returns the
    /// number of blocks restored.
    pub fn load_snapshot(&self, save: WorldSave) -> usize {
        let now = Utc::now();
        let mut state = self.state();
        state.roll_day(now.date_naive());
        state.voxels.clear();

        let mut skipped = 0usize;
        for block in save.blocks {
            if let Err(e) = state.voxels.restore(block) {
                tracing::warn!("Skipping persisted block: {}", e);
                skipped += 1;
            }
        }

        // "today" counters only carry over when the save is from today
        if save.last_modified.date_naive() == state.counter_day {
            state.counters.blocks_placed_today += save.stats.blocks_placed_today;
            state.counters.blocks_destroyed_today += save.stats.blocks_destroyed_today;
        }
        state.counters.total_operations += save.stats.total_operations;

        state.created_at = state.created_at.min(save.created_at);
        state.touch(save.last_modified.max(now));

        let restored = state.voxels.count();
        if skipped > 0 {
            tracing::warn!("Skipped {} invalid persisted blocks", skipped);
        }
        restored
    }

    /// Daily counters are rolled first so a save never carries an earlier
    /// day's counts.
    pub fn export_snapshot(&self) -> WorldSave {
        let mut state = self.state();
        state.roll_day(Utc::now().date_naive());
        WorldSave {
            blocks: state.voxels.iter().cloned().collect(),
            stats: state.counters.clone(),
            created_at: state.created_at,
            last_modified: state.last_modified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn engine() -> WorldEngine {
        WorldEngine::new(WorldBounds::default())
    }

    #[test]
    fn out_of_bounds_place_leaves_count_unchanged() {
        let world = engine();
        world.seed_default_terrain();
        let before = world.block_count();
        let actor = SessionId::from("a");
        for pos in [BlockPos::new(60, 5, 0), BlockPos::new(0, -3, 0), BlockPos::new(0, 80, 0)] {
            assert!(world.place_block(pos, 1, &actor).is_err());
        }
        assert_eq!(world.block_count(), before);
        assert_eq!(world.stats().total_operations, 0);
    }

    #[test]
    fn place_and_clear_update_counters() {
        let world = engine();
        let actor = SessionId::from("a");
        let pos = BlockPos::new(0, 10, 0);

        assert_eq!(world.place_block(pos, 1, &actor), Ok(Placement::Placed));
        let block = world.block_at(pos).unwrap();
        assert_eq!(block.block_type, 1);
        assert_eq!(block.placed_by.as_deref(), Some("a"));

        assert_eq!(world.place_block(pos, 0, &actor), Ok(Placement::Cleared));
        assert!(world.block_at(pos).is_none());

        let stats = world.stats();
        assert_eq!(stats.blocks_placed_today, 1);
        assert_eq!(stats.blocks_destroyed_today, 1);
        assert_eq!(stats.total_operations, 2);
        assert_eq!(stats.total_blocks, 0);
    }

    #[test]
    fn invalid_type_is_rejected_and_not_counted() {
        let world = engine();
        let actor = SessionId::from("a");
        assert_eq!(
            world.place_block(BlockPos::new(0, 0, 0), 11, &actor),
            Err(ServerError::InvalidBlockType(11))
        );
        assert_eq!(world.stats().total_operations, 0);
    }

    #[test]
    fn last_modified_never_goes_backwards() {
        let world = engine();
        let actor = SessionId::from("a");
        let mut previous = world.snapshot().last_modified;
        for i in 0..20 {
            world
                .place_block(BlockPos::new(i % 5, 1, 0), (i % 3) as i32, &actor)
                .unwrap();
            let current = world.snapshot().last_modified;
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn rejected_mutation_does_not_touch_last_modified() {
        let world = engine();
        let before = world.snapshot().last_modified;
        let _ = world.place_block(BlockPos::new(0, 99, 0), 1, &SessionId::from("a"));
        assert_eq!(world.snapshot().last_modified, before);
    }

    #[test]
    fn snapshot_matches_live_counts() {
        let world = engine();
        let seeded = world.seed_default_terrain();
        world.move_player(&SessionId::from("p"), Vec3::new(0.0, 9.0, 0.0), Vec3::default());
        let snapshot = world.snapshot();
        assert_eq!(snapshot.blocks.len(), seeded);
        assert_eq!(snapshot.blocks.len(), world.block_count());
        assert!(snapshot.blocks.iter().all(|b| b.block_type != 0));
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.bounds, WorldBounds::default());
    }

    #[test]
    fn players_come_and_go() {
        let world = engine();
        let id = SessionId::from("p");
        world.move_player(&id, Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.0, 1.5, 0.0));
        assert_eq!(world.stats().active_players, 1);
        assert_eq!(world.player(&id).unwrap().rotation.y, 1.5);
        assert!(world.drop_player(&id).is_some());
        assert!(world.drop_player(&id).is_none());
        assert_eq!(world.stats().active_players, 0);
    }

    #[test]
    fn seeding_does_not_count_as_operations() {
        let world = engine();
        assert!(world.seed_default_terrain() > 0);
        let stats = world.stats();
        assert_eq!(stats.blocks_placed_today, 0);
        assert_eq!(stats.total_operations, 0);
    }

    #[test]
    fn reset_restores_default_terrain() {
        let world = engine();
        let seeded = world.seed_default_terrain();
        let actor = SessionId::from("a");
        world.place_block(BlockPos::new(0, 30, 0), 4, &actor).unwrap();
        world.place_block(BlockPos::new(0, 7, 0), 0, &actor).unwrap();

        let blocks = world.reset();
        assert_eq!(blocks.len(), seeded);
        assert_eq!(world.block_count(), seeded);
        assert!(world.block_at(BlockPos::new(0, 30, 0)).is_none());
        assert!(world.block_at(BlockPos::new(0, 7, 0)).is_some());
    }

    #[test]
    fn export_then_load_preserves_blocks_and_counters() {
        let source = engine();
        let actor = SessionId::from("builder");
        source.place_block(BlockPos::new(1, 1, 1), 7, &actor).unwrap();
        source.place_block(BlockPos::new(2, 1, 1), 8, &actor).unwrap();
        source.place_block(BlockPos::new(2, 1, 1), 0, &actor).unwrap();
        let save = source.export_snapshot();

        let target = engine();
        target.seed_default_terrain();
        assert_eq!(target.load_snapshot(save), 1);
        assert_eq!(target.block_count(), 1);
        let block = target.block_at(BlockPos::new(1, 1, 1)).unwrap();
        assert_eq!(block.block_type, 7);
        assert_eq!(block.placed_by.as_deref(), Some("builder"));

        let stats = target.stats();
        assert_eq!(stats.blocks_placed_today, 2);
        assert_eq!(stats.blocks_destroyed_today, 1);
        assert_eq!(stats.total_operations, 3);
    }

    #[test]
    fn load_skips_invalid_blocks() {
        let world = engine();
        let now = Utc::now();
        let block = |x, y, t| Block {
            position: BlockPos::new(x, y, 0),
            block_type: t,
            placed_by: None,
            placed_at: now,
        };
        let save = WorldSave {
            blocks: vec![block(0, 0, 1), block(0, 500, 1), block(1, 0, 0), block(2, 0, 42)],
            stats: WorldCounters::default(),
            created_at: now,
            last_modified: now,
        };
        assert_eq!(world.load_snapshot(save), 1);
    }

    #[test]
    fn stale_save_does_not_carry_daily_counters() {
        let world = engine();
        let yesterday = Utc::now() - Duration::days(1);
        let save = WorldSave {
            blocks: Vec::new(),
            stats: WorldCounters {
                blocks_placed_today: 5,
                blocks_destroyed_today: 4,
                total_operations: 9,
            },
            created_at: yesterday,
            last_modified: yesterday,
        };
        world.load_snapshot(save);
        let stats = world.stats();
        assert_eq!(stats.blocks_placed_today, 0);
        assert_eq!(stats.blocks_destroyed_today, 0);
        assert_eq!(stats.total_operations, 9);
        assert_eq!(world.snapshot().created_at, yesterday);
    }

    #[test]
    fn day_rollover_resets_daily_counters() {
        let world = engine();
        let actor = SessionId::from("a");
        world.place_block(BlockPos::new(0, 0, 0), 1, &actor).unwrap();

        let mut state = world.state();
        let tomorrow = state.counter_day.succ_opt().unwrap();
        state.roll_day(tomorrow);
        assert_eq!(state.counters.blocks_placed_today, 0);
        assert_eq!(state.counters.total_operations, 1);
        assert_eq!(state.counter_day, tomorrow);
    }

    #[test]
    fn stale_daily_counters_are_not_saved_as_today() {
        let world = engine();
        let actor = SessionId::from("a");
        world.place_block(BlockPos::new(0, 0, 0), 1, &actor).unwrap();
        {
            let mut state = world.state();
            state.counter_day = state.counter_day.pred_opt().unwrap();
        }

        world.move_player(&actor, Vec3::new(1.0, 2.0, 3.0), Vec3::default());
        let save = world.export_snapshot();
        assert_eq!(save.stats.blocks_placed_today, 0);
        assert_eq!(save.stats.total_operations, 1);

        let restarted = engine();
        restarted.load_snapshot(save);
        let stats = restarted.stats();
        assert_eq!(stats.blocks_placed_today, 0);
        assert_eq!(stats.total_operations, 1);
    }

    #[test]
    fn export_rolls_stale_day_before_saving() {
        let world = engine();
        world
            .place_block(BlockPos::new(0, 0, 0), 0, &SessionId::from("a"))
            .unwrap();
        {
            let mut state = world.state();
            state.counter_day = state.counter_day.pred_opt().unwrap();
        }
        assert_eq!(world.export_snapshot().stats.blocks_destroyed_today, 0);
    }

    #[test]
    fn concurrent_writers_keep_counts_consistent() {
        let world = std::sync::Arc::new(engine());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let world = world.clone();
                std::thread::spawn(move || {
                    let actor = SessionId::from(format!("t{}", t).as_str());
                    for x in 0..10 {
                        world.place_block(BlockPos::new(x, t, 0), 2, &actor).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(world.block_count(), 40);
        assert_eq!(world.stats().total_operations, 40);
        assert_eq!(world.snapshot().blocks.len(), 40);
    }
}
