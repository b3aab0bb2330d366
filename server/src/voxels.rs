use chrono::{DateTime, Utc};
use std::collections::HashMap;
use voxel_shared::config::MAX_BLOCK_TYPE;
use voxel_shared::{BlockPos, WorldBounds};

use crate::error::ServerError;

/// Type id of air. Air is never stored; placing it clears the cell.
pub const AIR: u8 = 0;

/// A solid block in the world
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub position: BlockPos,
    #[serde(rename = "type")]
    pub block_type: u8,
    #[serde(default)]
    pub placed_by: Option<String>,
    pub placed_at: DateTime<Utc>,
}

/// Outcome of a successful `place_or_clear`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// A solid block now occupies the cell
    Placed,
    /// The cell is air, whether or not a block was there before
    Cleared,
}

/// Sparse voxel storage keyed by integer coordinate.
///
/// Holds only solid blocks with type in `1..=MAX_BLOCK_TYPE`, all within
/// `bounds`. Every write path checks both before touching the map.
#[derive(Debug)]
pub struct VoxelStore {
    bounds: WorldBounds,
    blocks: HashMap<BlockPos, Block>,
}

impl VoxelStore {
    pub fn new(bounds: WorldBounds) -> Self {
        Self {
            bounds,
            blocks: HashMap::new(),
        }
    }

    pub fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    /// Place a block, or clear the cell when `block_type` is air.
    /// Rejected writes leave the store untouched.
    pub fn place_or_clear(
        &mut self,
        pos: BlockPos,
        block_type: i32,
        actor: Option<&str>,
    ) -> Result<Placement, ServerError> {
        if !self.bounds.contains(pos) {
            return Err(ServerError::OutOfBounds(pos));
        }
        let block_type = u8::try_from(block_type)
            .ok()
            .filter(|t| *t <= MAX_BLOCK_TYPE)
            .ok_or(ServerError::InvalidBlockType(block_type))?;

        if block_type == AIR {
            self.blocks.remove(&pos);
            return Ok(Placement::Cleared);
        }

        self.blocks.insert(
            pos,
            Block {
                position: pos,
                block_type,
                placed_by: actor.map(str::to_string),
                placed_at: Utc::now(),
            },
        );
        Ok(Placement::Placed)
    }

    /// Insert a previously persisted block, keeping its metadata.
    pub fn restore(&mut self, block: Block) -> Result<(), ServerError> {
        if !self.bounds.contains(block.position) {
            return Err(ServerError::OutOfBounds(block.position));
        }
        if block.block_type == AIR || block.block_type > MAX_BLOCK_TYPE {
            return Err(ServerError::InvalidBlockType(block.block_type as i32));
        }
        self.blocks.insert(block.position, block);
        Ok(())
    }

    pub fn get(&self, pos: BlockPos) -> Option<&Block> {
        self.blocks.get(&pos)
    }

    /// Highest occupied `y` in the column at (x, z), scanning down from
    /// `search_top`. Returns 0 for an empty column.
    pub fn ground_height(&self, x: i32, z: i32, search_top: i32) -> i32 {
        (0..=search_top)
            .rev()
            .find(|&y| self.blocks.contains_key(&BlockPos::new(x, y, z)))
            .unwrap_or(0)
    }

    pub fn count(&self) -> usize {
        self.blocks.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }
}
