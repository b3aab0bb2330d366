use crate::protocol::BlockPos;

/// Highest block type id. Type 0 is air and is never stored.
pub const MAX_BLOCK_TYPE: u8 = 10;

/// Longest accepted chat message, in characters.
pub const MAX_CHAT_CHARS: usize = 500;

/// Axis-aligned box of valid block coordinates, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, ts_rs::TS)]
#[ts(export, export_to = "../../client/src/shared/generated/")]
pub struct WorldBounds {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
    pub min_z: i32,
    pub max_z: i32,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self::from_size(100, 50)
    }
}

impl WorldBounds {
    /// Bounds centred on the origin: `±size/2` on x/z and `0..=height` on y.
    pub fn from_size(size: i32, height: i32) -> Self {
        let half = size / 2;
        Self {
            min_x: -half,
            max_x: half,
            min_y: 0,
            max_y: height,
            min_z: -half,
            max_z: half,
        }
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        (self.min_x..=self.max_x).contains(&pos.x)
            && (self.min_y..=self.max_y).contains(&pos.y)
            && (self.min_z..=self.max_z).contains(&pos.z)
    }

    /// False when any axis has `min > max`.
    pub fn is_valid(&self) -> bool {
        self.min_x <= self.max_x && self.min_y <= self.max_y && self.min_z <= self.max_z
    }
}
