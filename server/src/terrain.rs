//! Default terrain: a low hill over the centre of the map with a few trees.
//!
//! Block ids are cosmetic; clients pick textures for them.

use voxel_shared::BlockPos;

use crate::voxels::VoxelStore;

pub const GRASS: i32 = 1;
pub const DIRT: i32 = 2;
pub const STONE: i32 = 3;
pub const WOOD: i32 = 5;
pub const SAND: i32 = 6;
/// Leaves reuse the grass id
pub const LEAVES: i32 = GRASS;

/// Half-width of the seeded square around the origin
const HILL_RADIUS: i32 = 20;
/// Column scan start when looking for a tree's ground level
const GROUND_SEARCH_TOP: i32 = 20;
const TREE_POSITIONS: [(i32, i32); 5] = [(5, 5), (-8, 3), (12, -7), (-15, -12), (8, -15)];

/// Surface height of the hill at (x, z).
fn hill_height(x: i32, z: i32) -> i32 {
    let r = HILL_RADIUS as f64;
    let h = 5.0 + 3.0 * (0.5 - (x as f64 / r).abs()) + 2.0 * (0.5 - (z as f64 / r).abs());
    (h as i32).max(0)
}

/// Seed the default terrain into `store`. Cells outside the store's bounds
/// are skipped. Returns the number of blocks in the store afterwards.
pub fn seed_default(store: &mut VoxelStore) -> usize {
    for x in -HILL_RADIUS..=HILL_RADIUS {
        for z in -HILL_RADIUS..=HILL_RADIUS {
            let height = hill_height(x, z);
            for y in 0..=height {
                let block_type = if y == height && height > 2 {
                    GRASS
                } else if y == height {
                    SAND
                } else if y >= height - 2 && height > 2 {
                    DIRT
                } else {
                    STONE
                };
                let _ = store.place_or_clear(BlockPos::new(x, y, z), block_type, None);
            }
        }
    }

    for (x, z) in TREE_POSITIONS {
        plant_tree(store, x, z);
    }

    store.count()
}

/// Trunk of four wood blocks topped by a diamond of leaves. Only planted on
/// grass-height ground.
fn plant_tree(store: &mut VoxelStore, x: i32, z: i32) {
    let ground = store.ground_height(x, z, GROUND_SEARCH_TOP);
    if ground <= 3 {
        return;
    }

    for y in ground + 1..ground + 5 {
        let _ = store.place_or_clear(BlockPos::new(x, y, z), WOOD, None);
    }

    for dx in -2..=2i32 {
        for dz in -2..=2i32 {
            for dy in 3..7i32 {
                if dx.abs() + dz.abs() + (dy - 4).abs() > 3 {
                    continue;
                }
                // keep the trunk column clear below the crown
                if dx == 0 && dz == 0 && dy <= 4 {
                    continue;
                }
                let pos = BlockPos::new(x + dx, ground + dy, z + dz);
                let _ = store.place_or_clear(pos, LEAVES, None);
            }
        }
    }
}
