//! Wire types shared between the voxel server and its clients.

pub mod config;
pub mod protocol;
pub mod vec3;

pub use config::WorldBounds;
pub use protocol::BlockPos;
pub use vec3::Vec3;
