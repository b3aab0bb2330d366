//! Voxel world server library.
//!
//! Exposes the server components for the binaries and integration tests.

pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod hub;
pub mod persistence;
pub mod player;
pub mod protocol;
pub mod terrain;
pub mod voxels;
pub mod world;
pub mod ws;
