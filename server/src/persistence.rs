//! On-disk world snapshots.
//!
//! The file is a single JSON document:
//! `{"blocks": [...], "stats": {...}, "created_at": ..., "last_modified": ...}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::ServerError;
use crate::voxels::Block;
use crate::world::WorldEngine;

/// Operation counters persisted with the world
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldCounters {
    pub blocks_placed_today: u64,
    pub blocks_destroyed_today: u64,
    pub total_operations: u64,
}

/// Persisted world document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSave {
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub stats: WorldCounters,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

/// JSON file holding the latest world snapshot
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. A missing file is `Ok(None)`.
    pub async fn load(&self) -> Result<Option<WorldSave>, ServerError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Write the snapshot through a temporary file and rename it into place,
    /// so a crash mid-write never leaves a truncated document.
    pub async fn save(&self, save: &WorldSave) -> Result<(), ServerError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_vec_pretty(save)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Export the world and write it out, logging the outcome.
pub async fn save_world(world: &WorldEngine, store: &JsonFileStore) -> Result<(), ServerError> {
    let save = world.export_snapshot();
    let count = save.blocks.len();
    match store.save(&save).await {
        Ok(()) => {
            tracing::info!("World saved: {} blocks to {}", count, store.path().display());
            Ok(())
        }
        Err(e) => {
            tracing::error!("Failed to save world: {}", e);
            Err(e)
        }
    }
}

/// Load the persisted world into `world`, or seed default terrain when there
/// is nothing usable on disk. Returns the resulting block count.
pub async fn load_or_seed(world: &WorldEngine, store: &JsonFileStore) -> usize {
    match store.load().await {
        Ok(Some(save)) => {
            let count = world.load_snapshot(save);
            tracing::info!("World loaded: {} blocks from {}", count, store.path().display());
            count
        }
        Ok(None) => {
            tracing::info!("No saved world at {}, generating terrain", store.path().display());
            world.seed_default_terrain()
        }
        Err(e) => {
            tracing::error!("Failed to load world: {}", e);
            world.seed_default_terrain()
        }
    }
}

/// Save on every `interval` until `shutdown` flips to true (or its sender is
/// dropped), then save once more. A failed save is retried on the next tick.
pub async fn run_autosave(
    world: Arc<WorldEngine>,
    store: JsonFileStore,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // first tick fires immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let _ = save_world(&world, &store).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    let _ = save_world(&world, &store).await;
    tracing::info!("Autosave stopped");
}
