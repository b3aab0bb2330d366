//! HTTP routes next to the WebSocket endpoint: health, read-only world
//! inspection and the admin reset.

use axum::extract::State;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use voxel_shared::protocol::{BlockWire, PlayerWire, PROTOCOL_VERSION};
use voxel_shared::WorldBounds;

use crate::protocol::{block_wire, player_wire};
use crate::world::WorldStats;
use crate::ws::{ws_handler, AppState};

#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub protocol_version: u32,
    pub websocket: &'static str,
    pub players_online: usize,
    pub total_blocks: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub players_online: usize,
    pub total_blocks: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct WorldView {
    pub blocks: Vec<BlockWire>,
    pub players: Vec<PlayerWire>,
    pub bounds: WorldBounds,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatsView {
    #[serde(flatten)]
    pub world: WorldStats,
    pub players_online: usize,
    pub bounds: WorldBounds,
}

#[derive(Debug, Serialize)]
pub struct ResetResult {
    pub status: &'static str,
    pub total_blocks: usize,
}

/// Build the full application router.
pub fn router(app_state: AppState) -> Router {
    let config = app_state.config.clone();

    let app = Router::new()
        .route("/", get(info))
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/api/world", get(world))
        .route("/api/stats", get(stats))
        .route("/api/players", get(players))
        .route("/api/world/reset", post(reset));

    let app = match &config.static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app,
    };

    app.layer(cors_layer(&config.cors_origins))
        .with_state(app_state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn info(State(app_state): State<AppState>) -> Json<ServerInfo> {
    Json(ServerInfo {
        name: "voxel-server",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        protocol_version: PROTOCOL_VERSION,
        websocket: "/ws",
        players_online: app_state.gateway.hub().count(),
        total_blocks: app_state.world.block_count(),
        timestamp: Utc::now(),
    })
}

async fn health(State(app_state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "healthy",
        players_online: app_state.gateway.hub().count(),
        total_blocks: app_state.world.block_count(),
        timestamp: Utc::now(),
    })
}

async fn world(State(app_state): State<AppState>) -> Json<WorldView> {
    let snapshot = app_state.world.snapshot();
    Json(WorldView {
        blocks: snapshot.blocks.iter().map(block_wire).collect(),
        players: snapshot.players.iter().map(player_wire).collect(),
        bounds: snapshot.bounds,
        created_at: snapshot.created_at,
        last_modified: snapshot.last_modified,
    })
}

async fn stats(State(app_state): State<AppState>) -> Json<StatsView> {
    Json(StatsView {
        world: app_state.world.stats(),
        players_online: app_state.gateway.hub().count(),
        bounds: app_state.world.bounds(),
    })
}

async fn players(State(app_state): State<AppState>) -> Json<Vec<PlayerWire>> {
    Json(app_state.world.players().iter().map(player_wire).collect())
}

async fn reset(State(app_state): State<AppState>) -> Json<ResetResult> {
    let total_blocks = app_state.gateway.reset_world();
    Json(ResetResult {
        status: "reset",
        total_blocks,
    })
}
