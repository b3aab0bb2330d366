use std::sync::Arc;
use tokio::sync::watch;
use voxel_server::config::ServerConfig;
use voxel_server::gateway::Gateway;
use voxel_server::http::router;
use voxel_server::hub::SessionHub;
use voxel_server::persistence::{load_or_seed, run_autosave, JsonFileStore};
use voxel_server::world::WorldEngine;
use voxel_server::ws::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid server configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        eprintln!("Invalid server configuration: {}", e);
        std::process::exit(1);
    }

    let world = Arc::new(WorldEngine::new(config.bounds));
    let store = JsonFileStore::new(config.save_path.clone());
    load_or_seed(&world, &store).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let autosave = tokio::spawn(run_autosave(
        world.clone(),
        store,
        config.autosave_interval,
        shutdown_rx,
    ));

    let gateway = Arc::new(Gateway::new(
        world,
        Arc::new(SessionHub::new()),
        config.max_frame_bytes,
    ));
    let listen_addr = config.listen_addr.clone();
    let app = router(AppState::new(gateway, config));

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {}: {}", listen_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Starting voxel server on {}", listen_addr);
    println!("Voxel server listening on {}", listen_addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
    }

    // Final save happens inside the autosave task
    let _ = shutdown_tx.send(true);
    if let Err(e) = autosave.await {
        tracing::error!("Autosave task failed: {}", e);
    }
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
