//! Load test for the voxel server.
//!
//! Spawns fake WebSocket clients that:
//! - Connect and wait for their world_state
//! - Stream player_update messages at the move rate
//! - Place and clear blocks at the build rate
//! - Count the broadcasts they receive
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of clients to spawn (default: 20)
//!   --duration S     Test duration in seconds (default: 30)
//!   --move-rate R    Player updates per second per client (default: 10)
//!   --build-rate R   Block edits per second per client (default: 1)
//!   --url URL        Server URL (default: ws://127.0.0.1:8000/ws)

use futures_util::{Sink, SinkExt, StreamExt};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use voxel_shared::protocol::{BlockUpdateData, ClientMsg, PlayerUpdateData, ServerMsg};
use voxel_shared::Vec3;

// === Metrics ===

#[derive(Default)]
struct Metrics {
    connected: AtomicU64,
    messages_received: AtomicU64,
    world_states_received: AtomicU64,
    blocks_in_world_state: AtomicU64,
    block_updates_received: AtomicU64,
    player_updates_received: AtomicU64,
    player_updates_sent: AtomicU64,
    block_updates_sent: AtomicU64,
    errors: AtomicU64,
    connect_latency_sum_ms: AtomicU64,
    connect_latency_count: AtomicU64,
}

fn interval_for(rate: f64) -> Duration {
    if rate > 0.0 {
        Duration::from_secs_f64(1.0 / rate)
    } else {
        Duration::from_secs(3600) // Effectively never
    }
}

fn record(metrics: &Metrics, text: &str) {
    metrics.messages_received.fetch_add(1, Ordering::Relaxed);
    match serde_json::from_str::<ServerMsg>(text) {
        Ok(ServerMsg::WorldState(state)) => {
            metrics.world_states_received.fetch_add(1, Ordering::Relaxed);
            metrics
                .blocks_in_world_state
                .fetch_add(state.blocks.len() as u64, Ordering::Relaxed);
        }
        Ok(ServerMsg::BlockUpdate(_)) => {
            metrics.block_updates_received.fetch_add(1, Ordering::Relaxed);
        }
        Ok(ServerMsg::PlayerUpdate(_)) => {
            metrics.player_updates_received.fetch_add(1, Ordering::Relaxed);
        }
        Ok(_) => {}
        Err(_) => {
            metrics.errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

// === Client task ===

struct ClientPlan {
    url: String,
    move_rate: f64,
    build_rate: f64,
    duration: Duration,
}

async fn run_client(client_id: u32, plan: Arc<ClientPlan>, metrics: Arc<Metrics>) {
    let connect_start = Instant::now();

    let (mut ws, _) = match connect_async(plan.url.as_str()).await {
        Ok(conn) => conn,
        Err(e) => {
            if client_id < 5 {
                eprintln!("Client {} failed to connect: {}", client_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };

    metrics.connect_latency_sum_ms.fetch_add(
        connect_start.elapsed().as_millis() as u64,
        Ordering::Relaxed,
    );
    metrics.connect_latency_count.fetch_add(1, Ordering::Relaxed);

    // Nothing else is meaningful before the world arrives
    let got_world = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    record(&metrics, text.as_str());
                    if text.contains("\"type\":\"world_state\"") {
                        return true;
                    }
                }
                Ok(Message::Close(_)) | Err(_) => return false,
                _ => {}
            }
        }
        false
    })
    .await;

    if !matches!(got_world, Ok(true)) {
        if client_id < 5 {
            eprintln!("Client {} never received world_state", client_id);
        }
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        return;
    }
    metrics.connected.fetch_add(1, Ordering::Relaxed);

    let mut move_timer = tokio::time::interval(interval_for(plan.move_rate));
    move_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut build_timer = tokio::time::interval(interval_for(plan.build_rate));
    build_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // Each client builds in its own column above the terrain
    let column = Vec3::new(
        (client_id % 40) as f64 - 20.0,
        0.0,
        (client_id / 40) as f64 - 20.0,
    );
    let mut height = 25.0;
    let mut placing = true;
    let test_end = Instant::now() + plan.duration;

    while Instant::now() < test_end {
        tokio::select! {
            _ = move_timer.tick() => {
                let (position, rotation) = {
                    let mut rng = rand::thread_rng();
                    (
                        Vec3::new(
                            column.x + rng.gen_range(-2.0..2.0),
                            30.0,
                            column.z + rng.gen_range(-2.0..2.0),
                        ),
                        Vec3::new(0.0, rng.gen_range(0.0..std::f64::consts::TAU), 0.0),
                    )
                };
                let msg = ClientMsg::PlayerUpdate(PlayerUpdateData { position, rotation });
                if !send(&mut ws, &msg).await {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                metrics.player_updates_sent.fetch_add(1, Ordering::Relaxed);
            }

            _ = build_timer.tick() => {
                let msg = ClientMsg::BlockUpdate(BlockUpdateData {
                    position: Vec3::new(column.x, height, column.z),
                    block_type: if placing { 4 } else { 0 },
                });
                if !send(&mut ws, &msg).await {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                metrics.block_updates_sent.fetch_add(1, Ordering::Relaxed);

                // build a short tower, then tear it down again
                if placing {
                    if height >= 34.0 {
                        placing = false;
                    } else {
                        height += 1.0;
                    }
                } else if height <= 25.0 {
                    placing = true;
                } else {
                    height -= 1.0;
                }
            }

            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => record(&metrics, text.as_str()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        if client_id < 5 {
                            eprintln!("Client {} error: {}", client_id, e);
                        }
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

async fn send<S>(ws: &mut S, msg: &ClientMsg) -> bool
where
    S: Sink<Message> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => ws.send(Message::Text(json.into())).await.is_ok(),
        Err(_) => false,
    }
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_clients: u32 = 20;
    let mut duration_secs: u64 = 30;
    let mut move_rate: f64 = 10.0;
    let mut build_rate: f64 = 1.0;
    let mut url = "ws://127.0.0.1:8000/ws".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" => {
                i += 1;
                num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(20);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--move-rate" => {
                i += 1;
                move_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(10.0);
            }
            "--build-rate" => {
                i += 1;
                build_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(1.0);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== Voxel Server Load Test ===");
    println!("Clients: {}", num_clients);
    println!("Duration: {}s", duration_secs);
    println!("Move rate: {}/s per client", move_rate);
    println!("Build rate: {}/s per client", build_rate);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::default());
    let plan = Arc::new(ClientPlan {
        url,
        move_rate,
        build_rate,
        duration: Duration::from_secs(duration_secs),
    });

    let mut handles = Vec::with_capacity(num_clients as usize);
    let spawn_start = Instant::now();

    for client_id in 0..num_clients {
        let plan = Arc::clone(&plan);
        let metrics = Arc::clone(&metrics);
        handles.push(tokio::spawn(run_client(client_id, plan, metrics)));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 10 == 9 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    println!("All clients spawned in {:?}", spawn_start.elapsed());
    println!();

    let progress = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();
        loop {
            interval.tick().await;
            println!(
                "[{:3}s] connected={}, msgs={}, block_updates={}, player_updates={}, errors={}",
                start.elapsed().as_secs(),
                progress.connected.load(Ordering::Relaxed),
                progress.messages_received.load(Ordering::Relaxed),
                progress.block_updates_received.load(Ordering::Relaxed),
                progress.player_updates_received.load(Ordering::Relaxed),
                progress.errors.load(Ordering::Relaxed),
            );
        }
    });

    for handle in handles {
        let _ = handle.await;
    }
    stats_handle.abort();

    println!();
    println!("=== Final Results ===");
    let msgs = metrics.messages_received.load(Ordering::Relaxed);
    let world_states = metrics.world_states_received.load(Ordering::Relaxed);
    let blocks_seen = metrics.blocks_in_world_state.load(Ordering::Relaxed);
    let block_updates = metrics.block_updates_received.load(Ordering::Relaxed);
    let player_updates = metrics.player_updates_received.load(Ordering::Relaxed);
    let moves_sent = metrics.player_updates_sent.load(Ordering::Relaxed);
    let edits_sent = metrics.block_updates_sent.load(Ordering::Relaxed);
    let errors = metrics.errors.load(Ordering::Relaxed);
    let latency_sum = metrics.connect_latency_sum_ms.load(Ordering::Relaxed);
    let latency_count = metrics.connect_latency_count.load(Ordering::Relaxed);

    println!("Total messages received: {}", msgs);
    println!("world_state received: {}", world_states);
    if world_states > 0 {
        println!("Average blocks per world_state: {}", blocks_seen / world_states);
    }
    println!("block_update received: {} (sent {})", block_updates, edits_sent);
    println!("player_update received: {} (sent {})", player_updates, moves_sent);
    println!("Total errors: {}", errors);
    if latency_count > 0 {
        println!("Average connect latency: {}ms", latency_sum / latency_count);
    }

    // Every edit is echoed to every client; moves go to everyone but the sender
    let clients = num_clients as f64;
    if edits_sent > 0 {
        let expected = edits_sent as f64 * clients;
        println!(
            "block_update delivery: {:.1}%",
            block_updates as f64 / expected * 100.0
        );
    }
    if moves_sent > 0 && num_clients > 1 {
        let expected = moves_sent as f64 * (clients - 1.0);
        println!(
            "player_update delivery: {:.1}%",
            player_updates as f64 / expected * 100.0
        );
    }
    println!(
        "Messages/sec (total): {:.0}",
        msgs as f64 / duration_secs.max(1) as f64
    );
}
