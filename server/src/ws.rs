use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::gateway::{Flow, Gateway};
use crate::hub::SessionId;
use crate::world::WorldEngine;

/// Shared app state passed to every handler
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub world: Arc<WorldEngine>,
    pub config: Arc<ServerConfig>,
    /// One permit per live connection, sized by `max_players`
    pub connection_slots: Arc<Semaphore>,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, config: ServerConfig) -> Self {
        Self {
            world: gateway.world().clone(),
            connection_slots: Arc::new(Semaphore::new(config.max_players)),
            config: Arc::new(config),
            gateway,
        }
    }
}

/// HTTP handler for WebSocket upgrade
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<AppState>) -> Response {
    let permit = match app_state.connection_slots.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!(
                "Refusing connection: server full ({} players)",
                app_state.config.max_players
            );
            return (StatusCode::SERVICE_UNAVAILABLE, "Server full").into_response();
        }
    };

    // refuse oversized frames before they are buffered
    let limit = app_state.config.max_frame_bytes;
    ws.max_frame_size(limit)
        .max_message_size(limit)
        .on_upgrade(move |socket| handle_socket(socket, app_state, permit))
}

async fn handle_socket(socket: WebSocket, app_state: AppState, _permit: OwnedSemaphorePermit) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel(app_state.config.outbound_queue);

    let gateway = &app_state.gateway;
    let mut conn = gateway.open(SessionId::random(), tx);

    loop {
        tokio::select! {
            // Client -> Server
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if gateway.handle_frame(&mut conn, text.as_str()) == Flow::Close {
                            let _ = sink.send(Message::Close(None)).await;
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::debug!("Ignoring binary frame from {}", conn.id());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("Player {}: {}", conn.id(), ServerError::Transport(e.to_string()));
                        break;
                    }
                    _ => {} // ping/pong handled by axum
                }
            }

            // Server -> Client
            outbound = rx.recv() => {
                match outbound {
                    Some(payload) => {
                        if let Err(e) = sink.send(Message::Text(payload.to_string().into())).await {
                            tracing::debug!("Player {}: {}", conn.id(), ServerError::Transport(e.to_string()));
                            break;
                        }
                    }
                    // hub dropped our sender after a failed delivery
                    None => break,
                }
            }
        }
    }

    gateway.close(&mut conn);
}
