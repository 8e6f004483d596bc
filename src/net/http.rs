//! HTTP surface: WebSocket upgrade, health probe, terrain map API and
//! static client files.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket},
    extract::{Path, State, WebSocketUpgrade},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::debug;
use uuid::Uuid;

use crate::game::input_buffer::{InputSender, PlayerInput};
use crate::game::terrain;
use crate::metrics::Metrics;
use crate::net::protocol::{decode, ClientEvent};
use crate::net::session::Command;
use crate::util::vec2::Vec2;

/// Shared handles for the HTTP layer.
pub struct AppState {
    pub commands: mpsc::UnboundedSender<Command>,
    pub inputs: InputSender,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    players: u64,
    tanks: u64,
    shells: u64,
    upgrades: u64,
    trees: u64,
    uptime_seconds: u64,
}

pub fn router(state: Arc<AppState>, static_dir: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/terrain-maps", get(list_terrain_maps))
        .route("/api/terrain-maps/:id", get(get_terrain_map))
        .fallback_service(ServeDir::new(static_dir))
        .layer(cors)
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let metrics = &state.metrics;
    Json(HealthResponse {
        status: "ok",
        players: metrics.players_total.load(Ordering::Relaxed),
        tanks: metrics.tanks_alive.load(Ordering::Relaxed),
        shells: metrics.shell_count.load(Ordering::Relaxed),
        upgrades: metrics.upgrade_count.load(Ordering::Relaxed),
        trees: metrics.tree_count.load(Ordering::Relaxed),
        uptime_seconds: metrics.uptime_seconds(),
    })
}

async fn list_terrain_maps() -> impl IntoResponse {
    Json(terrain::builtin_maps())
}

async fn get_terrain_map(Path(id): Path<String>) -> impl IntoResponse {
    match terrain::find_map(&id) {
        Some(map) => Json(map).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("unknown terrain map '{id}'") })),
        )
            .into_response(),
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One task per socket: a writer pump for the outbound queue and a read
/// loop that routes inputs to the lock-free buffer and everything else
/// to the command channel.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let socket_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    if state
        .commands
        .send(Command::Attach { socket_id, tx })
        .is_err()
    {
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = receiver.next().await {
        let Ok(message) = result else { break };
        match message {
            Message::Text(text) => {
                state.metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                match decode(&text) {
                    Ok(ClientEvent::PlayerInput(input)) => {
                        // Hot path: straight into the input buffer
                        let queued = state.inputs.try_send(PlayerInput {
                            player_id: socket_id,
                            movement: Vec2::new(input.movement.x, input.movement.y),
                            shoot: input.shoot,
                        });
                        if queued.is_err() {
                            debug!("input buffer full, dropping input from {socket_id}");
                        }
                    }
                    Ok(event) => {
                        if state
                            .commands
                            .send(Command::Event { socket_id, event })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        // Malformed inbound traffic is dropped quietly
                        debug!("undecodable message from {socket_id}: {e}");
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    let _ = state.commands.send(Command::Detach { socket_id });
    writer.abort();
}
