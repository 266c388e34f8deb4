//! API routes.
//!
//! Pull endpoints serve the latest snapshot, exchange health and the active
//! filtering thresholds; `/ws` streams every new snapshot plus status
//! transitions. Handlers only ever load the current `Arc` or take a short
//! status lock; nothing here can block the ingestion path.

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

use crate::config::FilterSettings;
use crate::engine::OpportunityCache;
use crate::models::WsServerEvent;
use crate::store::StatusTracker;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<OpportunityCache>,
    pub status: Arc<StatusTracker>,
    pub filtering: FilterSettings,
    pub events: broadcast::Sender<WsServerEvent>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/ranking", get(get_ranking))
        .route("/api/status", get(get_status))
        .route("/api/config/filtering", get(get_filtering))
        .route("/ws", get(websocket_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Latest opportunity ranking, flat and sorted.
async fn get_ranking(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.cache.get_latest();
    Json(snapshot.opportunities.clone())
}

/// Per-exchange health map.
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.status.snapshot())
}

/// Active identity-filter thresholds, for the UI's grouping display.
async fn get_filtering(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.filtering)
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.events.subscribe();

    // Replay current state on connect so a fresh client renders immediately.
    let snapshot = state.cache.get_latest();
    let replay = [
        WsServerEvent::Opportunities(snapshot.opportunities.clone()),
        WsServerEvent::Status(state.status.snapshot()),
    ];
    for event in replay {
        let msg = match serde_json::to_string(&event) {
            Ok(m) => m,
            Err(e) => {
                warn!("failed to serialize replay event: {e}");
                continue;
            }
        };
        if socket.send(Message::Text(msg)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let msg = match serde_json::to_string(&event) {
                            Ok(m) => m,
                            Err(e) => {
                                warn!("failed to serialize ws event: {e}");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Slow consumer: it simply misses those snapshots.
                        debug!(missed, "ws subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if text == "ping" {
                            if socket.send(Message::Text("pong".to_string())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}
