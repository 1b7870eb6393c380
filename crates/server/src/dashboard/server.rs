//! axum web server for the operator dashboard.
//!
//! JSON endpoints at `/metrics` and `/matches`, plus a WebSocket at `/ws`
//! that pushes a metrics snapshot to connected browsers every 200 ms.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use super::metrics::MetricsSnapshot;
use super::{DashboardState, MatchSummary};

pub fn router(state: Arc<DashboardState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/matches", get(matches))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

/// Start the dashboard web server. Runs forever on its own tasks.
pub async fn start(state: Arc<DashboardState>, port: u16) {
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Dashboard failed to bind to {}: {}", addr, e);
            return;
        }
    };
    tracing::info!("Dashboard listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Dashboard server error: {}", e);
    }
}

async fn metrics(State(state): State<Arc<DashboardState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot(state.registry.len() as u64))
}

async fn matches(State(state): State<Arc<DashboardState>>) -> Json<Vec<MatchSummary>> {
    Json(state.live_matches())
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<DashboardState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Push metrics to a connected browser until it goes away.
async fn handle_socket(mut socket: WebSocket, state: Arc<DashboardState>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(200));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snap = state.metrics.snapshot(state.registry.len() as u64);
                let msg = serde_json::json!({
                    "type": "metrics",
                    "data": snap,
                });
                if send_json(&mut socket, &msg).await.is_err() {
                    break;
                }
            }

            // Drain any incoming messages (ping/pong, close).
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }
}

async fn send_json(socket: &mut WebSocket, value: &serde_json::Value) -> Result<(), ()> {
    let text = value.to_string();
    socket.send(Message::Text(text.into())).await.map_err(|_| ())
}
