use std::sync::Arc;

use anyhow::Context;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use pong_engine::ids::UserId;
use serde::Deserialize;
use tokio::net::TcpListener;

use crate::app::App;

/// Identity a client connects with: `/ws?user_id=42&username=alice`.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub user_id: UserId,
    #[serde(default)]
    pub username: Option<String>,
}

pub fn router(app: Arc<App>) -> Router {
    Router::new().route("/ws", get(ws_upgrade)).with_state(app)
}

/// Bind the WebSocket gateway and serve client connections.
pub async fn run(app: Arc<App>, bind_addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;
    tracing::info!("Listening on {}", bind_addr);

    axum::serve(listener, router(app)).await?;
    Ok(())
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(app): State<Arc<App>>,
) -> impl IntoResponse {
    let name = params
        .username
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("player{}", params.user_id));
    tracing::info!("Connection from user {} ({})", params.user_id, name);
    ws.on_upgrade(move |socket| super::connection::handle(socket, app, params.user_id, name))
}
