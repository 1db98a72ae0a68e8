//! HTTP surface: the websocket viewer endpoint plus read-only helpers.
//!
//! `GET /` and `GET /ws` upgrade to a websocket that receives one frame per
//! broadcast period. `GET /snapshot` returns the same frame once as JSON,
//! `GET /viewers` lists open viewer connections and `GET /health` answers `ok`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::broadcast::{run_viewer, BroadcastError, Viewer, ViewerFrame};
use crate::hub::{ConnectionHub, ViewerInfo};
use crate::store::StateStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StateStore>,
    pub hub: Arc<ConnectionHub>,
    pub period: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/snapshot", get(snapshot))
        .route("/viewers", get(viewers))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn snapshot(State(state): State<AppState>) -> Json<ViewerFrame> {
    Json(ViewerFrame::from_store(&state.store))
}

async fn viewers(State(state): State<AppState>) -> Json<Vec<ViewerInfo>> {
    Json(state.hub.viewers())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_viewer(socket, peer, state))
}

struct WsViewer {
    id: Uuid,
    tx: SplitSink<WebSocket, Message>,
}

#[async_trait::async_trait]
impl Viewer for WsViewer {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn push(&mut self, frame: String) -> Result<(), BroadcastError> {
        self.tx
            .send(Message::Text(frame))
            .await
            .map_err(|e| BroadcastError::ViewerSend { viewer: self.id, reason: e.to_string() })
    }
}

async fn serve_viewer(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let guard = state.hub.register(Some(peer));
    let cancel = guard.token();
    let (tx, mut rx) = socket.split();

    // client messages are not part of the protocol; only watch for the close
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            while let Some(msg) = rx.next().await {
                if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                    break;
                }
            }
            cancel.cancel();
        }
    });

    let viewer = WsViewer { id: guard.id(), tx };
    match run_viewer(state.store.clone(), viewer, cancel, state.period).await {
        Ok(sent) => info!(viewer = %guard.id(), sent, "viewer closed"),
        Err(e) => warn!(viewer = %guard.id(), error = %e, "viewer dropped"),
    }
    watcher.abort();
}
