//! WebSocket transport for dashboard connections

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::{
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{
    SinkExt,
    stream::{SplitSink, StreamExt},
};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::actors::gateway::Connection;
use crate::api::state::ApiState;
use crate::error::DeliveryError;

/// WebSocket upgrade handler
///
/// GET /api/stream
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<ApiState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_websocket(socket, peer, state))
}

/// Hand the socket to the gateway
async fn handle_websocket(socket: WebSocket, peer: SocketAddr, state: ApiState) {
    let connection = WebSocketConnection::new(socket, peer);

    if let Err(e) = state.pipeline.gateway().attach(Box::new(connection)).await {
        warn!("rejecting websocket client {peer}: {e}");
    }
}

/// Outbound half of a websocket
///
/// Incoming frames are drained by a reader task; the gateway only writes.
pub struct WebSocketConnection {
    peer: SocketAddr,
    sender: SplitSink<WebSocket, Message>,
    reader: JoinHandle<()>,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, peer: SocketAddr) -> Self {
        let (sender, mut receiver) = socket.split();

        let reader = tokio::spawn(async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Close(_) => break,
                    Message::Ping(_) => debug!("ping from {peer}"),
                    other => trace!("ignoring frame from {peer}: {other:?}"),
                }
            }
        });

        Self {
            peer,
            sender,
            reader,
        }
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn peer(&self) -> String {
        self.peer.to_string()
    }

    async fn send(&mut self, text: String) -> Result<(), DeliveryError> {
        if self.reader.is_finished() {
            return Err(DeliveryError::Disconnected);
        }

        self.sender
            .send(Message::Text(text))
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        self.reader.abort();
        let _ = self.sender.send(Message::Close(None)).await;
        let _ = self.sender.close().await;
        debug!("websocket client {} disconnected", self.peer);
    }
}
