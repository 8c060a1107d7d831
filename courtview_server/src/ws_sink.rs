//! Websocket write half as a broadcast subscriber.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use courtview_env::{EnvError, Payload, SubscriberSink};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::net::SocketAddr;

/// Sends each frame entry as one JSON text message.
pub struct WsSink {
    peer: SocketAddr,
    tx: SplitSink<WebSocket, Message>,
}

impl WsSink {
    pub fn new(peer: SocketAddr, tx: SplitSink<WebSocket, Message>) -> Self {
        Self { peer, tx }
    }
}

#[async_trait]
impl SubscriberSink for WsSink {
    async fn send(&mut self, payload: Payload) -> Result<(), EnvError> {
        self.tx
            .send(Message::Text(payload.to_string()))
            .await
            .map_err(|e| EnvError::send_failed(format!("{}: {e}", self.peer)))
    }

    async fn close(&mut self) -> Result<(), EnvError> {
        self.tx
            .close()
            .await
            .map_err(|e| EnvError::closed(format!("{}: {e}", self.peer)))
    }

    fn describe(&self) -> String {
        format!("ws:{}", self.peer)
    }
}
