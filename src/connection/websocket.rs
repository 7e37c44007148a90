//! WebSocket transport
//!
//! Opens a WebSocket to the telemetry source and pumps JSON text frames
//! between the socket and the link channels.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use super::error::{ConnectionError, ConnectionResult};
use super::frame::Frame;
use super::transport::{Transport, TransportLink};

/// [`Transport`] over a WebSocket client connection
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self) -> ConnectionResult<TransportLink> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;

        tracing::info!(url = %self.url, "WebSocket connected");

        let (mut sink, mut stream) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Frame>();

        // Task to forward frames from the link to the socket
        let mut send_task = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match frame.encode() {
                    Ok(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            tracing::debug!("WebSocket send failed, closing link");
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to serialize frame");
                    }
                }
            }
            let _ = sink.close().await;
        });

        // Task to receive frames from the socket and hand them to the link
        let mut recv_task = tokio::spawn(async move {
            while let Some(result) = stream.next().await {
                match result {
                    Ok(Message::Text(text)) => match Frame::decode(&text) {
                        Ok(frame) => {
                            if inbound_tx.send(frame).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, text = %text, "Malformed frame dropped");
                        }
                    },
                    Ok(Message::Close(_)) => {
                        tracing::debug!("Telemetry source closed the socket");
                        break;
                    }
                    Ok(_) => {
                        // Ping/pong and binary frames carry no telemetry
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        });

        // When either side finishes, tear down the other so the link closes
        tokio::spawn(async move {
            tokio::select! {
                _ = &mut send_task => {
                    recv_task.abort();
                }
                _ = &mut recv_task => {
                    send_task.abort();
                }
            }
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_refused_is_transport_error() {
        // Port 9 (discard) on localhost is not expected to speak WebSocket
        let transport = WebSocketTransport::new("ws://127.0.0.1:9/ws");
        let result = transport.open().await;
        assert!(matches!(result, Err(ConnectionError::Transport(_))));
        assert_eq!(transport.endpoint(), "ws://127.0.0.1:9/ws");
    }
}
