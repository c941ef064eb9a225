//! Socket Mode loop: open a connection URL, read envelopes, acknowledge them, forward messages.

use crate::channels::inbound::InboundMessage;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};

use super::events::{EventsApiBody, SocketEnvelope};
use super::SlackChannel;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Why a single WebSocket connection ended.
#[derive(Debug)]
enum ConnectionEnd {
    /// Slack sent a `disconnect` envelope; open a fresh connection right away.
    Refresh(String),
    /// Socket closed without a `disconnect` envelope.
    Closed,
    /// `stop()` was called.
    Stopped,
    /// The gateway dropped its receiver.
    QueueClosed,
}

pub(super) async fn run_socket_mode(channel: Arc<SlackChannel>, inbound_tx: mpsc::Sender<InboundMessage>) {
    while channel.running() {
        let url = match channel.open_connection().await {
            Ok(url) => url,
            Err(e) => {
                log::warn!("slack apps.connections.open failed: {}", e);
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };
        match run_connection(&channel, &url, &inbound_tx).await {
            Ok(ConnectionEnd::Refresh(reason)) => {
                log::info!("slack requested reconnect ({}), opening a new connection", reason);
                continue;
            }
            Ok(ConnectionEnd::Closed) => {
                log::info!("slack socket closed");
            }
            Ok(ConnectionEnd::Stopped) => break,
            Ok(ConnectionEnd::QueueClosed) => {
                log::debug!("slack: inbound channel closed, stopping loop");
                return;
            }
            Err(e) => {
                log::warn!("slack socket error: {}", e);
            }
        }
        if channel.running() {
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }
    log::info!("slack channel: socket mode loop stopped");
}

async fn run_connection(
    channel: &SlackChannel,
    url: &str,
    inbound_tx: &mpsc::Sender<InboundMessage>,
) -> Result<ConnectionEnd, tungstenite::Error> {
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await?;
    log::debug!("slack socket connected");

    loop {
        let frame = tokio::select! {
            _ = channel.stop_signal.notified() => {
                let _ = ws.close(None).await;
                return Ok(ConnectionEnd::Stopped);
            }
            frame = ws.next() => frame,
        };
        let Some(frame) = frame else {
            return Ok(ConnectionEnd::Closed);
        };
        // Pings are answered by tungstenite itself.
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => return Ok(ConnectionEnd::Closed),
            _ => continue,
        };
        let envelope: SocketEnvelope = match serde_json::from_str(&text) {
            Ok(e) => e,
            Err(e) => {
                log::debug!("slack: ignoring unparsable frame: {}", e);
                continue;
            }
        };

        if let Some(ref id) = envelope.envelope_id {
            let ack = serde_json::json!({ "envelope_id": id }).to_string();
            ws.send(Message::Text(ack)).await?;
        }

        match envelope.typ.as_str() {
            "hello" => log::info!("slack socket mode session established"),
            "disconnect" => {
                return Ok(ConnectionEnd::Refresh(envelope.reason.unwrap_or_default()));
            }
            "events_api" => {
                let Some(msg) = envelope
                    .payload
                    .and_then(|p| serde_json::from_value::<EventsApiBody>(p).ok())
                    .and_then(EventsApiBody::into_inbound)
                else {
                    continue;
                };
                if inbound_tx.send(msg).await.is_err() {
                    return Ok(ConnectionEnd::QueueClosed);
                }
            }
            other => log::debug!("slack: ignoring {} envelope", other),
        }
    }
}
