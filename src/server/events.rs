//! Live event broadcasting
//!
//! Call lifecycle events fan out to every connected dashboard over
//! WebSocket. Events are serialized once as `{"type": ..., "data": ...}`
//! and pushed through a broadcast channel; slow consumers that lag behind
//! the channel capacity miss events rather than stalling the callers.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
struct Envelope<'a, T> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: T,
}

#[derive(Clone)]
pub struct EventHub {
    sender: broadcast::Sender<String>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Broadcast an event to all connected clients. Serialization failures
    /// and the no-subscriber case are both non-fatal.
    pub fn broadcast<T: Serialize>(&self, kind: &str, data: T) {
        match serde_json::to_string(&Envelope { kind, data }) {
            Ok(payload) => {
                let receivers = self.sender.send(payload).unwrap_or(0);
                debug!(kind, receivers, "broadcast event");
            }
            Err(err) => warn!(kind, error = %err, "failed to serialize event"),
        }
    }
}

/// Drive one WebSocket connection: forward broadcast events out, answer
/// pings, drop the connection when the client goes away.
pub async fn serve_socket(socket: WebSocket, hub: EventHub) {
    let (mut sink, mut stream) = socket.split();
    let mut events = hub.subscribe();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(payload) => {
                    if sink.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket client lagged behind event stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Ping(data))) => {
                    if sink.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn events_reach_subscribers_as_typed_envelopes() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();

        hub.broadcast("call_started", json!({ "call_id": 42 }));

        let payload = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["type"], "call_started");
        assert_eq!(value["data"]["call_id"], 42);
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_a_no_op() {
        let hub = EventHub::new();
        hub.broadcast("call_ended", json!({}));
    }
}
