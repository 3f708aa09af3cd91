//! Typed player commands built on [`WebSocketProtocolClient::send`].
//!
//! Transport commands go out at `High` priority and do not wait for a reply;
//! the backend answers with `player_state` / `queue_updated` broadcasts that
//! callers observe through [`WebSocketProtocolClient::on`].

use crate::client::WebSocketProtocolClient;
use crate::error::Result;
use crate::message::{MessagePriority, MessageType, SendOptions, WsMessage};
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct PlayerCommands {
    client: WebSocketProtocolClient,
}

impl PlayerCommands {
    pub fn new(client: WebSocketProtocolClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &WebSocketProtocolClient {
        &self.client
    }

    /// Resume playback, or start `track_id` when given.
    pub async fn play(&self, track_id: Option<&str>) -> Result<()> {
        let payload = track_id.map(|id| json!({ "track_id": id }));
        self.transport(MessageType::Play, payload).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.transport(MessageType::Pause, None).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.transport(MessageType::Stop, None).await
    }

    /// Seek to `position` seconds. Negative or non-finite positions become 0.
    pub async fn seek(&self, position: f64) -> Result<()> {
        let position = if position.is_finite() { position.max(0.0) } else { 0.0 };
        self.transport(MessageType::Seek, Some(json!({ "position": position })))
            .await
    }

    pub async fn next(&self) -> Result<()> {
        self.transport(MessageType::Next, None).await
    }

    pub async fn previous(&self) -> Result<()> {
        self.transport(MessageType::Previous, None).await
    }

    /// Set the output volume, clamped to `0.0..=1.0`.
    pub async fn set_volume(&self, volume: f64) -> Result<()> {
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
        self.transport(MessageType::SetVolume, Some(json!({ "volume": volume })))
            .await
    }

    pub async fn queue_add(&self, track_ids: &[String]) -> Result<()> {
        self.fire(MessageType::QueueAdd, Some(json!({ "track_ids": track_ids })))
            .await
    }

    pub async fn queue_remove(&self, index: usize) -> Result<()> {
        self.fire(MessageType::QueueRemove, Some(json!({ "index": index })))
            .await
    }

    pub async fn queue_reorder(&self, from: usize, to: usize) -> Result<()> {
        self.fire(
            MessageType::QueueReorder,
            Some(json!({ "from_index": from, "to_index": to })),
        )
        .await
    }

    pub async fn queue_clear(&self) -> Result<()> {
        self.fire(MessageType::QueueClear, None).await
    }

    /// Ask the backend to rescan the library and wait for its acknowledgement.
    pub async fn request_library_scan(&self) -> Result<WsMessage> {
        self.client.request(MessageType::LibraryScan, None).await
    }

    async fn transport(&self, message_type: MessageType, payload: Option<Value>) -> Result<()> {
        self.client
            .send(
                message_type,
                payload,
                SendOptions::default().priority(MessagePriority::High),
            )
            .await
            .map(|_| ())
    }

    async fn fire(&self, message_type: MessageType, payload: Option<Value>) -> Result<()> {
        self.client
            .send(message_type, payload, SendOptions::default())
            .await
            .map(|_| ())
    }
}
