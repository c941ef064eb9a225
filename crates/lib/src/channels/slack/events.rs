//! Slack wire types: Socket Mode envelopes and Events API bodies.

use crate::channels::inbound::InboundMessage;
use serde::Deserialize;

use super::SLACK_CHANNEL_ID;

/// One Socket Mode frame: `{ "type", "envelope_id", "payload", "reason" }`.
/// `hello` and `disconnect` carry no envelope id; everything else must be acknowledged.
#[derive(Debug, Clone, Deserialize)]
pub struct SocketEnvelope {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub envelope_id: Option<String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    /// Why Slack is closing the connection (on `disconnect`), e.g. "refresh_requested".
    #[serde(default)]
    pub reason: Option<String>,
}

/// Events API body: the payload of an `events_api` envelope, or the JSON POSTed in HTTP mode.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventsApiBody {
    UrlVerification { challenge: String },
    EventCallback { event: SlackEvent },
    #[serde(other)]
    Other,
}

/// The inner `event` of an event callback. Only message fields are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
}

impl SlackEvent {
    /// Convert a `message` event to an inbound message. Other event types, or messages without a channel, yield None.
    pub fn into_inbound(self) -> Option<InboundMessage> {
        if self.typ != "message" {
            return None;
        }
        let conversation_id = self.channel?;
        Some(InboundMessage {
            channel_id: SLACK_CHANNEL_ID.to_string(),
            conversation_id,
            sender: self.user,
            text: self.text,
            bot_id: self.bot_id,
            subtype: self.subtype,
        })
    }
}

impl EventsApiBody {
    /// The message carried by an event callback, if any.
    pub fn into_inbound(self) -> Option<InboundMessage> {
        match self {
            EventsApiBody::EventCallback { event } => event.into_inbound(),
            _ => None,
        }
    }
}
