//! Inbound message from a channel: delivered to the gateway for dispatch to the responder.

/// A posted message, normalized from the channel's wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    /// Connector id (e.g. "slack").
    pub channel_id: String,
    /// Where replies go (Slack channel id such as "C024BE91L").
    pub conversation_id: String,
    /// Author's user id, used verbatim in mentions.
    pub sender: Option<String>,
    pub text: Option<String>,
    /// Set when the message was posted by a bot integration.
    pub bot_id: Option<String>,
    /// Slack message subtype (e.g. "message_changed"); None for plain user messages.
    pub subtype: Option<String>,
}
