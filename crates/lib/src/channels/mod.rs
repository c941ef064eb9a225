//! Communication channels (Slack).
//!
//! Channel trait and registry so the gateway can start/stop channel connectors
//! and route replies. Inbound messages are sent to the gateway for dispatch.

mod inbound;
mod registry;
pub mod slack;

pub use inbound::InboundMessage;
pub use registry::{ChannelError, ChannelHandle, ChannelRegistry};
pub use slack::{SlackChannel, SlackIdentity};
