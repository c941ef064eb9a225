//! Gateway: HTTP listener (health probe, Events API endpoint) and the inbound dispatcher.
//!
//! Inbound messages from any connector go through one queue; the dispatcher spawns a task per
//! message so handlers run independently of each other.

mod server;

pub use server::{run_gateway, run_gateway_with_shutdown, GatewayState};
