//! pongbot core library: configuration, the Slack channel connector, the keyword responder,
//! and the gateway that ties them together. Used by the `pongbot` CLI.

pub mod channels;
pub mod config;
pub mod gateway;
pub mod responder;
