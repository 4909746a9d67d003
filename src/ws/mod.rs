//! WebSocket transport: wire protocol, per-client channel, connection handler

pub mod channel;
pub mod handler;
pub mod protocol;
