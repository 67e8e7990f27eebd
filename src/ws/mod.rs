//! WebSocket transport: wire protocol, per-client endpoint and socket tasks

pub mod connection;
pub mod handler;
pub mod protocol;
pub mod router;
