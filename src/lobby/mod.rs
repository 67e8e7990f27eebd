//! Lobby: the hub actor and its room registry

pub mod hub;
pub mod registry;

pub use hub::{Hub, HubHandle};
