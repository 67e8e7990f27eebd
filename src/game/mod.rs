//! Game simulation modules

pub mod combat;
pub mod physics;
pub mod room;
pub mod rules;
pub mod snapshot;
pub mod spawn;
pub mod state;
pub mod vector;

pub use room::{DepartureReason, Room, RoomCommand, RoomError, RoomEvent, RoomHandle};
