pub use error::FrameError;
pub use message::{Event, GameEvent, TurnRecord};

pub mod connection;
mod error;
mod message;
