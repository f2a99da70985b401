use serde::{Deserialize, Serialize};

use crate::PlayerId;

/// A single outbound wire event, encoded as one JSON object per line.
///
/// Inbound traffic is raw text (whatever the player typed), so only the
/// server-to-client direction is structured.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub enum Event {
    /// Informational, no game-state implication.
    #[serde(rename = "message")]
    Message(String),
    /// The player's last input was invalid or out of turn.
    #[serde(rename = "error")]
    Error(String),
    /// Game lifecycle notification addressed to a single player.
    #[serde(rename = "event")]
    Game(GameEvent),
    /// Broadcast record of a completed move.
    #[serde(rename = "turn")]
    Turn(TurnRecord),
}

#[derive(Debug, Deserialize, Serialize, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameEvent {
    /// You move first and no number exists yet.
    Start,
    /// It is your turn.
    Turn,
    /// You failed to respond in time.
    Timedout,
    /// You are the sole survivor.
    Win,
    /// You were eliminated.
    Lose,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TurnRecord {
    pub player: PlayerId,
    pub said: String,
}

impl From<GameEvent> for Event {
    fn from(ev: GameEvent) -> Self {
        Self::Game(ev)
    }
}
