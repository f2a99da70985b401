use bootscats_lib::PlayerId;
use tokio::sync::mpsc;

use super::lobby_actor::LobbyAction;
use crate::player::Player;

/// Mints per-connection [`LobbyHandle`]s for the one lobby actor.
#[derive(Clone, Debug)]
pub struct LobbyHandleProvider {
    pub(super) sender: mpsc::Sender<LobbyAction>,
}

impl LobbyHandleProvider {
    pub fn handle(&self, player_id: impl Into<PlayerId>) -> LobbyHandle {
        LobbyHandle {
            sender: self.sender.clone(),
            player_id: player_id.into(),
        }
    }
}

/// A connection task's channel to the lobby actor. Dropping the handle
/// notifies the lobby that the player disconnected.
#[derive(Debug)]
pub struct LobbyHandle {
    pub(super) sender: mpsc::Sender<LobbyAction>,
    pub(super) player_id: PlayerId,
}

impl LobbyHandle {
    /// Register the player with the lobby.
    pub async fn connect(&self, player: Player) {
        let _ = self.sender.send(LobbyAction::Connect { player }).await;
    }

    /// Forward one line of player input to the lobby.
    pub async fn line(&self, text: String) {
        let _ = self
            .sender
            .send(LobbyAction::Line {
                id: self.player_id,
                text,
            })
            .await;
    }
}

impl Drop for LobbyHandle {
    fn drop(&mut self) {
        let tx = self.sender.clone();
        let id = self.player_id;
        tokio::spawn(async move {
            if let Err(e) = tx.send(LobbyAction::Disconnect { id }).await {
                tracing::warn!(%e, "Failed to notify the lobby of a disconnect.");
            }
        });
    }
}
