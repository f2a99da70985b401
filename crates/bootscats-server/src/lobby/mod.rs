use std::time::Duration;

use tokio::sync::mpsc;

use self::lobby_actor::LobbyActor;
use self::lobby_handle::LobbyHandleProvider;

pub(crate) mod lobby_actor;
pub mod lobby_handle;

/// Spawn the process-wide lobby actor and return a provider for minting
/// per-connection handles to it.
pub fn spawn_lobby(turn_timeout: Duration) -> LobbyHandleProvider {
    let (sender, receiver) = mpsc::channel(64);
    let actor = LobbyActor::new(receiver, sender.clone(), turn_timeout);
    tokio::spawn(actor.run());

    LobbyHandleProvider { sender }
}
