use std::collections::HashSet;
use std::fmt::Display;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bootscats_lib::PlayerId;
use rand::{thread_rng, Rng};

use crate::lobby;
use crate::lobby::lobby_handle::{LobbyHandle, LobbyHandleProvider};

#[derive(Clone, Debug)]
pub struct ServerState {
    players: Arc<Mutex<HashSet<PlayerId>>>,
    lobby: LobbyHandleProvider,
}

impl ServerState {
    /// Spawns the process-wide lobby actor, so this must be called from
    /// within the runtime.
    pub fn new(turn_timeout: Duration) -> Self {
        Self {
            players: Arc::default(),
            lobby: lobby::spawn_lobby(turn_timeout),
        }
    }

    /// Reserve a fresh unique id for a new connection. The id is freed when
    /// the returned guard is dropped.
    pub fn add_player(&self) -> OwnedPlayerId {
        let player_id = self.gen_player_id();
        self.players().insert(player_id);
        OwnedPlayerId {
            state: self.clone(),
            id: player_id,
        }
    }

    pub fn lobby_handle(&self, player_id: PlayerId) -> LobbyHandle {
        self.lobby.handle(player_id)
    }

    fn players(&self) -> MutexGuard<HashSet<PlayerId>> {
        self.players.lock().unwrap()
    }

    fn gen_player_id(&self) -> PlayerId {
        let mut player_id;
        loop {
            player_id = thread_rng().gen::<u32>().into();
            if !self.players().contains(&player_id) {
                break;
            };
        }
        player_id
    }
}

/// Guard that frees a player's id when their connection is torn down.
#[derive(Debug)]
pub struct OwnedPlayerId {
    state: ServerState,
    id: PlayerId,
}

impl Display for OwnedPlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.id.fmt(f)
    }
}

impl Deref for OwnedPlayerId {
    type Target = PlayerId;

    fn deref(&self) -> &Self::Target {
        &self.id
    }
}

impl Drop for OwnedPlayerId {
    fn drop(&mut self) {
        // This will crash the program if we're dropping due to a previous panic caused by a poisoned lock,
        // and that's fine for now.
        self.state.players.lock().unwrap().remove(&self.id);
    }
}
