use std::time::Duration;

use bootscats_lib::net::Event;
use bootscats_lib::{PlayerId, SessionId};
use tokio::sync::mpsc;
use tracing::instrument;

use crate::player::Player;
use crate::session::Session;

/// The dispatcher: owns the pool of connected-but-unassigned players and the
/// single concurrently-active [`Session`]. Everything that mutates game
/// state flows through this actor's mailbox, including turn-timer firings.
pub struct LobbyActor {
    receiver: mpsc::Receiver<LobbyAction>,
    /// Cloned into turn-timer tasks so their firings serialize with every
    /// other session mutation.
    sender: mpsc::Sender<LobbyAction>,
    /// Connected players not bound to the active session, in connect order.
    idle: Vec<Player>,
    game: Option<Session>,
    turn_timeout: Duration,
    next_session: u32,
}

#[derive(Debug)]
pub enum LobbyAction {
    Connect { player: Player },
    Line { id: PlayerId, text: String },
    Disconnect { id: PlayerId },
    TurnTimeout { session: SessionId, epoch: u64 },
}

impl LobbyActor {
    pub fn new(
        receiver: mpsc::Receiver<LobbyAction>,
        sender: mpsc::Sender<LobbyAction>,
        turn_timeout: Duration,
    ) -> Self {
        Self {
            receiver,
            sender,
            idle: Vec::new(),
            game: None,
            turn_timeout,
            next_session: 0,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("Lobby opened");
        // The actor keeps a sender of its own for timers, so this loop runs
        // for the life of the process
        while let Some(msg) = self.receiver.recv().await {
            self.handle(msg);
        }
        tracing::info!("Lobby closed");
    }

    fn handle(&mut self, msg: LobbyAction) {
        match msg {
            LobbyAction::Connect { player } => self.on_connect(player),
            LobbyAction::Line { id, text } => self.on_line(id, &text),
            LobbyAction::Disconnect { id } => self.on_disconnect(id),
            LobbyAction::TurnTimeout { session, epoch } => self.on_turn_timeout(session, epoch),
        }
        self.reap_game();
    }
}

// ----------------------------------------------------------------------------
// Message Handlers
// ----------------------------------------------------------------------------
impl LobbyActor {
    #[instrument(skip_all, fields(player_id = %player.id))]
    fn on_connect(&mut self, player: Player) {
        player.send(Event::Message("Connected to B/C server".to_owned()));
        tracing::info!("Player connected");

        match self.game.as_mut().filter(|g| g.is_active()) {
            Some(game) => {
                game.client_joined(player);
                tracing::debug!(players = game.player_count(), "Joined the active game");
            }
            None => {
                self.idle.push(player);
                self.maybe_start_game();
            }
        }
    }

    fn on_line(&mut self, id: PlayerId, text: &str) {
        match self.game.as_mut() {
            Some(game) => game.submit(id, text),
            // No active game to address
            None => tracing::debug!(player_id = %id, text, "Dropping line, no game running"),
        }
    }

    #[instrument(skip(self), fields(player_id = %id))]
    fn on_disconnect(&mut self, id: PlayerId) {
        if let Some(game) = self.game.as_mut() {
            game.player_left(id);
        }
        if let Some(idx) = self.idle.iter().position(|p| p.id == id) {
            self.idle.remove(idx);
            tracing::info!("Idle player disconnected");
        }
    }

    /// A firing scoped to a session that is no longer the live one is stale
    /// by definition and dropped here.
    fn on_turn_timeout(&mut self, session: SessionId, epoch: u64) {
        if let Some(game) = self.game.as_mut().filter(|g| g.id() == session) {
            game.handle_timeout(epoch);
        }
    }

    /// A session that ended during the last action hands its survivor back
    /// to the idle pool, then a rematch is attempted immediately.
    fn reap_game(&mut self) {
        if !self.game.as_ref().is_some_and(Session::is_ended) {
            return;
        }
        if let Some(game) = self.game.take() {
            if let Some(winner) = game.into_winner() {
                self.idle.push(winner);
            }
        }
        self.maybe_start_game();
    }

    fn maybe_start_game(&mut self) {
        if self.game.as_ref().is_some_and(Session::is_active) {
            return;
        }
        if self.idle.len() < 2 {
            for player in &self.idle {
                player.send(Event::Message("No other players".to_owned()));
            }
            return;
        }

        let session_id = SessionId::from(self.next_session);
        self.next_session += 1;

        let players = std::mem::take(&mut self.idle);
        tracing::info!(session_id = %session_id, players = players.len(), "Starting a new game");
        let mut game = Session::new(session_id, players, self.turn_timeout, self.sender.clone());
        game.start();
        self.game = Some(game);
    }
}
