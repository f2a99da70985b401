use std::time::Duration;

use abort_on_drop::ChildTask;
use bootscats_lib::net::{Event, GameEvent, TurnRecord};
use bootscats_lib::rules;
use bootscats_lib::{PlayerId, SessionId};
use tokio::sync::mpsc;
use tracing::instrument;

use crate::lobby::lobby_actor::LobbyAction;
use crate::player::Player;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Status {
    Pending,
    Active,
    Ended,
}

/// One run of the counting game, from `start` to a single (or zero)
/// survivor.
///
/// All mutation happens on the lobby actor task; the only thing a `Session`
/// ever does concurrently is sleep on the turn timer, and that firing is
/// routed back through the actor's mailbox (`wake`) so it serializes with
/// submissions and disconnects.
pub struct Session {
    id: SessionId,
    /// Insertion order is turn order. Mutated only by removal, and by
    /// mid-game joins appending at the tail.
    players: Vec<Player>,
    turn_idx: usize,
    /// The number whose answer is awaited. `None` until the first valid
    /// move names the starting number.
    current_number: Option<u64>,
    status: Status,
    turn_timeout: Duration,
    wake: mpsc::Sender<LobbyAction>,
    /// At most one outstanding timer, owned by the player at `turn_idx`.
    /// Dropping the task aborts the sleep; `epoch` catches a firing that was
    /// already queued in the mailbox when the turn moved on.
    timer: Option<ChildTask<()>>,
    epoch: u64,
    winner: Option<Player>,
}

impl Session {
    pub fn new(
        id: SessionId,
        players: Vec<Player>,
        turn_timeout: Duration,
        wake: mpsc::Sender<LobbyAction>,
    ) -> Self {
        Self {
            id,
            players,
            turn_idx: 0,
            current_number: None,
            status: Status::Pending,
            turn_timeout,
            wake,
            timer: None,
            epoch: 0,
            winner: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    pub fn is_ended(&self) -> bool {
        self.status == Status::Ended
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// The surviving player of an ended session, if there was one.
    pub fn into_winner(self) -> Option<Player> {
        self.winner
    }

    pub fn start(&mut self) {
        if self.status != Status::Pending {
            return;
        }
        if self.players.is_empty() {
            tracing::warn!("Attempted to start a session with no players");
            return;
        }

        self.current_number = None;
        self.turn_idx = 0;
        self.status = Status::Active;
        tracing::info!(session_id = %self.id, players = self.players.len(), "Game started");
        self.prompt_current();
    }

    /// A line of input from `player_id`.
    #[instrument(skip(self, said), fields(player_id = %player_id))]
    pub fn submit(&mut self, player_id: PlayerId, said: &str) {
        if self.status != Status::Active {
            return;
        }

        if self.players[self.turn_idx].id != player_id {
            if let Some(player) = self.players.iter().find(|p| p.id == player_id) {
                player.send(Event::Error("Not your turn!".to_owned()));
            }
            return;
        }

        // The player answered in time
        self.cancel_timer();

        let said = said.trim();
        match self.current_number {
            None => {
                // The first move of the game names the starting number
                let Some(number) = said.parse::<u64>().ok().filter(|&n| n > 0) else {
                    let current = &self.players[self.turn_idx];
                    current.send(Event::Error(
                        "!!! start with a number, please - try again !!!".to_owned(),
                    ));
                    self.prompt_current();
                    return;
                };
                self.current_number = Some(number);
            }
            Some(number) => {
                if said != rules::expected(number) {
                    tracing::info!(said, number, "Wrong answer");
                    self.eliminate(player_id);
                    return;
                }
            }
        }

        self.broadcast(Event::Turn(TurnRecord {
            player: player_id,
            said: said.to_owned(),
        }));
        self.current_number = self.current_number.map(|n| n + 1);
        self.turn_idx = (self.turn_idx + 1) % self.players.len();
        self.prompt_current();
    }

    /// Removal for any reason: disconnect, wrong answer, or timeout.
    ///
    /// Unknown ids are tolerated; a close requested by the game may race the
    /// transport's own disconnect notification for the same player.
    #[instrument(skip(self), fields(player_id = %player_id))]
    pub fn player_left(&mut self, player_id: PlayerId) {
        let Some(idx) = self.players.iter().position(|p| p.id == player_id) else {
            return;
        };
        self.players.remove(idx);
        tracing::info!(remaining = self.players.len(), "Player left session");

        let was_on_turn = idx == self.turn_idx;
        if idx < self.turn_idx {
            self.turn_idx -= 1;
        } else if was_on_turn {
            // The removed player held the armed timer
            self.cancel_timer();
            if self.turn_idx >= self.players.len() {
                self.turn_idx = 0;
            }
        }

        if self.status == Status::Active && self.players.len() <= 1 {
            self.end_game();
            return;
        }

        if self.status == Status::Active && was_on_turn {
            self.prompt_current();
        }
    }

    /// The turn timer fired. `epoch` identifies the arming that scheduled
    /// it; anything but the current arming is stale and ignored.
    pub fn handle_timeout(&mut self, epoch: u64) {
        if self.status != Status::Active {
            return;
        }
        if self.timer.is_none() || epoch != self.epoch {
            tracing::debug!(epoch, "Ignoring stale turn timer");
            return;
        }
        self.timer = None;

        let current = &self.players[self.turn_idx];
        let current_id = current.id;
        tracing::info!(player_id = %current_id, "Turn timed out");
        current.send(GameEvent::Timedout.into());
        self.broadcast(Event::Turn(TurnRecord {
            player: current_id,
            said: "TIMEOUT".to_owned(),
        }));
        self.eliminate(current_id);
    }

    /// Mid-game join: the newcomer is seated at the end of the rotation and
    /// only gets a real turn once the cycle reaches them.
    #[instrument(skip_all, fields(player_id = %player.id))]
    pub fn client_joined(&mut self, player: Player) {
        let others = self
            .players
            .iter()
            .map(|p| p.id.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        player.send(Event::Message(format!("Other players: {others}")));
        if let Some(number) = self.current_number {
            let waiting_on = self.players[self.turn_idx].id;
            player.send(Event::Message(format!(
                "Game in progress: current number is {number}, waiting on {waiting_on}"
            )));
        }
        self.broadcast(Event::Message(format!("New player: {}", player.id)));

        tracing::info!("Player joined mid-game");
        self.players.push(player);
    }

    /// Deliver an event to every remaining player in the session.
    fn broadcast(&self, event: Event) {
        for player in &self.players {
            player.send(event.clone());
        }
    }

    /// Wrong-answer/timeout path: the player is told they lost, their
    /// connection is closed, and they are removed from the session.
    fn eliminate(&mut self, player_id: PlayerId) {
        if let Some(player) = self.players.iter().find(|p| p.id == player_id) {
            player.send(GameEvent::Lose.into());
            player.kick();
        }
        self.player_left(player_id);
    }

    /// Terminal transition. Idempotent; calling it with more than one player
    /// remaining is a bug in the caller.
    fn end_game(&mut self) {
        if self.status == Status::Ended {
            return;
        }
        assert!(
            self.players.len() <= 1,
            "end_game called with {} players remaining",
            self.players.len()
        );

        self.cancel_timer();
        self.status = Status::Ended;

        // Drain the roster so stray late events can no longer mutate this
        // session or reach its former players
        self.winner = self.players.pop();
        match &self.winner {
            Some(winner) => {
                tracing::info!(player_id = %winner.id, "Game over, winner decided");
                winner.send(GameEvent::Win.into());
            }
            None => tracing::info!("Game over with no players left"),
        }
    }

    fn prompt_current(&mut self) {
        if self.status != Status::Active {
            return;
        }

        let current = &self.players[self.turn_idx];
        current.send(
            if self.current_number.is_none() {
                GameEvent::Start
            } else {
                GameEvent::Turn
            }
            .into(),
        );
        self.arm_timer();
    }

    fn arm_timer(&mut self) {
        self.epoch += 1;
        let session = self.id;
        let epoch = self.epoch;
        let wake = self.wake.clone();
        let timeout = self.turn_timeout;
        self.timer = Some(
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = wake.send(LobbyAction::TurnTimeout { session, epoch }).await;
            })
            .into(),
        );
    }

    fn cancel_timer(&mut self) {
        // Dropping the task aborts a sleep that hasn't fired yet
        self.timer = None;
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use bootscats_lib::net::{Event, GameEvent, TurnRecord};
    use bootscats_lib::rules;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use crate::lobby::lobby_actor::LobbyAction;
    use crate::player::{Outbound, Player};

    use super::Session;

    fn player(id: u32) -> (Player, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Player::new(id.into(), tx), rx)
    }

    fn setup(
        count: u32,
    ) -> (
        Session,
        Vec<mpsc::UnboundedReceiver<Outbound>>,
        mpsc::Receiver<LobbyAction>,
    ) {
        let (wake_tx, wake_rx) = mpsc::channel(8);
        let mut rxs = Vec::new();
        let players = (0..count)
            .map(|i| {
                let (player, rx) = player(i);
                rxs.push(rx);
                player
            })
            .collect();
        let session = Session::new(0.into(), players, Duration::from_secs(60), wake_tx);
        (session, rxs, wake_rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(m) = rx.try_recv() {
            out.push(m);
        }
        out
    }

    #[tokio::test]
    async fn start_prompts_only_the_first_player() {
        let (mut session, mut rxs, _wake) = setup(2);
        session.start();

        assert!(session.is_active());
        assert_eq!(
            drain(&mut rxs[0]),
            vec![Outbound::Deliver(GameEvent::Start.into())]
        );
        assert!(drain(&mut rxs[1]).is_empty());
    }

    #[tokio::test]
    async fn start_with_no_players_is_a_no_op() {
        let (wake_tx, _wake_rx) = mpsc::channel(8);
        let mut session = Session::new(0.into(), Vec::new(), Duration::from_secs(60), wake_tx);
        session.start();
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn clean_run_advances_the_number_every_turn() {
        let (mut session, _rxs, _wake) = setup(2);
        session.start();

        session.submit(0.into(), "1");
        assert_eq!(session.current_number, Some(2));

        for k in 2..=10u64 {
            let on_turn = ((k - 1) % 2) as u32;
            session.submit(on_turn.into(), &rules::expected(k));
            assert_eq!(session.current_number, Some(k + 1));
        }
        assert_eq!(session.player_count(), 2);
        assert!(session.is_active());
    }

    #[tokio::test]
    async fn out_of_turn_submission_changes_nothing() {
        let (mut session, mut rxs, _wake) = setup(2);
        session.start();
        let epoch_before = session.epoch;

        session.submit(1.into(), "10");
        assert_eq!(
            drain(&mut rxs[1]),
            vec![Outbound::Deliver(Event::Error("Not your turn!".to_owned()))]
        );
        // The timer and the awaited turn are untouched
        assert_eq!(session.epoch, epoch_before);
        assert!(session.timer.is_some());
        assert_eq!(session.turn_idx, 0);
        assert_eq!(session.current_number, None);
    }

    #[tokio::test]
    async fn malformed_first_move_reprompts_the_same_player() {
        let (mut session, mut rxs, _wake) = setup(2);
        session.start();
        drain(&mut rxs[0]);

        for bad in ["boots", "-3", "0", ""] {
            session.submit(0.into(), bad);
            let events = drain(&mut rxs[0]);
            assert!(
                matches!(events[0], Outbound::Deliver(Event::Error(_))),
                "{bad:?} should produce an error"
            );
            assert_eq!(events[1], Outbound::Deliver(GameEvent::Start.into()));
        }
        assert_eq!(session.player_count(), 2);
        assert_eq!(session.current_number, None);
        assert_eq!(session.turn_idx, 0);
    }

    #[tokio::test]
    async fn wrong_answer_eliminates_only_the_submitter() {
        let (mut session, mut rxs, _wake) = setup(3);
        session.start();
        session.submit(0.into(), "1");
        session.submit(1.into(), "wrong");

        assert_eq!(session.player_count(), 2);
        assert!(!session.players.iter().any(|p| p.id == 1));
        let events = drain(&mut rxs[1]);
        assert!(events.contains(&Outbound::Deliver(GameEvent::Lose.into())));
        assert!(events.contains(&Outbound::Close));

        // The answer was not consumed and the turn passed on
        assert_eq!(session.current_number, Some(2));
        assert!(session.is_active());
        session.submit(2.into(), &rules::expected(2));
        assert_eq!(session.current_number, Some(3));
        // The eliminated player saw none of it
        assert!(drain(&mut rxs[1]).is_empty());
    }

    #[tokio::test]
    async fn last_survivor_wins() {
        let (mut session, mut rxs, _wake) = setup(2);
        session.start();
        session.submit(0.into(), "4");
        // expected(5) is "cats"
        session.submit(1.into(), "5");

        assert!(session.is_ended());
        assert_eq!(session.player_count(), 0);
        assert!(drain(&mut rxs[0]).contains(&Outbound::Deliver(GameEvent::Win.into())));
        assert_eq!(session.into_winner().map(|p| p.id), Some(0.into()));
    }

    #[tokio::test]
    async fn disconnect_of_a_non_current_player_preserves_the_turn() {
        let (mut session, mut rxs, _wake) = setup(3);
        session.start();
        session.submit(0.into(), "1");
        drain(&mut rxs[1]);

        // Removing an index before the turn holder shifts the index but
        // leaves the same player on the clock, with no forced re-prompt
        session.player_left(0.into());
        assert!(session.is_active());
        assert_eq!(session.turn_idx, 0);
        assert_eq!(session.players[session.turn_idx].id, 1);
        assert!(drain(&mut rxs[1]).is_empty());
        // No lose event for a disconnect
        assert!(!drain(&mut rxs[0]).contains(&Outbound::Deliver(GameEvent::Lose.into())));
    }

    #[tokio::test]
    async fn disconnect_of_the_current_player_reprompts_the_next() {
        let (mut session, mut rxs, _wake) = setup(3);
        session.start();
        session.submit(0.into(), "1");
        drain(&mut rxs[2]);

        session.player_left(1.into());
        assert!(session.is_active());
        assert_eq!(session.turn_idx, 1);
        assert_eq!(session.players[session.turn_idx].id, 2);
        assert!(drain(&mut rxs[2]).contains(&Outbound::Deliver(GameEvent::Turn.into())));
    }

    #[tokio::test]
    async fn timeout_eliminates_the_current_player() {
        let (mut session, mut rxs, _wake) = setup(3);
        session.start();
        session.submit(0.into(), "1");
        for rx in rxs.iter_mut() {
            drain(rx);
        }

        session.handle_timeout(session.epoch);

        assert!(!session.players.iter().any(|p| p.id == 1));
        let events = drain(&mut rxs[1]);
        assert!(events.contains(&Outbound::Deliver(GameEvent::Timedout.into())));
        assert!(events.contains(&Outbound::Deliver(GameEvent::Lose.into())));
        assert!(events.contains(&Outbound::Close));

        let record = Outbound::Deliver(Event::Turn(TurnRecord {
            player: 1.into(),
            said: "TIMEOUT".to_owned(),
        }));
        assert!(drain(&mut rxs[0]).contains(&record));
        assert!(drain(&mut rxs[2]).contains(&record));
    }

    #[tokio::test]
    async fn stale_timeout_is_ignored() {
        let (mut session, mut rxs, _wake) = setup(2);
        session.start();
        let stale = session.epoch;
        // Answered in time; the timer now belongs to the next turn
        session.submit(0.into(), "1");
        for rx in rxs.iter_mut() {
            drain(rx);
        }

        session.handle_timeout(stale);

        assert!(session.is_active());
        assert_eq!(session.player_count(), 2);
        assert!(drain(&mut rxs[0]).is_empty());
        assert!(drain(&mut rxs[1]).is_empty());
    }

    #[tokio::test]
    async fn armed_timer_fires_through_the_wake_channel() {
        let (wake_tx, mut wake_rx) = mpsc::channel(8);
        let (p0, mut rx0) = player(0);
        let (p1, mut rx1) = player(1);
        let mut session = Session::new(7.into(), vec![p0, p1], Duration::from_millis(10), wake_tx);
        session.start();

        let fired = timeout(Duration::from_secs(1), wake_rx.recv())
            .await
            .expect("timer never fired")
            .expect("wake channel closed");
        let LobbyAction::TurnTimeout { session: id, epoch } = fired else {
            panic!("Incorrect LobbyAction produced");
        };
        assert_eq!(id, session.id());
        assert_eq!(epoch, session.epoch);

        session.handle_timeout(epoch);
        assert!(session.is_ended());
        assert!(drain(&mut rx0).contains(&Outbound::Close));
        assert!(drain(&mut rx1).contains(&Outbound::Deliver(GameEvent::Win.into())));
    }

    #[tokio::test]
    async fn end_game_is_idempotent() {
        let (mut session, mut rxs, _wake) = setup(2);
        session.start();
        // Opponent disconnects: game over, p0 wins
        session.player_left(1.into());

        assert!(session.is_ended());
        assert!(drain(&mut rxs[0]).contains(&Outbound::Deliver(GameEvent::Win.into())));

        session.end_game();
        assert!(session.is_ended());
        assert!(drain(&mut rxs[0]).is_empty());
        assert_eq!(session.into_winner().map(|p| p.id), Some(0.into()));
    }

    #[tokio::test]
    async fn mid_game_joiner_waits_for_their_turn() {
        let (mut session, mut rxs, _wake) = setup(2);
        session.start();
        session.submit(0.into(), "1");
        for rx in rxs.iter_mut() {
            drain(rx);
        }

        let (joiner, mut joiner_rx) = player(9);
        session.client_joined(joiner);
        assert_eq!(session.player_count(), 3);
        assert_eq!(session.turn_idx, 1);
        // Informational messages only, no prompt yet
        assert!(drain(&mut joiner_rx)
            .iter()
            .all(|m| matches!(m, Outbound::Deliver(Event::Message(_)))));
        // The others hear about the newcomer
        assert!(drain(&mut rxs[0])
            .iter()
            .any(|m| matches!(m, Outbound::Deliver(Event::Message(_)))));

        // The cycle reaches the joiner after the current player moves
        session.submit(1.into(), &rules::expected(2));
        assert_eq!(
            drain(&mut joiner_rx).last(),
            Some(&Outbound::Deliver(GameEvent::Turn.into()))
        );
    }
}
