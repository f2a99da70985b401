use bootscats_lib::net::connection::{self, ConnectionRx, ConnectionTx};
use tokio::net::TcpStream;
use tokio::select;
use tokio::sync::mpsc;
use tracing::instrument;

use crate::lobby::lobby_handle::LobbyHandle;
use crate::player::{Outbound, Player};
use crate::state::{OwnedPlayerId, ServerState};

/// Take a socket for a newly connected client and begin serving it.
pub async fn handle_new_connection(state: ServerState, socket: TcpStream) {
    let player_id = state.add_player();
    let (conn_tx, conn_rx) = connection::from_socket(socket);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let lobby = state.lobby_handle(*player_id);
    lobby.connect(Player::new(*player_id, outbound_tx)).await;
    tracing::info!("New connection for player id {player_id} opened");

    let client = Client {
        player_id,
        conn_tx,
        conn_rx,
        outbound_rx,
        lobby,
    };
    client.run().await;
}

struct Client {
    player_id: OwnedPlayerId,
    conn_tx: ConnectionTx,
    conn_rx: ConnectionRx,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    // Held for its Drop impl, which notifies the lobby of the disconnect.
    lobby: LobbyHandle,
}

impl Client {
    /// Serve the connection until the peer hangs up, the line codec fails, or
    /// the game core asks for this player to be closed.
    ///
    /// Takes ownership of self to guarantee that the client will be dropped
    /// when its message loop ends.
    #[instrument(skip_all, fields(player_id = %self.player_id))]
    async fn run(mut self) {
        loop {
            select! {
                line = self.conn_rx.read_line() => match line {
                    Ok(Some(text)) => self.lobby.line(text.trim().to_owned()).await,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("Error reading line, closing connection\n{e:?}");
                        break;
                    }
                },
                outbound = self.outbound_rx.recv() => match outbound {
                    Some(Outbound::Deliver(event)) => {
                        if self.conn_tx.write_event(&event).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => break,
                },
            }
        }
        tracing::info!("Player disconnected");
    }
}
