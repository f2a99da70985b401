use bootscats_lib::net::Event;
use bootscats_lib::PlayerId;
use tokio::sync::mpsc;

/// Instruction for a player's connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write one event to the peer.
    Deliver(Event),
    /// Flush whatever was queued before this and close the connection.
    Close,
}

/// A connected player as the game core sees them: an identity plus the
/// capability to deliver events and to request a disconnect. The socket
/// itself stays with the connection task.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Player {
    pub fn new(id: PlayerId, outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { id, outbound }
    }

    /// Fire-and-forget delivery. A closed channel means the connection task
    /// is already gone; the pending disconnect notification will clean up.
    pub fn send(&self, event: Event) {
        let _ = self.outbound.send(Outbound::Deliver(event));
    }

    /// Ask the transport to close this player's connection.
    pub fn kick(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}
