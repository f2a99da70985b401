mod client;
mod lobby;
mod player;
mod session;
mod state;

use std::time::Duration;

use state::ServerState;
use tokio::net::TcpListener;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_PORT: u16 = 7535;
const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    tracing::info!("Server Version: {}", crate::VERSION);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let turn_timeout = std::env::var("TURN_TIMEOUT_SECS")
        .ok()
        .and_then(|t| t.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TURN_TIMEOUT);

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!("Listening on port {port}");

    let state = ServerState::new(turn_timeout);
    loop {
        let (socket, _) = listener.accept().await?;

        tokio::spawn(client::handle_new_connection(state.clone(), socket));
    }
}
