//! # Loopback Server Example
//!
//! Shows how to implement [`Transport`] and [`Connector`] over in-process
//! channels, and plays a short game against a toy server running in the same
//! process. This is useful for:
//!
//! - **Testing**: exercise game logic without a real server
//! - **Custom backends**: adapt any I/O layer (TCP, QUIC, a relay)
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_server --no-default-features
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tictac_cube_client::protocol::{GameOverPayload, PlayerEntry, BOARD_SIZE};
use tictac_cube_client::{
    render, Cell, ClientMessage, Connector, Coord, CubeClient, CubeConfig, CubeError,
    GameState, MemorySessionStore, Phase, RoomCode, Seat, ServerMessage, SessionState, Transport,
};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-based transport
// ─────────────────────────────────────────────────────────────────────

/// The client half of a loopback connection.
pub struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// The server half: read what the client sent, push frames back.
pub struct LoopbackServer {
    pub rx: mpsc::UnboundedReceiver<String>,
    pub tx: mpsc::UnboundedSender<String>,
}

fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        },
        LoopbackServer {
            rx: server_rx,
            tx: server_tx,
        },
    )
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), CubeError> {
        self.tx
            .send(message)
            .map_err(|e| CubeError::TransportSend(e.to_string()))
    }

    /// Cancel-safe because `UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<String, CubeError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), CubeError> {
        self.rx.close();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A connector that spawns a fresh toy server per connection
// ─────────────────────────────────────────────────────────────────────

struct LoopbackConnector;

#[async_trait]
impl Connector for LoopbackConnector {
    type Transport = LoopbackTransport;

    async fn connect(&mut self) -> Result<LoopbackTransport, CubeError> {
        let (transport, server) = loopback_pair();
        tokio::spawn(toy_server(server));
        Ok(transport)
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: The toy server
// ─────────────────────────────────────────────────────────────────────

/// Seats the client first, lets a bot take the second seat, and answers each
/// move with the bot's move into the first free cell. The first complete
/// `x` row wins; no other lines are checked.
async fn toy_server(mut server: LoopbackServer) {
    let push = |msg: ServerMessage| match serde_json::to_string(&msg) {
        Ok(text) => {
            let _ = server.tx.send(text);
        }
        Err(e) => tracing::error!("toy server: cannot encode {}: {e}", msg.event_name()),
    };

    push(ServerMessage::Connected {
        message: "Connected to loopback server".into(),
    });

    let Ok(room) = RoomCode::parse("LOOP01") else {
        return;
    };
    let mut game = GameState::default();

    while let Some(text) = server.rx.recv().await {
        let msg = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("toy server: bad frame: {e}");
                continue;
            }
        };
        tracing::info!("toy server received {}", msg.event_name());

        match msg {
            ClientMessage::CreateGame { player_name } => {
                game.players = vec![PlayerEntry {
                    name: player_name.clone(),
                    number: Seat::First,
                }];
                push(ServerMessage::GameCreated {
                    room: room.clone(),
                    game_state: game.clone(),
                    player_name: Some(player_name),
                    player_number: Some(Seat::First),
                });
                game.players.push(PlayerEntry {
                    name: "Bot".into(),
                    number: Seat::Second,
                });
                push(ServerMessage::PlayerJoinedAll {
                    player_name: "Bot".into(),
                    game_state: Some(game.clone()),
                    player_number: Some(Seat::Second),
                });
            }
            ClientMessage::MakeMove { z, y, x } => {
                let Ok(coord) = Coord::new(z.into(), y.into(), x.into()) else {
                    continue;
                };
                if let Some(over) = play(&mut game, Seat::First, coord) {
                    push(over);
                    continue;
                }
                push(move_made(&game, Seat::First, coord));

                let Some(reply) = first_free(&game) else {
                    continue;
                };
                match play(&mut game, Seat::Second, reply) {
                    Some(over) => push(over),
                    None => push(move_made(&game, Seat::Second, reply)),
                }
            }
            ClientMessage::ChatMessage { message, .. } => {
                push(ServerMessage::ChatMessage {
                    message: format!("you said: {message}"),
                    player_name: "Bot".into(),
                });
            }
            other => {
                push(ServerMessage::Error {
                    message: format!("{} is not supported here", other.event_name()),
                });
            }
        }
    }
}

fn move_made(game: &GameState, player: Seat, at: Coord) -> ServerMessage {
    let [z, y, x]: [u8; 3] = at.into();
    ServerMessage::MoveMade {
        game_state: game.clone(),
        player,
        z,
        y,
        x,
    }
}

fn first_free(game: &GameState) -> Option<Coord> {
    (0..BOARD_SIZE)
        .flat_map(|z| (0..BOARD_SIZE).flat_map(move |y| (0..BOARD_SIZE).map(move |x| (z, y, x))))
        .filter_map(|(z, y, x)| Coord::new(z, y, x).ok())
        .find(|c| game.cell(*c) == Cell::Empty)
}

/// Apply a move; returns the `game_over` frame if it completed a row.
fn play(game: &mut GameState, seat: Seat, at: Coord) -> Option<ServerMessage> {
    if let Some(cell) = game
        .board
        .get_mut(at.z())
        .and_then(|layer| layer.get_mut(at.y()))
        .and_then(|row| row.get_mut(at.x()))
    {
        *cell = Cell::from(seat);
    }
    game.current_player = seat.opponent();

    let row: Vec<Coord> = (0..BOARD_SIZE)
        .filter_map(|x| Coord::new(at.z(), at.y(), x).ok())
        .collect();
    if !row.iter().all(|c| game.cell(*c) == Cell::from(seat)) {
        return None;
    }

    game.game_over = true;
    game.winner = Some(seat);
    game.winning_cells = row.clone();
    let winner_name = game.player_name(seat).unwrap_or("?").to_string();
    Some(ServerMessage::GameOver(Box::new(GameOverPayload {
        game_state: game.clone(),
        winner: seat,
        winner_name: winner_name.clone(),
        winning_cells: row,
        message: Some(format!("{winner_name} wins!")),
        is_draw: false,
        round: None,
    })))
}

// ─────────────────────────────────────────────────────────────────────
// Step 4: Play
// ─────────────────────────────────────────────────────────────────────

async fn wait_until(
    client: &CubeClient,
    predicate: impl FnMut(&SessionState) -> bool,
) -> Result<SessionState, Box<dyn std::error::Error>> {
    let mut rx = client.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await??
        .clone();
    Ok(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (mut client, _event_rx) =
        CubeClient::start(LoopbackConnector, CubeConfig::new(), MemorySessionStore::new());

    wait_until(&client, |s| s.connected).await?;
    client.create_game("Ann")?;
    wait_until(&client, |s| s.phase == Phase::Active).await?;
    client.send_chat("good luck!")?;

    // Ann fills the last row of the top layer while the bot trails her by
    // one move in the first row of the bottom layer.
    for x in 0..BOARD_SIZE {
        let state = wait_until(&client, |s| {
            s.is_my_turn() || s.snapshot.as_ref().is_some_and(|g| g.game_over)
        })
        .await?;
        println!("\n{}", render(&state, Utc::now()));
        if let Err(e) = client.make_move(Coord::new(3, 3, x)?) {
            tracing::info!("move refused locally: {e}");
            break;
        }
    }

    let state = wait_until(&client, |s| {
        s.snapshot.as_ref().is_some_and(|g| g.game_over)
    })
    .await?;
    println!("\n{}", render(&state, Utc::now()));

    client.shutdown().await;
    Ok(())
}
