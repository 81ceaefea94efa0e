//! # Terminal Play Example
//!
//! Plays tic-tac-cube against a real room server from the terminal:
//!
//! 1. Connect over WebSocket (reconnecting automatically if the link drops)
//! 2. Rejoin the seat saved in the session file, if there is one
//! 3. Read commands from stdin and redraw the board on every state change
//! 4. Shut down gracefully on `quit`, Ctrl+C or disconnect
//!
//! ## Running
//!
//! ```sh
//! # Start a room server on localhost:5000, then:
//! cargo run --example terminal_play
//!
//! # Override the server URL or the session file:
//! CUBE_SERVER_URL=ws://my-server:5000/ws CUBE_SESSION_FILE=/tmp/me.json \
//!     cargo run --example terminal_play
//! ```
//!
//! ## Commands
//!
//! ```text
//! create <name>          open a room
//! quick [name]           open a room, generating a name if none is given
//! join <code> <name>     join a room by code
//! move <z> <y> <x>       place a mark (each 1-4)
//! reset                  start a new round
//! chat <text>            talk to the other player
//! leave                  leave the room
//! quit                   exit
//! ```

use chrono::Utc;
use tictac_cube_client::{
    render, Coord, CubeClient, CubeConfig, CubeError, CubeEvent, FileSessionStore,
    WebSocketConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Default server URL when `CUBE_SERVER_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:5000/ws";

/// Default session file when `CUBE_SESSION_FILE` is not set.
const DEFAULT_SESSION_FILE: &str = "cube-session.json";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("CUBE_SERVER_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let session_file =
        std::env::var("CUBE_SESSION_FILE").unwrap_or_else(|_| DEFAULT_SESSION_FILE.to_string());
    tracing::info!("Connecting to {url} (session file: {session_file})");

    let (mut client, mut event_rx) = CubeClient::start(
        WebSocketConnector::new(url),
        CubeConfig::new(),
        FileSessionStore::new(session_file),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };
                match event {
                    CubeEvent::StateChanged(state) => {
                        println!("\n{}", render(&state, Utc::now()));
                    }
                    CubeEvent::Reconnecting { attempt, delay } => {
                        tracing::warn!("Reconnecting (attempt {attempt}) in {delay:?}");
                    }
                    CubeEvent::Disconnected { reason } => {
                        tracing::warn!("Disconnected: {}", reason.as_deref().unwrap_or("unknown"));
                        break;
                    }
                    other => tracing::debug!("Event: {other:?}"),
                }
            }

            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("stdin closed, exiting");
                    break;
                };
                match run_command(&client, line.trim()) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => eprintln!("! {e}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down...");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.shutdown().await;
    tracing::info!("Client shut down. Goodbye!");
    Ok(())
}

/// Run one stdin command. Returns `Ok(false)` when the user asked to quit.
fn run_command(client: &CubeClient, line: &str) -> Result<bool, CubeError> {
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match verb {
        "" => {}
        "create" => client.create_game(rest)?,
        "quick" => client.quick_create_game(rest)?,
        "join" => {
            let (code, name) = rest.split_once(' ').unwrap_or((rest, ""));
            client.join_game(code, name)?;
        }
        "move" => match parse_coord(rest) {
            Some(coord) => client.make_move(coord)?,
            None => eprintln!("usage: move <z> <y> <x>   (each 1-4)"),
        },
        "reset" => client.reset_game()?,
        "chat" => client.send_chat(rest)?,
        "leave" => client.leave_game()?,
        "quit" | "exit" => return Ok(false),
        other => eprintln!("unknown command `{other}`"),
    }
    Ok(true)
}

/// Parse one-based `z y x` as typed by a player.
fn parse_coord(input: &str) -> Option<Coord> {
    let axes: Vec<usize> = input
        .split_whitespace()
        .map(|s| s.parse::<usize>().ok()?.checked_sub(1))
        .collect::<Option<_>>()?;
    let [z, y, x] = axes.as_slice() else {
        return None;
    };
    Coord::new(*z, *y, *x).ok()
}
