#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for tic-tac-cube client integration tests.
//!
//! Provides a scripted [`MockTransport`], a [`MockConnector`] that hands out
//! scripted transports (or failures) per connection attempt, and builders for
//! server frames in the shape the room server sends them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tictac_cube_client::{
    ClientMessage, Connector, CubeClient, CubeError, CubeEvent, SessionState, Transport,
};
use tokio::sync::mpsc;

// ── MockTransport ───────────────────────────────────────────────────

/// One scripted `recv` result. `None` is a clean close by the server.
pub type Scripted = Option<Result<String, CubeError>>;

/// Replays scripted frames in order, records everything sent, then pends
/// forever so the connection stays open until shutdown.
pub struct MockTransport {
    incoming: VecDeque<Scripted>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(incoming: Vec<Scripted>) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }

    /// A transport that delivers `frames` and then stays open.
    pub fn with_frames(frames: Vec<String>) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        Self::new(frames.into_iter().map(|f| Some(Ok(f))).collect())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), CubeError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, CubeError>> {
        match self.incoming.pop_front() {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), CubeError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── LiveTransport ───────────────────────────────────────────────────

/// A transport whose inbound frames are pushed by the test through a
/// [`ServerSide`] handle, so requests and replies can be interleaved.
pub struct LiveTransport {
    rx: mpsc::UnboundedReceiver<Scripted>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

/// The test's end of a [`LiveTransport`].
pub struct ServerSide {
    tx: mpsc::UnboundedSender<Scripted>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl ServerSide {
    pub fn push(&self, frame: String) {
        let _ = self.tx.send(Some(Ok(frame)));
    }

    /// Close the connection from the server side.
    pub fn hang_up(&self) {
        let _ = self.tx.send(None);
    }

    /// Fail the next `recv` with a transport error.
    pub fn fail(&self, reason: &str) {
        let _ = self.tx.send(Some(Err(CubeError::TransportReceive(reason.into()))));
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

pub fn live_transport() -> (LiveTransport, ServerSide) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sent = Arc::new(StdMutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    let transport = LiveTransport {
        rx,
        sent: Arc::clone(&sent),
        closed: Arc::clone(&closed),
    };
    (transport, ServerSide { tx, sent, closed })
}

#[async_trait]
impl Transport for LiveTransport {
    async fn send(&mut self, message: String) -> Result<(), CubeError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(CubeError::TransportClosed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, CubeError>> {
        match self.rx.recv().await {
            Some(item) => item,
            // Test dropped its handle: treat as still open.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), CubeError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Result of one scripted connection attempt.
pub enum Attempt {
    Open(Box<dyn Transport>),
    Refuse(String),
}

impl Attempt {
    pub fn open(transport: impl Transport) -> Self {
        Self::Open(Box::new(transport))
    }
}

/// Hands out one scripted [`Attempt`] per `connect` call. Once the script is
/// exhausted every call is refused.
pub struct MockConnector {
    script: VecDeque<Attempt>,
    delay: Duration,
    pub calls: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(script: Vec<Attempt>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let connector = Self {
            script: VecDeque::from(script),
            delay: Duration::ZERO,
            calls: Arc::clone(&calls),
        };
        (connector, calls)
    }

    /// Make every attempt take `delay` before it settles, like a slow handshake.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = Box<dyn Transport>;

    async fn connect(&mut self) -> Result<Box<dyn Transport>, CubeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.script.pop_front() {
            Some(Attempt::Open(transport)) => Ok(transport),
            Some(Attempt::Refuse(reason)) => Err(CubeError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                reason,
            ))),
            None => Err(CubeError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "no more scripted connections",
            ))),
        }
    }
}

// ── Logging ─────────────────────────────────────────────────────────

/// Route library `tracing` output through the test harness. Set `RUST_LOG`
/// to see it; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// ── Waiting helpers ─────────────────────────────────────────────────

/// Wait (up to two seconds) until the published state satisfies `predicate`.
pub async fn wait_for_state(
    client: &CubeClient,
    predicate: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    let mut rx = client.subscribe();
    let state = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
        .await
        .expect("state predicate not met in time")
        .expect("state channel closed")
        .clone();
    state
}

/// Receive events until one matches `predicate`, returning it.
pub async fn next_matching(
    events: &mut mpsc::Receiver<CubeEvent>,
    mut predicate: impl FnMut(&CubeEvent) -> bool,
) -> CubeEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event did not arrive in time")
}

/// Wait until `sent` holds at least `n` frames and return them decoded.
pub async fn wait_for_sent(sent: &Arc<StdMutex<Vec<String>>>, n: usize) -> Vec<ClientMessage> {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            {
                let frames = sent.lock().unwrap();
                if frames.len() >= n {
                    return frames
                        .iter()
                        .map(|f| serde_json::from_str(f).expect("client frame decodes"))
                        .collect();
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("expected frames were not sent in time")
}

// ── Server frame builders ───────────────────────────────────────────

/// `{"event": ..., "data": ...}` as a string.
pub fn frame(event: &str, data: Value) -> String {
    json!({ "event": event, "data": data }).to_string()
}

/// An empty 4x4x4 board with `marks` applied as `([z, y, x], value)`.
pub fn board(marks: &[([usize; 3], i8)]) -> Value {
    let mut cells = vec![vec![vec![0i8; 4]; 4]; 4];
    for ([z, y, x], value) in marks {
        cells[*z][*y][*x] = *value;
    }
    json!(cells)
}

/// A snapshot in the server's shape. Roster entries carry an extra `sid`
/// field the client must ignore.
pub fn snapshot(current_player: u8, players: &[(&str, u8)], marks: &[([usize; 3], i8)]) -> Value {
    let roster: Vec<Value> = players
        .iter()
        .map(|(name, number)| json!({ "name": name, "number": number, "sid": format!("sid-{number}") }))
        .collect();
    json!({
        "board": board(marks),
        "current_player": current_player,
        "players": roster,
        "winner": null,
        "game_over": false,
        "winning_cells": [],
    })
}

/// A finished snapshot won by `winner` along `cells`.
pub fn finished_snapshot(winner: u8, players: &[(&str, u8)], cells: &[[u8; 3]]) -> Value {
    let mark = if winner == 0 { -1 } else { 1 };
    let marks: Vec<([usize; 3], i8)> = cells
        .iter()
        .map(|[z, y, x]| ([*z as usize, *y as usize, *x as usize], mark))
        .collect();
    let mut state = snapshot(winner, players, &marks);
    state["winner"] = json!(winner);
    state["game_over"] = json!(true);
    state["winning_cells"] = json!(cells);
    state
}

pub fn connected_frame() -> String {
    frame("connected", json!({ "message": "Connected to server" }))
}

pub fn game_created_frame(room: &str, name: &str) -> String {
    frame(
        "game_created",
        json!({
            "room": room,
            "player_name": name,
            "game_state": snapshot(0, &[(name, 0)], &[]),
        }),
    )
}

pub fn joined_self_frame(room: &str, seat: u8, players: &[(&str, u8)]) -> String {
    frame(
        "player_joined_self",
        json!({
            "player_number": seat,
            "room": room,
            "game_state": snapshot(0, players, &[]),
        }),
    )
}

pub fn joined_all_frame(name: &str, players: &[(&str, u8)]) -> String {
    frame(
        "player_joined_all",
        json!({
            "player_name": name,
            "player_number": 1,
            "game_state": snapshot(0, players, &[]),
        }),
    )
}

pub fn rejoin_ok_frame(room: &str, seat: u8, players: &[(&str, u8)]) -> String {
    frame(
        "rejoin_game_response",
        json!({
            "success": true,
            "room": room,
            "player_number": seat,
            "game_state": snapshot(0, players, &[]),
        }),
    )
}

pub fn rejoin_failed_frame(message: &str) -> String {
    frame(
        "rejoin_game_response",
        json!({ "success": false, "message": message }),
    )
}

pub fn move_made_frame(
    player: u8,
    at: [usize; 3],
    next: u8,
    players: &[(&str, u8)],
) -> String {
    let mark = if player == 0 { -1 } else { 1 };
    frame(
        "move_made",
        json!({
            "game_state": snapshot(next, players, &[(at, mark)]),
            "player": player,
            "z": at[0],
            "y": at[1],
            "x": at[2],
        }),
    )
}

pub fn game_over_frame(winner: u8, winner_name: &str, cells: &[[u8; 3]], players: &[(&str, u8)]) -> String {
    frame(
        "game_over",
        json!({
            "game_state": finished_snapshot(winner, players, cells),
            "winner": winner,
            "winner_name": winner_name,
            "winning_cells": cells,
            "message": format!("{winner_name} wins!"),
            "is_draw": false,
        }),
    )
}

pub fn game_draw_frame(players: &[(&str, u8)]) -> String {
    let mut state = snapshot(0, players, &[]);
    state["game_over"] = json!(true);
    frame(
        "game_draw",
        json!({ "game_state": state, "message": "Draw! Nobody wins." }),
    )
}

pub fn game_reset_frame(players: &[(&str, u8)]) -> String {
    frame(
        "game_reset",
        json!({ "game_state": snapshot(0, players, &[]), "message": "Game reset" }),
    )
}

pub fn player_left_frame(name: &str, seat: u8) -> String {
    frame(
        "player_left",
        json!({ "player_name": name, "player_number": seat }),
    )
}

pub fn player_reconnected_frame(seat: u8) -> String {
    frame("player_reconnected", json!({ "player_number": seat }))
}

pub fn chat_frame(name: &str, text: &str) -> String {
    frame(
        "chat_message",
        json!({ "message": text, "player_name": name }),
    )
}

pub fn error_frame(message: &str) -> String {
    frame("error", json!({ "message": message }))
}
