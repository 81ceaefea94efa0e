//! # Tic-Tac-Cube Client
//!
//! Transport-agnostic async client for networked 4×4×4 tic-tac-toe rooms.
//!
//! The server is authoritative: it owns the board, validates moves and
//! detects wins. This crate mirrors what the server pushes into a
//! [`SessionState`], keeps the (room, seat) pair in a [`SessionStore`] so a
//! dropped connection can rejoin its seat, and projects the state into a
//! [`View`] for whatever front end is drawing it.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any backend
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   `WebSocketTransport` and `WebSocketConnector`
//! - **Pure core**: [`reduce`] and [`render`] are deterministic functions,
//!   testable without a network
//! - **Automatic rejoin**: bounded reconnects with [`ReconnectPolicy`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), tictac_cube_client::CubeError> {
//! use tictac_cube_client::{
//!     render, CubeClient, CubeConfig, CubeEvent, FileSessionStore, WebSocketConnector,
//! };
//!
//! let (client, mut events) = CubeClient::start(
//!     WebSocketConnector::new("ws://localhost:5000/ws"),
//!     CubeConfig::new(),
//!     FileSessionStore::new("cube-session.json"),
//! );
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         CubeEvent::Connected if client.current_room().is_none() => {
//!             client.join_game("ab12cd", "Bob")?;
//!         }
//!         CubeEvent::StateChanged(state) => {
//!             println!("{}", render(&state, chrono::Utc::now()));
//!         }
//!         CubeEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod chat;
pub mod client;
pub mod error;
pub mod event;
pub mod protocol;
pub mod reconnect;
pub mod render;
pub mod session;
pub mod state;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use chat::{ChatEntry, ChatLog, ChatOrigin};
pub use client::{CubeClient, CubeConfig};
pub use error::{CubeError, Result};
pub use event::CubeEvent;
pub use protocol::{Cell, ClientMessage, Coord, GameState, Seat, ServerMessage};
pub use reconnect::ReconnectPolicy;
pub use render::{render, View};
pub use session::{
    validate_player_name, FileSessionStore, MemorySessionStore, RoomCode, Session, SessionStore,
};
pub use state::{reduce, Action, Effect, Phase, SessionState, Transition};
pub use transport::{Connector, Preconnected, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
