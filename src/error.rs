//! Error types for the tic-tac-cube client.

use thiserror::Error;

/// Errors that can occur when using the tic-tac-cube client.
///
/// Variants in the "local validation" group are produced before anything is
/// sent to the server. Their `Display` text is meant to be shown to the user.
#[derive(Debug, Error)]
pub enum CubeError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// Attempted a room operation but the client is not in a room.
    #[error("not in a room")]
    NotInRoom,

    // ── Local validation ────────────────────────────────────────────
    /// Player names must have at least two characters after trimming.
    #[error("name must be at least {min} characters")]
    InvalidPlayerName {
        /// Minimum accepted length, in characters.
        min: usize,
    },

    /// Room codes must be exactly six characters.
    #[error("room code must be exactly {expected} characters, got {found}")]
    InvalidRoomCode {
        /// Required length.
        expected: usize,
        /// Length of the rejected input.
        found: usize,
    },

    /// A board coordinate was outside `[0, 4)`.
    #[error("coordinate ({z}, {y}, {x}) is outside the 4x4x4 board")]
    InvalidCoordinate { z: usize, y: usize, x: usize },

    /// The held snapshot says it is the other seat's turn.
    #[error("it is not your turn")]
    NotYourTurn,

    /// The held snapshot says the game is over.
    #[error("the game is over")]
    GameOver,

    /// Seated, but the server has not pushed a game snapshot yet.
    #[error("no game in progress")]
    NoGame,

    /// A rejoin is still in flight; the held snapshot may be stale.
    #[error("still rejoining the room")]
    Rejoining,

    /// Chat text was empty after trimming.
    #[error("chat message is empty")]
    EmptyChatMessage,

    // ── Server / transport ──────────────────────────────────────────
    /// The server returned an error message.
    #[error("server error: {message}")]
    ServerError {
        /// Human-readable error message from the server.
        message: String,
    },

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CubeError {
    /// Returns `true` for errors raised by client-side validation, before any
    /// network call was attempted.
    pub fn is_local_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidPlayerName { .. }
                | Self::InvalidRoomCode { .. }
                | Self::InvalidCoordinate { .. }
                | Self::NotYourTurn
                | Self::GameOver
                | Self::NoGame
                | Self::Rejoining
                | Self::EmptyChatMessage
                | Self::NotInRoom
        )
    }
}

/// A specialized [`Result`] type for tic-tac-cube client operations.
pub type Result<T> = std::result::Result<T, CubeError>;
