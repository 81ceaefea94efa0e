//! Wire-compatible protocol types for the tic-tac-cube room server.
//!
//! Every frame is a JSON text message, adjacently tagged as
//! `{"event": "<name>", "data": { ... }}`. Integer encodings are enforced at
//! the serde boundary:
//!
//! - seats: `0` = [`Seat::First`], `1` = [`Seat::Second`]
//! - cells: `0` = empty, `-1` = first seat's mark, `1` = second seat's mark
//! - coordinates: `[z, y, x]`, each in `0..4`

use serde::{Deserialize, Serialize};

use crate::session::RoomCode;

/// Edge length of the cubic board.
pub const BOARD_SIZE: usize = 4;

// ── Seats and cells ─────────────────────────────────────────────────

/// A player's fixed position in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Seat {
    /// Moves first, plays `X`.
    #[default]
    First,
    /// Moves second, plays `O`.
    Second,
}

impl Seat {
    /// Wire number of this seat.
    pub fn number(self) -> u8 {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }

    /// The other seat.
    pub fn opponent(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }

    /// Board symbol for this seat.
    pub fn symbol(self) -> char {
        match self {
            Self::First => 'X',
            Self::Second => 'O',
        }
    }

    /// Default display label, e.g. `Player 1 (X)`.
    pub fn label(self) -> String {
        format!("Player {} ({})", self.number() + 1, self.symbol())
    }
}

impl TryFrom<u8> for Seat {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::First),
            1 => Ok(Self::Second),
            other => Err(format!("invalid seat number {other}, expected 0 or 1")),
        }
    }
}

impl From<Seat> for u8 {
    fn from(seat: Seat) -> Self {
        seat.number()
    }
}

/// The mark held by one board cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Cell {
    #[default]
    Empty,
    First,
    Second,
}

impl Cell {
    /// The seat owning this cell, if any.
    pub fn owner(self) -> Option<Seat> {
        match self {
            Self::Empty => None,
            Self::First => Some(Seat::First),
            Self::Second => Some(Seat::Second),
        }
    }
}

impl From<Seat> for Cell {
    fn from(seat: Seat) -> Self {
        match seat {
            Seat::First => Self::First,
            Seat::Second => Self::Second,
        }
    }
}

impl TryFrom<i8> for Cell {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Empty),
            -1 => Ok(Self::First),
            1 => Ok(Self::Second),
            other => Err(format!("invalid cell value {other}, expected -1, 0 or 1")),
        }
    }
}

impl From<Cell> for i8 {
    fn from(cell: Cell) -> Self {
        match cell {
            Cell::Empty => 0,
            Cell::First => -1,
            Cell::Second => 1,
        }
    }
}

/// The 4×4×4 board, indexed `[z][y][x]`.
pub type Board = [[[Cell; BOARD_SIZE]; BOARD_SIZE]; BOARD_SIZE];

// ── Coordinates ─────────────────────────────────────────────────────

/// A validated board position. Serialized as `[z, y, x]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[u8; 3]", into = "[u8; 3]")]
pub struct Coord {
    z: u8,
    y: u8,
    x: u8,
}

impl Coord {
    /// Build a coordinate, rejecting any axis outside `0..4`.
    ///
    /// # Errors
    ///
    /// Returns [`CubeError::InvalidCoordinate`](crate::CubeError::InvalidCoordinate)
    /// when any axis is out of range.
    pub fn new(z: usize, y: usize, x: usize) -> crate::error::Result<Self> {
        let in_range = |v: usize| v < BOARD_SIZE;
        if !(in_range(z) && in_range(y) && in_range(x)) {
            return Err(crate::error::CubeError::InvalidCoordinate { z, y, x });
        }
        // Each axis is < 4, so the narrowing casts are lossless.
        Ok(Self {
            z: z as u8,
            y: y as u8,
            x: x as u8,
        })
    }

    pub fn z(self) -> usize {
        usize::from(self.z)
    }

    pub fn y(self) -> usize {
        usize::from(self.y)
    }

    pub fn x(self) -> usize {
        usize::from(self.x)
    }

    /// Row-major index into a flattened 64-cell board.
    pub fn flat_index(self) -> usize {
        self.z() * BOARD_SIZE * BOARD_SIZE + self.y() * BOARD_SIZE + self.x()
    }
}

impl TryFrom<[u8; 3]> for Coord {
    type Error = String;

    fn try_from([z, y, x]: [u8; 3]) -> Result<Self, Self::Error> {
        Self::new(z.into(), y.into(), x.into()).map_err(|e| e.to_string())
    }
}

impl From<Coord> for [u8; 3] {
    fn from(c: Coord) -> Self {
        [c.z, c.y, c.x]
    }
}

impl std::fmt::Display for Coord {
    /// One-based `(z,y,x)`, as shown to players.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{},{})", self.z() + 1, self.y() + 1, self.x() + 1)
    }
}

// ── Snapshot ────────────────────────────────────────────────────────

/// A seated player as listed in the snapshot roster.
///
/// The server may include bookkeeping fields (socket ids); they are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub name: String,
    pub number: Seat,
}

/// The authoritative server-pushed game state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameState {
    pub board: Board,
    pub current_player: Seat,
    #[serde(default)]
    pub players: Vec<PlayerEntry>,
    #[serde(default)]
    pub winner: Option<Seat>,
    pub game_over: bool,
    #[serde(default)]
    pub winning_cells: Vec<Coord>,
}

impl GameState {
    /// Mark at `coord`.
    pub fn cell(&self, coord: Coord) -> Cell {
        self.board
            .get(coord.z())
            .and_then(|layer| layer.get(coord.y()))
            .and_then(|row| row.get(coord.x()))
            .copied()
            .unwrap_or_default()
    }

    /// `true` when the game is still running and `seat` is to move.
    pub fn is_turn_of(&self, seat: Seat) -> bool {
        !self.game_over && self.current_player == seat
    }

    /// Display name of the player in `seat`, if that seat is taken.
    pub fn player_name(&self, seat: Seat) -> Option<&str> {
        self.players
            .iter()
            .find(|p| p.number == seat)
            .map(|p| p.name.as_str())
    }
}

// ── Payload structs ─────────────────────────────────────────────────

/// Payload for the `rejoin_game_response` server message.
/// Boxed in `ServerMessage` to reduce enum size.
///
/// On failure only `success` (and usually `message`) are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejoinResponsePayload {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_number: Option<Seat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_state: Option<GameState>,
    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload for the `game_over` server message.
/// Boxed in `ServerMessage` to reduce enum size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameOverPayload {
    pub game_state: GameState,
    pub winner: Seat,
    pub winner_name: String,
    pub winning_cells: Vec<Coord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub is_draw: bool,
    /// Match identifier used to apply the result at most once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u64>,
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a new room; the sender takes the first seat.
    CreateGame { player_name: String },
    /// Take the second seat of an existing room.
    JoinGame { room: RoomCode, player_name: String },
    /// Resume a persisted session after reconnecting.
    RejoinGame { room: RoomCode, player_number: Seat },
    /// Place the sender's mark.
    MakeMove { z: u8, y: u8, x: u8 },
    /// Ask the server to start a new round once the current one is over.
    ResetGame {},
    /// Send chat text to the room.
    ChatMessage { message: String, room: RoomCode },
}

impl ClientMessage {
    /// Build a `make_move` request from a validated coordinate.
    pub fn make_move(coord: Coord) -> Self {
        let [z, y, x]: [u8; 3] = coord.into();
        Self::MakeMove { z, y, x }
    }

    /// Wire event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::CreateGame { .. } => "create_game",
            Self::JoinGame { .. } => "join_game",
            Self::RejoinGame { .. } => "rejoin_game",
            Self::MakeMove { .. } => "make_move",
            Self::ResetGame {} => "reset_game",
            Self::ChatMessage { .. } => "chat_message",
        }
    }
}

/// Message types sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Greeting sent after the socket is accepted.
    Connected {
        #[serde(default)]
        message: String,
    },
    /// Room created; the receiver holds the first seat.
    GameCreated {
        room: RoomCode,
        game_state: GameState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_number: Option<Seat>,
    },
    /// The receiver joined a room.
    PlayerJoinedSelf {
        player_number: Seat,
        room: RoomCode,
        game_state: GameState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_name: Option<String>,
    },
    /// Another player joined the receiver's room.
    PlayerJoinedAll {
        player_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        game_state: Option<GameState>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_number: Option<Seat>,
    },
    /// Answer to `rejoin_game` (boxed to reduce enum size).
    RejoinGameResponse(Box<RejoinResponsePayload>),
    /// A player disconnected from the room.
    PlayerLeft {
        player_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_number: Option<Seat>,
    },
    /// A move was accepted; the game continues.
    MoveMade {
        game_state: GameState,
        player: Seat,
        z: u8,
        y: u8,
        x: u8,
    },
    /// A move completed a line (boxed to reduce enum size).
    GameOver(Box<GameOverPayload>),
    /// The board filled up without a winner.
    GameDraw {
        game_state: GameState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        round: Option<u64>,
    },
    /// A new round started.
    GameReset {
        game_state: GameState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        round: Option<u64>,
    },
    /// The opponent resumed their session.
    PlayerReconnected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_number: Option<Seat>,
    },
    /// Chat text from the opponent.
    ChatMessage {
        message: String,
        player_name: String,
    },
    /// Domain error reported by the server.
    Error { message: String },
}

impl ServerMessage {
    /// Wire event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::GameCreated { .. } => "game_created",
            Self::PlayerJoinedSelf { .. } => "player_joined_self",
            Self::PlayerJoinedAll { .. } => "player_joined_all",
            Self::RejoinGameResponse(_) => "rejoin_game_response",
            Self::PlayerLeft { .. } => "player_left",
            Self::MoveMade { .. } => "move_made",
            Self::GameOver(_) => "game_over",
            Self::GameDraw { .. } => "game_draw",
            Self::GameReset { .. } => "game_reset",
            Self::PlayerReconnected { .. } => "player_reconnected",
            Self::ChatMessage { .. } => "chat_message",
            Self::Error { .. } => "error",
        }
    }

    /// The snapshot carried by this message, if it is state-bearing.
    pub fn game_state(&self) -> Option<&GameState> {
        match self {
            Self::GameCreated { game_state, .. }
            | Self::PlayerJoinedSelf { game_state, .. }
            | Self::MoveMade { game_state, .. }
            | Self::GameDraw { game_state, .. }
            | Self::GameReset { game_state, .. } => Some(game_state),
            Self::GameOver(payload) => Some(&payload.game_state),
            Self::PlayerJoinedAll { game_state, .. } => game_state.as_ref(),
            Self::RejoinGameResponse(payload) => payload.game_state.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn seat_rejects_unknown_numbers() {
        assert!(serde_json::from_str::<Seat>("2").is_err());
        assert_eq!(serde_json::from_str::<Seat>("1").unwrap(), Seat::Second);
    }

    #[test]
    fn cell_uses_signed_encoding() {
        assert_eq!(serde_json::to_string(&Cell::First).unwrap(), "-1");
        assert_eq!(serde_json::to_string(&Cell::Second).unwrap(), "1");
        assert!(serde_json::from_str::<Cell>("2").is_err());
    }

    #[test]
    fn coord_rejects_out_of_range_axis() {
        assert!(Coord::new(0, 4, 0).is_err());
        assert!(serde_json::from_str::<Coord>("[0,0,4]").is_err());
        let c: Coord = serde_json::from_str("[3,2,1]").unwrap();
        assert_eq!((c.z(), c.y(), c.x()), (3, 2, 1));
        assert_eq!(c.flat_index(), 3 * 16 + 2 * 4 + 1);
    }

    #[test]
    fn coord_displays_one_based() {
        let c = Coord::new(0, 1, 3).unwrap();
        assert_eq!(c.to_string(), "(1,2,4)");
    }

    #[test]
    fn game_state_reads_cells_and_names() {
        let mut state = GameState::default();
        state.board[1][2][3] = Cell::Second;
        state.players.push(PlayerEntry {
            name: "Ann".into(),
            number: Seat::First,
        });
        assert_eq!(state.cell(Coord::new(1, 2, 3).unwrap()), Cell::Second);
        assert_eq!(state.player_name(Seat::First), Some("Ann"));
        assert_eq!(state.player_name(Seat::Second), None);
        assert!(state.is_turn_of(Seat::First));
        state.game_over = true;
        assert!(!state.is_turn_of(Seat::First));
    }

    #[test]
    fn reset_game_serializes_empty_data() {
        let json = serde_json::to_value(ClientMessage::ResetGame {}).unwrap();
        assert_eq!(json, serde_json::json!({"event": "reset_game", "data": {}}));
    }
}
