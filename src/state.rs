//! Client-side session state and the reducer that advances it.
//!
//! [`SessionState`] is the whole of what the client knows: which room and
//! seat it holds, the last snapshot the server pushed, the chat cache, the
//! running score and the latest user-facing notice. It is only ever advanced
//! by [`reduce`], which is pure: given the same state, action and clock value
//! it always produces the same [`Transition`]. Side effects (sending frames,
//! touching the session store) are returned as [`Effect`]s for the caller to
//! run.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::chat::{ChatLog, ChatOrigin};
use crate::error::{CubeError, Result};
use crate::protocol::{ClientMessage, Coord, GameOverPayload, GameState, RejoinResponsePayload, Seat};
use crate::session::{RoomCode, Session};

/// How long an info notice stays visible.
pub const NOTICE_TTL: TimeDelta = TimeDelta::seconds(4);

// ── Phase ───────────────────────────────────────────────────────────

/// Where the client is in the room lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No room; waiting for the user to create or join one.
    #[default]
    Lobby,
    /// A `rejoin_game` request is in flight.
    AwaitingRejoin,
    /// Seated in a room.
    Active,
}

// ── Notices ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// The latest transient message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Notice {
    /// Info notices fade after [`NOTICE_TTL`]; errors stay until replaced.
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        match self.level {
            NoticeLevel::Error => true,
            NoticeLevel::Info => now.signed_duration_since(self.at) < NOTICE_TTL,
        }
    }
}

// ── Scoreboard ──────────────────────────────────────────────────────

/// Running win/draw counters.
///
/// Each result is applied at most once per round key, so a duplicated
/// `game_over` or `game_draw` delivery does not double count. The key is the
/// server's `round` field when present, otherwise a local counter advanced on
/// every `game_reset`. Keys are only compared within one room: taking a new
/// seat starts a fresh match.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scoreboard {
    pub first_wins: u32,
    pub second_wins: u32,
    pub draws: u32,
    round: u64,
    last_scored: Option<u64>,
}

impl Scoreboard {
    pub fn wins(&self, seat: Seat) -> u32 {
        match seat {
            Seat::First => self.first_wins,
            Seat::Second => self.second_wins,
        }
    }

    /// Current round key.
    pub fn round(&self) -> u64 {
        self.round
    }

    fn claim(&mut self, server_round: Option<u64>) -> bool {
        let key = server_round.unwrap_or(self.round);
        if self.last_scored == Some(key) {
            return false;
        }
        self.last_scored = Some(key);
        true
    }

    /// Count a win; returns `false` if this round was already scored.
    pub fn record_win(&mut self, seat: Seat, server_round: Option<u64>) -> bool {
        if !self.claim(server_round) {
            return false;
        }
        match seat {
            Seat::First => self.first_wins += 1,
            Seat::Second => self.second_wins += 1,
        }
        true
    }

    /// Count a draw; returns `false` if this round was already scored.
    pub fn record_draw(&mut self, server_round: Option<u64>) -> bool {
        if !self.claim(server_round) {
            return false;
        }
        self.draws += 1;
        true
    }

    fn next_round(&mut self, server_round: Option<u64>) {
        self.round = server_round.unwrap_or(self.round + 1);
    }

    /// Forget the scored key when moving to another room or seat. Totals stay.
    fn new_match(&mut self) {
        self.round = 0;
        self.last_scored = None;
    }
}

// ── State ───────────────────────────────────────────────────────────

/// Everything the client knows, replaced wholesale on every transition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub phase: Phase,
    /// Whether a transport is currently up.
    pub connected: bool,
    /// Assigned (or persisted, while rejoining) room and seat.
    pub session: Option<Session>,
    /// Last server snapshot. Only replaced, never edited.
    pub snapshot: Option<GameState>,
    /// Cells to highlight as the winning line.
    pub winning_cells: Vec<Coord>,
    pub scores: Scoreboard,
    pub chat: ChatLog,
    pub notice: Option<Notice>,
}

impl SessionState {
    /// Initial state, seeded with a session read back from storage.
    pub fn with_persisted(session: Option<Session>) -> Self {
        Self {
            session,
            ..Self::default()
        }
    }

    pub fn local_seat(&self) -> Option<Seat> {
        self.session.as_ref().map(|s| s.seat)
    }

    pub fn room(&self) -> Option<&RoomCode> {
        self.session.as_ref().map(|s| &s.room)
    }

    /// `true` when the snapshot says the local seat is to move.
    pub fn is_my_turn(&self) -> bool {
        match (self.local_seat(), &self.snapshot) {
            (Some(seat), Some(snapshot)) => snapshot.is_turn_of(seat),
            _ => false,
        }
    }

    /// Pre-check a move against the held snapshot.
    ///
    /// The server re-validates every move; this only avoids sending requests
    /// that are certain to be refused.
    ///
    /// # Errors
    ///
    /// - [`CubeError::NotInRoom`] without a session
    /// - [`CubeError::Rejoining`] while a rejoin is in flight
    /// - [`CubeError::NoGame`] without a snapshot
    /// - [`CubeError::GameOver`] when the game is over
    /// - [`CubeError::NotYourTurn`] when the other seat is to move
    pub fn check_move(&self, coord: Coord) -> Result<ClientMessage> {
        let seat = self.local_seat().ok_or(CubeError::NotInRoom)?;
        match self.phase {
            Phase::Active => {}
            Phase::AwaitingRejoin => return Err(CubeError::Rejoining),
            Phase::Lobby => return Err(CubeError::NotInRoom),
        }
        let snapshot = self.snapshot.as_ref().ok_or(CubeError::NoGame)?;
        if snapshot.game_over {
            return Err(CubeError::GameOver);
        }
        if snapshot.current_player != seat {
            return Err(CubeError::NotYourTurn);
        }
        Ok(ClientMessage::make_move(coord))
    }
}

// ── Actions & effects ───────────────────────────────────────────────

/// Inputs to the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// A transport was established.
    Connected,
    /// The transport dropped; a reconnect may follow.
    ConnectionLost { reason: Option<String> },
    /// A decoded server message.
    Server(crate::protocol::ServerMessage),
    /// The user sent chat text (local echo).
    ChatSent { text: String },
    /// The user left the room.
    Left,
    /// A user request failed client-side validation.
    Rejected { reason: String },
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(ClientMessage),
    Persist(Session),
    ClearPersisted,
}

/// Result of [`reduce`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: SessionState,
    pub effects: Vec<Effect>,
}

// ── Reducer ─────────────────────────────────────────────────────────

/// Compute the next state from `state` and `action`.
pub fn reduce(state: &SessionState, action: Action, now: DateTime<Utc>) -> Transition {
    let mut r = Reducer {
        next: state.clone(),
        effects: Vec::new(),
        now,
    };
    r.apply(action);
    Transition {
        state: r.next,
        effects: r.effects,
    }
}

struct Reducer {
    next: SessionState,
    effects: Vec<Effect>,
    now: DateTime<Utc>,
}

impl Reducer {
    fn info(&mut self, text: impl Into<String>) {
        self.notice(NoticeLevel::Info, text);
    }

    fn error(&mut self, text: impl Into<String>) {
        self.notice(NoticeLevel::Error, text);
    }

    fn notice(&mut self, level: NoticeLevel, text: impl Into<String>) {
        self.next.notice = Some(Notice {
            level,
            text: text.into(),
            at: self.now,
        });
    }

    fn system(&mut self, text: impl Into<String>) {
        self.next.chat.system(text, self.now);
    }

    /// Take a seat: session, snapshot and persisted pair all move together.
    fn seat(&mut self, session: Session, snapshot: GameState) {
        debug!(room = %session.room, seat = ?session.seat, "state: seated");
        if self.next.session.as_ref() != Some(&session) {
            self.next.scores.new_match();
        }
        self.effects.push(Effect::Persist(session.clone()));
        self.next.session = Some(session);
        self.next.phase = Phase::Active;
        self.replace_snapshot(snapshot);
    }

    fn replace_snapshot(&mut self, snapshot: GameState) {
        self.next.winning_cells = if snapshot.game_over {
            snapshot.winning_cells.clone()
        } else {
            Vec::new()
        };
        self.next.snapshot = Some(snapshot);
    }

    fn unseat(&mut self) {
        self.next.session = None;
        self.next.snapshot = None;
        self.next.winning_cells.clear();
        self.next.phase = Phase::Lobby;
        self.effects.push(Effect::ClearPersisted);
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::Connected => self.connected(),
            Action::ConnectionLost { reason } => {
                self.next.connected = false;
                match reason {
                    Some(reason) => self.error(format!("Connection lost ({reason}). Reconnecting...")),
                    None => self.error("Disconnected from server. Reconnecting..."),
                }
            }
            Action::Server(msg) => self.server(msg),
            Action::ChatSent { text } => self.next.chat.push(ChatOrigin::Own, text, self.now),
            Action::Left => {
                self.unseat();
                self.info("You left the room");
            }
            Action::Rejected { reason } => self.error(reason),
        }
    }

    fn connected(&mut self) {
        self.next.connected = true;
        let Some(session) = self.next.session.clone() else {
            self.info("Connected to server. Ready to play!");
            return;
        };
        debug!(room = %session.room, "state: rejoining persisted session");
        self.next.phase = Phase::AwaitingRejoin;
        self.effects.push(Effect::Send(ClientMessage::RejoinGame {
            room: session.room.clone(),
            player_number: session.seat,
        }));
        self.info(format!("Connected. Rejoining room {}...", session.room));
    }

    fn server(&mut self, msg: crate::protocol::ServerMessage) {
        use crate::protocol::ServerMessage as M;

        match msg {
            M::Connected { message } => {
                debug!("server greeting: {message}");
            }
            M::GameCreated {
                room,
                game_state,
                player_number,
                ..
            } => {
                let seat = player_number.unwrap_or(Seat::First);
                self.info(format!("Room created! Code: {room}"));
                self.system("Room created. Share the code with your friend.");
                self.seat(Session::new(room, seat), game_state);
            }
            M::PlayerJoinedSelf {
                player_number,
                room,
                game_state,
                ..
            } => {
                match player_number {
                    Seat::First => self.info("You are Player 1 (X). Waiting for Player 2..."),
                    Seat::Second => self.info("You joined as Player 2 (O)!"),
                }
                self.system(format!("You joined room {room}"));
                self.seat(Session::new(room, player_number), game_state);
            }
            M::PlayerJoinedAll {
                player_name,
                game_state,
                ..
            } => {
                if let Some(game_state) = game_state {
                    self.replace_snapshot(game_state);
                }
                if self.next.local_seat() == Some(Seat::First) {
                    self.info(format!("{player_name} joined! The game begins!"));
                    self.system(format!("{player_name} joined the game!"));
                } else {
                    self.info("Connected! Waiting for the first move...");
                }
            }
            M::RejoinGameResponse(payload) => self.rejoin_response(*payload),
            M::PlayerLeft { player_name, .. } => {
                self.error(format!("{player_name} left the game. You can leave or wait."));
                self.system(format!("{player_name} left the game."));
            }
            M::MoveMade {
                game_state,
                player,
                z,
                y,
                x,
            } => {
                let next_up = game_state.current_player;
                self.replace_snapshot(game_state);
                if self.next.local_seat() == Some(next_up) {
                    self.info("Your turn!");
                }
                match Coord::new(z.into(), y.into(), x.into()) {
                    Ok(coord) => {
                        let text = format!("Player {} moved at {coord}", player.symbol());
                        self.next
                            .chat
                            .push(ChatOrigin::Move { seat: player }, text, self.now);
                    }
                    Err(e) => debug!("move_made carried an unusable coordinate: {e}"),
                }
            }
            M::GameOver(payload) => self.game_over(*payload),
            M::GameDraw {
                game_state,
                message,
                round,
            } => {
                self.replace_snapshot(game_state);
                if self.next.scores.record_draw(round) {
                    self.system("The match ended in a draw!");
                } else {
                    debug!("duplicate game_draw ignored for scoring");
                }
                self.info(message.unwrap_or_else(|| "Draw! Nobody wins.".into()));
            }
            M::GameReset {
                game_state,
                message,
                round,
            } => {
                self.replace_snapshot(game_state);
                self.next.scores.next_round(round);
                self.info(message.unwrap_or_else(|| "Game reset".into()));
                self.system("The game has been reset.");
            }
            M::PlayerReconnected { .. } => {
                self.info("The other player reconnected");
                self.system("The other player reconnected.");
            }
            M::ChatMessage {
                message,
                player_name,
            } => {
                self.next
                    .chat
                    .push(ChatOrigin::Opponent { name: player_name }, message, self.now);
            }
            M::Error { message } => self.error(message),
        }
    }

    fn rejoin_response(&mut self, payload: RejoinResponsePayload) {
        if self.next.phase != Phase::AwaitingRejoin {
            debug!("rejoin_game_response received outside a rejoin; applying anyway");
        }
        match payload {
            RejoinResponsePayload {
                success: true,
                room: Some(room),
                player_number: Some(seat),
                game_state: Some(game_state),
                ..
            } => {
                self.seat(Session::new(room, seat), game_state);
                self.info("Reconnected to the game!");
                self.system("Reconnected to the game.");
            }
            RejoinResponsePayload { message, .. } => {
                debug!(reason = ?message, "state: rejoin refused");
                self.unseat();
                self.error("Could not rejoin. Create or join a new room.");
            }
        }
    }

    fn game_over(&mut self, payload: GameOverPayload) {
        let GameOverPayload {
            game_state,
            winner,
            winner_name,
            winning_cells,
            message,
            round,
            ..
        } = payload;

        self.replace_snapshot(game_state);
        self.next.winning_cells = winning_cells;

        if self.next.scores.record_win(winner, round) {
            self.system(format!("{winner_name} won the match!"));
        } else {
            debug!("duplicate game_over ignored for scoring");
        }

        let fallback = if self.next.local_seat() == Some(winner) {
            "You won this match!".to_string()
        } else {
            format!("{winner_name} won this match!")
        };
        self.info(message.unwrap_or(fallback));
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
    use crate::protocol::{Cell, PlayerEntry, ServerMessage};

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn room(code: &str) -> RoomCode {
        RoomCode::parse(code).unwrap()
    }

    fn snapshot(current: Seat, game_over: bool) -> GameState {
        GameState {
            current_player: current,
            game_over,
            players: vec![PlayerEntry {
                name: "Ann".into(),
                number: Seat::First,
            }],
            ..GameState::default()
        }
    }

    fn step(state: &SessionState, action: Action) -> Transition {
        reduce(state, action, now())
    }

    fn server(state: &SessionState, msg: ServerMessage) -> Transition {
        step(state, Action::Server(msg))
    }

    fn seated(seat: Seat, current: Seat) -> SessionState {
        SessionState {
            phase: Phase::Active,
            connected: true,
            session: Some(Session::new(room("AB12CD"), seat)),
            snapshot: Some(snapshot(current, false)),
            ..SessionState::default()
        }
    }

    fn game_over_msg(winner: Seat, round: Option<u64>) -> ServerMessage {
        let mut gs = snapshot(winner, true);
        gs.winner = Some(winner);
        ServerMessage::GameOver(Box::new(GameOverPayload {
            game_state: gs,
            winner,
            winner_name: "Ann".into(),
            winning_cells: (0..4).map(|x| Coord::new(0, 0, x).unwrap()).collect(),
            message: None,
            is_draw: false,
            round,
        }))
    }

    #[test]
    fn connect_without_session_stays_in_lobby() {
        let t = step(&SessionState::default(), Action::Connected);
        assert!(t.state.connected);
        assert_eq!(t.state.phase, Phase::Lobby);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn connect_with_persisted_session_requests_rejoin() {
        let persisted = Session::new(room("AB12CD"), Seat::Second);
        let state = SessionState::with_persisted(Some(persisted));
        let t = step(&state, Action::Connected);

        assert_eq!(t.state.phase, Phase::AwaitingRejoin);
        assert_eq!(
            t.effects,
            vec![Effect::Send(ClientMessage::RejoinGame {
                room: room("AB12CD"),
                player_number: Seat::Second,
            })]
        );
    }

    #[test]
    fn rejoin_success_takes_values_from_response() {
        let persisted = Session::new(room("AB12CD"), Seat::Second);
        let state = step(&SessionState::with_persisted(Some(persisted)), Action::Connected).state;

        let response = ServerMessage::RejoinGameResponse(Box::new(RejoinResponsePayload {
            success: true,
            room: Some(room("ZZ99YY")),
            player_number: Some(Seat::First),
            game_state: Some(snapshot(Seat::First, false)),
            message: None,
        }));
        let t = server(&state, response);

        let expected = Session::new(room("ZZ99YY"), Seat::First);
        assert_eq!(t.state.phase, Phase::Active);
        assert_eq!(t.state.session, Some(expected.clone()));
        assert_eq!(t.effects, vec![Effect::Persist(expected)]);
        assert!(t.state.snapshot.is_some());
    }

    #[test]
    fn rejoin_failure_clears_session_and_returns_to_lobby() {
        let persisted = Session::new(room("AB12CD"), Seat::Second);
        let state = step(&SessionState::with_persisted(Some(persisted)), Action::Connected).state;

        let response = ServerMessage::RejoinGameResponse(Box::new(RejoinResponsePayload {
            success: false,
            room: None,
            player_number: None,
            game_state: None,
            message: Some("room does not exist".into()),
        }));
        let t = server(&state, response);

        assert_eq!(t.state.phase, Phase::Lobby);
        assert_eq!(t.state.session, None);
        assert_eq!(t.state.snapshot, None);
        assert_eq!(t.effects, vec![Effect::ClearPersisted]);
        assert_eq!(t.state.notice.unwrap().level, NoticeLevel::Error);
    }

    #[test]
    fn joined_self_assigns_second_seat_and_persists() {
        let t = server(
            &SessionState::default(),
            ServerMessage::PlayerJoinedSelf {
                player_number: Seat::Second,
                room: room("AB12CD"),
                game_state: snapshot(Seat::First, false),
                player_name: None,
            },
        );
        let expected = Session::new(room("AB12CD"), Seat::Second);
        assert_eq!(t.state.local_seat(), Some(Seat::Second));
        assert_eq!(t.effects, vec![Effect::Persist(expected)]);
        assert_eq!(t.state.phase, Phase::Active);
    }

    #[test]
    fn game_created_takes_first_seat() {
        let t = server(
            &SessionState::default(),
            ServerMessage::GameCreated {
                room: room("QW12ER"),
                game_state: snapshot(Seat::First, false),
                player_name: Some("Ann".into()),
                player_number: None,
            },
        );
        assert_eq!(t.state.local_seat(), Some(Seat::First));
        assert_eq!(t.state.room().unwrap().as_str(), "QW12ER");
        assert_eq!(t.state.chat.len(), 1);
    }

    #[test]
    fn game_over_scores_once_and_marks_winning_cells() {
        let state = seated(Seat::Second, Seat::First);
        let t = server(&state, game_over_msg(Seat::First, None));

        assert_eq!(t.state.scores.wins(Seat::First), 1);
        assert_eq!(t.state.scores.wins(Seat::Second), 0);
        let expected: Vec<_> = (0..4).map(|x| Coord::new(0, 0, x).unwrap()).collect();
        assert_eq!(t.state.winning_cells, expected);

        // Duplicate delivery for the same round does not double count.
        let again = server(&t.state, game_over_msg(Seat::First, None));
        assert_eq!(again.state.scores.wins(Seat::First), 1);
        assert_eq!(again.state.chat.len(), t.state.chat.len());
    }

    #[test]
    fn reset_opens_a_new_scoring_round() {
        let state = seated(Seat::First, Seat::First);
        let state = server(&state, game_over_msg(Seat::First, None)).state;
        let state = server(
            &state,
            ServerMessage::GameReset {
                game_state: snapshot(Seat::First, false),
                message: None,
                round: None,
            },
        )
        .state;
        assert!(state.winning_cells.is_empty());
        assert_eq!(state.scores.round(), 1);

        let state = server(&state, game_over_msg(Seat::First, None)).state;
        assert_eq!(state.scores.wins(Seat::First), 2);
    }

    #[test]
    fn server_round_key_takes_precedence() {
        let state = seated(Seat::First, Seat::First);
        let state = server(&state, game_over_msg(Seat::Second, Some(7))).state;
        let state = server(&state, game_over_msg(Seat::Second, Some(7))).state;
        let state = server(&state, game_over_msg(Seat::Second, Some(8))).state;
        assert_eq!(state.scores.wins(Seat::Second), 2);
    }

    #[test]
    fn draw_is_counted_once() {
        let state = seated(Seat::First, Seat::First);
        let draw = ServerMessage::GameDraw {
            game_state: snapshot(Seat::First, true),
            message: Some("Draw!".into()),
            round: None,
        };
        let state = server(&state, draw.clone()).state;
        let state = server(&state, draw).state;
        assert_eq!(state.scores.draws, 1);
        assert_eq!(state.notice.unwrap().text, "Draw!");
    }

    #[test]
    fn move_made_replaces_snapshot_wholesale() {
        let state = seated(Seat::Second, Seat::First);
        let mut gs = snapshot(Seat::Second, false);
        gs.board[0][1][2] = Cell::First;
        let t = server(
            &state,
            ServerMessage::MoveMade {
                game_state: gs.clone(),
                player: Seat::First,
                z: 0,
                y: 1,
                x: 2,
            },
        );
        assert_eq!(t.state.snapshot, Some(gs));
        assert!(t.state.is_my_turn());
        assert_eq!(t.state.notice.as_ref().unwrap().text, "Your turn!");
        let line = t.state.chat.last().unwrap();
        assert_eq!(line.text, "Player X moved at (1,2,3)");
        assert_eq!(line.origin, ChatOrigin::Move { seat: Seat::First });
        assert!(t.effects.is_empty());
    }

    #[test]
    fn move_check_requires_turn_and_running_game() {
        let coord = Coord::new(1, 1, 1).unwrap();

        let waiting = seated(Seat::Second, Seat::First);
        assert!(matches!(waiting.check_move(coord), Err(CubeError::NotYourTurn)));

        let mut over = seated(Seat::First, Seat::First);
        if let Some(s) = over.snapshot.as_mut() {
            s.game_over = true;
        }
        assert!(matches!(over.check_move(coord), Err(CubeError::GameOver)));

        assert!(matches!(
            SessionState::default().check_move(coord),
            Err(CubeError::NotInRoom)
        ));

        let mut unloaded = seated(Seat::First, Seat::First);
        unloaded.snapshot = None;
        assert!(matches!(unloaded.check_move(coord), Err(CubeError::NoGame)));

        let ready = seated(Seat::First, Seat::First);
        assert_eq!(
            ready.check_move(coord).unwrap(),
            ClientMessage::MakeMove { z: 1, y: 1, x: 1 }
        );
    }

    #[test]
    fn moves_wait_for_rejoin_to_finish() {
        let coord = Coord::new(1, 1, 1).unwrap();
        let state = seated(Seat::First, Seat::First);
        let lost = step(&state, Action::ConnectionLost { reason: None }).state;
        let rejoining = step(&lost, Action::Connected).state;

        assert_eq!(rejoining.phase, Phase::AwaitingRejoin);
        assert!(rejoining.snapshot.as_ref().is_some_and(|s| s.is_turn_of(Seat::First)));
        assert!(matches!(rejoining.check_move(coord), Err(CubeError::Rejoining)));
    }

    fn created(code: &str) -> ServerMessage {
        ServerMessage::GameCreated {
            room: room(code),
            game_state: snapshot(Seat::First, false),
            player_name: Some("Ann".into()),
            player_number: Some(Seat::First),
        }
    }

    #[test]
    fn first_win_in_a_new_room_counts_after_leaving() {
        let state = server(&SessionState::default(), created("AAAAAA")).state;
        let state = server(&state, game_over_msg(Seat::First, None)).state;
        let state = step(&state, Action::Left).state;
        let state = server(&state, created("BBBBBB")).state;
        let state = server(&state, game_over_msg(Seat::First, None)).state;

        assert_eq!(state.scores.wins(Seat::First), 2);
        assert_eq!(state.scores.round(), 0);
    }

    #[test]
    fn first_win_after_failed_rejoin_counts() {
        let persisted = Session::new(room("AB12CD"), Seat::Second);
        let state = step(&SessionState::with_persisted(Some(persisted)), Action::Connected).state;
        let state = server(
            &state,
            ServerMessage::RejoinGameResponse(Box::new(RejoinResponsePayload {
                success: true,
                room: Some(room("AB12CD")),
                player_number: Some(Seat::Second),
                game_state: Some(snapshot(Seat::First, false)),
                message: None,
            })),
        )
        .state;
        let state = server(&state, game_over_msg(Seat::Second, Some(3))).state;

        // The link drops again and this time the room is gone.
        let state = step(&state, Action::ConnectionLost { reason: None }).state;
        let state = step(&state, Action::Connected).state;
        let state = server(
            &state,
            ServerMessage::RejoinGameResponse(Box::new(RejoinResponsePayload {
                success: false,
                room: None,
                player_number: None,
                game_state: None,
                message: Some("room does not exist".into()),
            })),
        )
        .state;
        let state = server(
            &state,
            ServerMessage::PlayerJoinedSelf {
                player_number: Seat::Second,
                room: room("ZZ99YY"),
                game_state: snapshot(Seat::First, false),
                player_name: None,
            },
        )
        .state;
        let state = server(&state, game_over_msg(Seat::Second, Some(3))).state;

        assert_eq!(state.scores.wins(Seat::Second), 2);
    }

    #[test]
    fn rejoining_the_same_seat_keeps_duplicate_protection() {
        let state = seated(Seat::First, Seat::First);
        let state = server(&state, game_over_msg(Seat::First, None)).state;
        let state = step(&state, Action::ConnectionLost { reason: None }).state;
        let state = step(&state, Action::Connected).state;
        let mut finished = snapshot(Seat::First, true);
        finished.winner = Some(Seat::First);
        let state = server(
            &state,
            ServerMessage::RejoinGameResponse(Box::new(RejoinResponsePayload {
                success: true,
                room: Some(room("AB12CD")),
                player_number: Some(Seat::First),
                game_state: Some(finished),
                message: None,
            })),
        )
        .state;

        // The server replays the result for the round already counted.
        let state = server(&state, game_over_msg(Seat::First, None)).state;
        assert_eq!(state.scores.wins(Seat::First), 1);
    }

    #[test]
    fn leave_clears_everything_but_scores() {
        let state = seated(Seat::First, Seat::First);
        let state = server(&state, game_over_msg(Seat::First, None)).state;
        let t = step(&state, Action::Left);
        assert_eq!(t.state.phase, Phase::Lobby);
        assert!(t.state.session.is_none());
        assert!(t.state.snapshot.is_none());
        assert!(t.state.winning_cells.is_empty());
        assert_eq!(t.state.scores.wins(Seat::First), 1);
        assert_eq!(t.effects, vec![Effect::ClearPersisted]);
    }

    #[test]
    fn server_error_is_surfaced_verbatim() {
        let t = server(
            &SessionState::default(),
            ServerMessage::Error {
                message: "Room is full".into(),
            },
        );
        let notice = t.state.notice.unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.text, "Room is full");
    }

    #[test]
    fn chat_origins_are_recorded() {
        let state = seated(Seat::First, Seat::First);
        let state = step(&state, Action::ChatSent { text: "hi".into() }).state;
        let state = server(
            &state,
            ServerMessage::ChatMessage {
                message: "hello".into(),
                player_name: "Bob".into(),
            },
        )
        .state;
        let origins: Vec<_> = state.chat.iter().map(|e| e.origin.clone()).collect();
        assert_eq!(
            origins,
            vec![ChatOrigin::Own, ChatOrigin::Opponent { name: "Bob".into() }]
        );
    }

    #[test]
    fn info_notices_expire_but_errors_do_not() {
        let info = Notice {
            level: NoticeLevel::Info,
            text: "hi".into(),
            at: now(),
        };
        let error = Notice {
            level: NoticeLevel::Error,
            ..info.clone()
        };
        let later = now() + TimeDelta::seconds(5);
        assert!(info.is_visible(now()));
        assert!(!info.is_visible(later));
        assert!(error.is_visible(later));
    }

    #[test]
    fn reducer_is_deterministic() {
        let state = seated(Seat::First, Seat::First);
        let a = server(&state, game_over_msg(Seat::First, None));
        let b = server(&state, game_over_msg(Seat::First, None));
        assert_eq!(a, b);
    }
}
