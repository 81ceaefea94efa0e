//! Stateless projection of [`SessionState`] into displayable values.
//!
//! [`render`] is a pure function of the state and a clock value; calling it
//! twice with the same inputs yields equal [`View`]s. The `Display` impl on
//! [`View`] produces a plain-text rendering for terminals.

use std::fmt;

use chrono::{DateTime, Local, Utc};

use crate::chat::ChatOrigin;
use crate::protocol::{Coord, GameState, Seat, BOARD_SIZE};
use crate::state::{NoticeLevel, Phase, SessionState};

/// Shown in the second seat's name slot until someone takes it.
pub const WAITING_FOR_SECOND: &str = "Waiting for player 2...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Lobby,
    Rejoining,
    Game,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellView {
    pub coord: Coord,
    pub mark: Option<char>,
    pub winning: bool,
    /// Empty, game running and the local seat is to move.
    pub playable: bool,
}

/// One `z` layer, cells in row-major `(y, x)` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerView {
    pub title: String,
    pub cells: Vec<CellView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardView {
    pub layers: Vec<LayerView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerView {
    pub seat: Seat,
    pub name: String,
    pub score: u32,
    /// Turn indicator.
    pub active: bool,
    pub is_local: bool,
}

/// Summary of a finished match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultView {
    pub title: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    /// Local wall-clock `HH:MM`.
    pub time: String,
    pub text: String,
    pub origin: ChatOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeView {
    pub level: NoticeLevel,
    pub text: String,
}

/// Everything a front end needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub screen: Screen,
    pub connected: bool,
    pub room_code: Option<String>,
    pub first: PlayerView,
    pub second: PlayerView,
    pub draws: u32,
    pub waiting_for_opponent: bool,
    pub turn_text: Option<String>,
    pub board: Option<BoardView>,
    pub result: Option<ResultView>,
    pub notice: Option<NoticeView>,
    pub chat: Vec<ChatLine>,
}

/// Project `state` as of `now`.
pub fn render(state: &SessionState, now: DateTime<Utc>) -> View {
    let screen = match state.phase {
        Phase::Lobby => Screen::Lobby,
        Phase::AwaitingRejoin => Screen::Rejoining,
        Phase::Active => Screen::Game,
    };
    let local = state.local_seat();
    let snapshot = state.snapshot.as_ref();

    View {
        screen,
        connected: state.connected,
        room_code: state.room().map(|r| r.to_string()),
        first: player_view(state, Seat::First),
        second: player_view(state, Seat::Second),
        draws: state.scores.draws,
        waiting_for_opponent: snapshot.is_some_and(|s| s.player_name(Seat::Second).is_none()),
        turn_text: snapshot.map(|s| turn_text(s, local)),
        board: snapshot.map(|s| board_view(s, &state.winning_cells, local)),
        result: snapshot.and_then(|s| result_view(s, local)),
        notice: state
            .notice
            .as_ref()
            .filter(|n| n.is_visible(now))
            .map(|n| NoticeView {
                level: n.level,
                text: n.text.clone(),
            }),
        chat: state
            .chat
            .iter()
            .map(|entry| ChatLine {
                time: entry.at.with_timezone(&Local).format("%H:%M").to_string(),
                text: entry.display_text(),
                origin: entry.origin.clone(),
            })
            .collect(),
    }
}

fn default_name(seat: Seat) -> &'static str {
    match seat {
        Seat::First => "Player 1",
        Seat::Second => "Player 2",
    }
}

fn display_name(snapshot: Option<&GameState>, seat: Seat) -> String {
    match snapshot.and_then(|s| s.player_name(seat)) {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        Some(_) => default_name(seat).to_string(),
        None if seat == Seat::Second && snapshot.is_some() => WAITING_FOR_SECOND.to_string(),
        None => default_name(seat).to_string(),
    }
}

fn player_view(state: &SessionState, seat: Seat) -> PlayerView {
    let snapshot = state.snapshot.as_ref();
    PlayerView {
        seat,
        name: display_name(snapshot, seat),
        score: state.scores.wins(seat),
        active: snapshot.is_some_and(|s| s.is_turn_of(seat)),
        is_local: state.local_seat() == Some(seat),
    }
}

fn turn_text(snapshot: &GameState, local: Option<Seat>) -> String {
    if snapshot.game_over {
        return "Game over".to_string();
    }
    let whose = if local == Some(snapshot.current_player) {
        "Your turn!"
    } else {
        "Opponent's turn"
    };
    format!("{whose} - {}", snapshot.current_player.label())
}

fn board_view(snapshot: &GameState, winning: &[Coord], local: Option<Seat>) -> BoardView {
    let my_turn = local.is_some_and(|seat| snapshot.is_turn_of(seat));
    let layers = (0..BOARD_SIZE)
        .map(|z| LayerView {
            title: format!("Layer {}", z + 1),
            cells: (0..BOARD_SIZE * BOARD_SIZE)
                .filter_map(|i| Coord::new(z, i / BOARD_SIZE, i % BOARD_SIZE).ok())
                .map(|coord| {
                    let owner = snapshot.cell(coord).owner();
                    CellView {
                        coord,
                        mark: owner.map(Seat::symbol),
                        winning: winning.contains(&coord),
                        playable: owner.is_none() && my_turn,
                    }
                })
                .collect(),
        })
        .collect();
    BoardView { layers }
}

fn result_view(snapshot: &GameState, local: Option<Seat>) -> Option<ResultView> {
    if !snapshot.game_over {
        return None;
    }
    let view = match snapshot.winner {
        None => ResultView {
            title: "Draw!".to_string(),
            detail: "Nobody wins this match.".to_string(),
        },
        Some(winner) if local == Some(winner) => ResultView {
            title: "Congratulations!".to_string(),
            detail: "You won this match!".to_string(),
        },
        Some(winner) => ResultView {
            title: "Game over".to_string(),
            detail: format!("{} won this match!", display_name(Some(snapshot), winner)),
        },
    };
    Some(view)
}

// ── Text rendering ──────────────────────────────────────────────────

impl fmt::Display for BoardView {
    /// Layers side by side, `.` for empty, `*` after a winning mark.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let titles: Vec<String> = self.layers.iter().map(|l| format!("{:<13}", l.title)).collect();
        writeln!(f, "{}", titles.join(" ").trim_end())?;
        for y in 0..BOARD_SIZE {
            let rows: Vec<String> = self
                .layers
                .iter()
                .map(|layer| {
                    layer
                        .cells
                        .iter()
                        .skip(y * BOARD_SIZE)
                        .take(BOARD_SIZE)
                        .map(|c| {
                            let mark = c.mark.unwrap_or('.');
                            if c.winning {
                                format!("{mark}* ")
                            } else {
                                format!("{mark}  ")
                            }
                        })
                        .collect::<String>()
                })
                .map(|row| format!("{row:<13}"))
                .collect();
            writeln!(f, "{}", rows.join(" ").trim_end())?;
        }
        Ok(())
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.connected {
            writeln!(f, "[offline]")?;
        }
        match self.screen {
            Screen::Lobby => writeln!(f, "Lobby: create or join a room.")?,
            Screen::Rejoining => writeln!(f, "Rejoining previous room...")?,
            Screen::Game => {
                if let Some(room) = &self.room_code {
                    writeln!(f, "Room {room}")?;
                }
                for player in [&self.first, &self.second] {
                    writeln!(
                        f,
                        "{} {} ({}){}  wins: {}",
                        if player.active { '>' } else { ' ' },
                        player.name,
                        player.seat.symbol(),
                        if player.is_local { " [you]" } else { "" },
                        player.score,
                    )?;
                }
                writeln!(f, "  draws: {}", self.draws)?;
                if let Some(turn) = &self.turn_text {
                    writeln!(f, "{turn}")?;
                }
                if let Some(board) = &self.board {
                    write!(f, "{board}")?;
                }
                if let Some(result) = &self.result {
                    writeln!(f, "{}: {}", result.title, result.detail)?;
                }
            }
        }
        if let Some(notice) = &self.notice {
            let tag = match notice.level {
                NoticeLevel::Info => "info",
                NoticeLevel::Error => "error",
            };
            writeln!(f, "[{tag}] {}", notice.text)?;
        }
        for line in &self.chat {
            writeln!(f, "{} {}", line.time, line.text)?;
        }
        Ok(())
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
    use crate::protocol::{Cell, PlayerEntry};
    use crate::session::{RoomCode, Session};
    use crate::state::Notice;
    use chrono::TimeDelta;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn state(seat: Seat, snapshot: GameState) -> SessionState {
        SessionState {
            phase: Phase::Active,
            connected: true,
            session: Some(Session::new(RoomCode::parse("AB12CD").unwrap(), seat)),
            snapshot: Some(snapshot),
            ..SessionState::default()
        }
    }

    fn roster(names: &[(&str, Seat)]) -> Vec<PlayerEntry> {
        names
            .iter()
            .map(|(name, number)| PlayerEntry {
                name: (*name).to_string(),
                number: *number,
            })
            .collect()
    }

    #[test]
    fn lobby_has_no_board() {
        let view = render(&SessionState::default(), now());
        assert_eq!(view.screen, Screen::Lobby);
        assert!(view.board.is_none());
        assert!(view.turn_text.is_none());
        assert_eq!(view.first.name, "Player 1");
    }

    #[test]
    fn rendering_twice_is_identical() {
        let mut gs = GameState::default();
        gs.board[2][1][0] = Cell::First;
        gs.board[3][3][3] = Cell::Second;
        gs.current_player = Seat::Second;
        let s = state(Seat::Second, gs);
        assert_eq!(render(&s, now()), render(&s, now()));
        assert_eq!(render(&s, now()).to_string(), render(&s, now()).to_string());
    }

    #[test]
    fn board_marks_and_playable_cells() {
        let mut gs = GameState::default();
        gs.board[0][0][1] = Cell::First;
        let view = render(&state(Seat::First, gs.clone()), now());
        let board = view.board.unwrap();
        assert_eq!(board.layers.len(), 4);
        assert_eq!(board.layers[0].title, "Layer 1");
        assert_eq!(board.layers[0].cells.len(), 16);

        let taken = &board.layers[0].cells[1];
        assert_eq!(taken.mark, Some('X'));
        assert!(!taken.playable);
        assert!(board.layers[0].cells[0].playable);

        // Not our turn: nothing is playable.
        let view = render(&state(Seat::Second, gs), now());
        let board = view.board.unwrap();
        assert!(board.layers.iter().flat_map(|l| &l.cells).all(|c| !c.playable));
    }

    #[test]
    fn turn_text_names_the_seat() {
        let gs = GameState::default();
        let mine = render(&state(Seat::First, gs.clone()), now());
        assert_eq!(mine.turn_text.as_deref(), Some("Your turn! - Player 1 (X)"));
        assert!(mine.first.active);
        assert!(!mine.second.active);

        let theirs = render(&state(Seat::Second, gs.clone()), now());
        assert_eq!(theirs.turn_text.as_deref(), Some("Opponent's turn - Player 1 (X)"));

        let mut over = gs;
        over.game_over = true;
        let done = render(&state(Seat::First, over), now());
        assert_eq!(done.turn_text.as_deref(), Some("Game over"));
        assert!(!done.first.active);
    }

    #[test]
    fn names_come_from_roster_with_defaults() {
        let gs = GameState {
            players: roster(&[("Ann", Seat::First)]),
            ..GameState::default()
        };
        let view = render(&state(Seat::First, gs), now());
        assert_eq!(view.first.name, "Ann");
        assert_eq!(view.second.name, WAITING_FOR_SECOND);
        assert!(view.waiting_for_opponent);

        let gs = GameState {
            players: roster(&[("Ann", Seat::First), ("Bob", Seat::Second)]),
            ..GameState::default()
        };
        let view = render(&state(Seat::Second, gs), now());
        assert_eq!(view.second.name, "Bob");
        assert!(view.second.is_local);
        assert!(!view.waiting_for_opponent);
    }

    #[test]
    fn winning_cells_are_flagged() {
        let mut gs = GameState {
            game_over: true,
            winner: Some(Seat::First),
            players: roster(&[("Ann", Seat::First), ("Bob", Seat::Second)]),
            ..GameState::default()
        };
        for x in 0..4 {
            gs.board[1][2][x] = Cell::First;
        }
        let mut s = state(Seat::Second, gs);
        s.winning_cells = (0..4).map(|x| Coord::new(1, 2, x).unwrap()).collect();

        let view = render(&s, now());
        let winning: Vec<_> = view
            .board
            .unwrap()
            .layers
            .iter()
            .flat_map(|l| l.cells.clone())
            .filter(|c| c.winning)
            .map(|c| c.coord)
            .collect();
        assert_eq!(winning, s.winning_cells);
        assert_eq!(view.result.unwrap().detail, "Ann won this match!");
    }

    #[test]
    fn info_notice_hides_after_four_seconds() {
        let mut s = SessionState::default();
        s.notice = Some(Notice {
            level: NoticeLevel::Info,
            text: "Room created".into(),
            at: now(),
        });
        assert!(render(&s, now() + TimeDelta::seconds(3)).notice.is_some());
        assert!(render(&s, now() + TimeDelta::seconds(4)).notice.is_none());
    }

    #[test]
    fn text_rendering_shows_layers() {
        let mut gs = GameState::default();
        gs.board[0][0][0] = Cell::First;
        let text = render(&state(Seat::First, gs), now()).to_string();
        assert!(text.contains("Room AB12CD"));
        assert!(text.contains("Layer 1"));
        assert!(text.contains("Layer 4"));
        assert!(text.contains("X  .  .  ."));
    }
}
