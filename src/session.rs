//! Session identity and its durable storage.
//!
//! A [`Session`] is the pair the server needs to let a client back into its
//! room after a reconnect: the room code and the seat it was given. The
//! client writes it through a [`SessionStore`] whenever the server assigns
//! one, and reads it back when a fresh connection is established.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CubeError, Result};
use crate::protocol::Seat;

/// Length of every server-assigned room code.
pub const ROOM_CODE_LEN: usize = 6;

/// Minimum length of a player name, in characters, after trimming.
pub const MIN_PLAYER_NAME_LEN: usize = 2;

// ── Room codes ──────────────────────────────────────────────────────

/// A six-character room code.
///
/// Input is trimmed and upper-cased before the length check, so `" ab12cd "`
/// parses to `AB12CD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Parse user or wire input into a room code.
    ///
    /// # Errors
    ///
    /// Returns [`CubeError::InvalidRoomCode`] unless the normalized input is
    /// exactly [`ROOM_CODE_LEN`] characters long.
    pub fn parse(value: &str) -> Result<Self> {
        let normalized = value.trim().to_uppercase();
        let found = normalized.chars().count();
        if found != ROOM_CODE_LEN {
            return Err(CubeError::InvalidRoomCode {
                expected: ROOM_CODE_LEN,
                found,
            });
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for RoomCode {
    type Err = CubeError;

    fn from_str(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = CubeError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

// ── Player names ────────────────────────────────────────────────────

/// Trim `raw` and check it is long enough to be sent as a player name.
///
/// # Errors
///
/// Returns [`CubeError::InvalidPlayerName`] when the trimmed name has fewer
/// than [`MIN_PLAYER_NAME_LEN`] characters.
pub fn validate_player_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.chars().count() < MIN_PLAYER_NAME_LEN {
        return Err(CubeError::InvalidPlayerName {
            min: MIN_PLAYER_NAME_LEN,
        });
    }
    Ok(name.to_string())
}

// ── Session ─────────────────────────────────────────────────────────

/// The room and seat the server assigned to this client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub room: RoomCode,
    #[serde(rename = "player")]
    pub seat: Seat,
}

impl Session {
    pub fn new(room: RoomCode, seat: Seat) -> Self {
        Self { room, seat }
    }
}

// ── Storage ─────────────────────────────────────────────────────────

/// Durable storage for the persisted session pair.
///
/// Implementations are called from the client's connection task, one call at
/// a time. They should be quick: the task does not process frames while a
/// store call is running.
pub trait SessionStore: Send + 'static {
    /// Read the persisted session, if a complete one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage could not be read. A missing
    /// or incomplete entry is `Ok(None)`, not an error.
    fn load(&self) -> Result<Option<Session>>;

    /// Persist `session`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage could not be written.
    fn save(&mut self, session: &Session) -> Result<()>;

    /// Remove the persisted session. Clearing an empty store is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage could not be modified.
    fn clear(&mut self) -> Result<()>;
}

/// An in-process store.
///
/// Clones share the same slot, so a test can keep one handle while the client
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    slot: Arc<Mutex<Option<Session>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `session`.
    pub fn with_session(session: Session) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(session))),
        }
    }

    /// Current contents.
    pub fn get(&self) -> Option<Session> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<Session>> {
        Ok(self.get())
    }

    fn save(&mut self, session: &Session) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// On-disk layout: two independent entries, either of which may be missing.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedEntries {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    player: Option<u8>,
}

/// A store backed by a small JSON file, surviving process restarts.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<Session>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entries: PersistedEntries = match serde_json::from_str(&text) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), "ignoring unreadable session file: {e}");
                return Ok(None);
            }
        };

        let (Some(room), Some(player)) = (entries.room, entries.player) else {
            debug!(path = %self.path.display(), "session file incomplete");
            return Ok(None);
        };

        match (RoomCode::parse(&room), Seat::try_from(player)) {
            (Ok(room), Ok(seat)) => Ok(Some(Session::new(room, seat))),
            _ => {
                warn!(path = %self.path.display(), "ignoring invalid session entries");
                Ok(None)
            }
        }
    }

    fn save(&mut self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let entries = PersistedEntries {
            room: Some(session.room.to_string()),
            player: Some(session.seat.number()),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&entries)?)?;
        debug!(path = %self.path.display(), room = %session.room, "session persisted");
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
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

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "tictac-cube-{tag}-{}-{}.json",
            std::process::id(),
            rand::random::<u32>()
        ))
    }

    #[test]
    fn room_code_requires_six_characters() {
        for bad in ["", "ABC", "ABCDE", "ABCDEFG", "  AB  "] {
            let err = RoomCode::parse(bad).unwrap_err();
            assert!(matches!(err, CubeError::InvalidRoomCode { expected: 6, .. }));
        }
        assert_eq!(RoomCode::parse(" ab12cd ").unwrap().as_str(), "AB12CD");
    }

    #[test]
    fn room_code_counts_characters_not_bytes() {
        assert!(RoomCode::parse("ÄBCDEF").is_ok());
    }

    #[test]
    fn player_name_requires_two_characters() {
        for bad in ["", " ", "A", " B "] {
            assert!(matches!(
                validate_player_name(bad),
                Err(CubeError::InvalidPlayerName { min: 2 })
            ));
        }
        assert_eq!(validate_player_name("  Ann ").unwrap(), "Ann");
        assert_eq!(validate_player_name("Al").unwrap(), "Al");
    }

    #[test]
    fn memory_store_clones_share_state() {
        let observer = MemorySessionStore::new();
        let mut store = observer.clone();
        let session = Session::new(RoomCode::parse("AB12CD").unwrap(), Seat::Second);

        store.save(&session).unwrap();
        assert_eq!(observer.get(), Some(session));

        store.clear().unwrap();
        assert_eq!(observer.get(), None);
    }

    #[test]
    fn file_store_round_trips_and_clears() {
        let path = temp_path("roundtrip");
        let mut store = FileSessionStore::new(&path);
        assert_eq!(store.load().unwrap(), None);

        let session = Session::new(RoomCode::parse("AB12CD").unwrap(), Seat::Second);
        store.save(&session).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({"room": "AB12CD", "player": 1}));

        let reopened = FileSessionStore::new(&path);
        assert_eq!(reopened.load().unwrap(), Some(session));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn file_store_ignores_partial_entries() {
        let path = temp_path("partial");
        std::fs::write(&path, r#"{"room": "AB12CD"}"#).unwrap();
        assert_eq!(FileSessionStore::new(&path).load().unwrap(), None);

        std::fs::write(&path, r#"{"room": "AB12CD", "player": 7}"#).unwrap();
        assert_eq!(FileSessionStore::new(&path).load().unwrap(), None);

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(FileSessionStore::new(&path).load().unwrap(), None);

        std::fs::remove_file(&path).unwrap();
    }
}
