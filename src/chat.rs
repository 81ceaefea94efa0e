//! Bounded chat history.
//!
//! The log is a display cache: it is never sent back to the server and is
//! lost when the client stops.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::protocol::Seat;

/// Maximum number of entries kept in a [`ChatLog`].
pub const CHAT_LOG_CAPACITY: usize = 50;

/// Who produced a chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOrigin {
    /// Generated by the client from a game event.
    System,
    /// A move announcement, attributed to the seat that played it.
    Move { seat: Seat },
    /// Chat text from another player.
    Opponent { name: String },
    /// Chat text this client sent.
    Own,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub origin: ChatOrigin,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ChatEntry {
    /// Text as shown in the chat panel, prefixed with the speaker.
    pub fn display_text(&self) -> String {
        match &self.origin {
            ChatOrigin::System | ChatOrigin::Move { .. } => self.text.clone(),
            ChatOrigin::Opponent { name } => format!("{name}: {}", self.text),
            ChatOrigin::Own => format!("You: {}", self.text),
        }
    }
}

/// Ordered chat entries, oldest first, capped at [`CHAT_LOG_CAPACITY`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatLog {
    entries: VecDeque<ChatEntry>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, evicting the oldest one when full.
    pub fn push(&mut self, origin: ChatOrigin, text: impl Into<String>, at: DateTime<Utc>) {
        if self.entries.len() == CHAT_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(ChatEntry {
            origin,
            text: text.into(),
            at,
        });
    }

    pub fn system(&mut self, text: impl Into<String>, at: DateTime<Utc>) {
        self.push(ChatOrigin::System, text, at);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&ChatEntry> {
        self.entries.back()
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
    fn fifty_first_entry_evicts_oldest() {
        let now = Utc::now();
        let mut log = ChatLog::new();
        for i in 0..CHAT_LOG_CAPACITY {
            log.system(format!("line {i}"), now);
        }
        assert_eq!(log.len(), 50);
        assert_eq!(log.iter().next().unwrap().text, "line 0");

        log.system("line 50", now);
        assert_eq!(log.len(), 50);
        assert_eq!(log.iter().next().unwrap().text, "line 1");
        assert_eq!(log.last().unwrap().text, "line 50");
    }

    #[test]
    fn never_exceeds_capacity() {
        let now = Utc::now();
        let mut log = ChatLog::new();
        for i in 0..500 {
            log.push(ChatOrigin::Own, i.to_string(), now);
            assert!(log.len() <= CHAT_LOG_CAPACITY);
        }
    }

    #[test]
    fn display_text_prefixes_speaker() {
        let now = Utc::now();
        let mut log = ChatLog::new();
        log.push(ChatOrigin::Opponent { name: "Ann".into() }, "hi", now);
        log.push(ChatOrigin::Own, "hello", now);
        log.system("Room created.", now);
        log.push(ChatOrigin::Move { seat: Seat::Second }, "Player O moved at (1,1,1)", now);
        let lines: Vec<_> = log.iter().map(ChatEntry::display_text).collect();
        assert_eq!(
            lines,
            ["Ann: hi", "You: hello", "Room created.", "Player O moved at (1,1,1)"]
        );
    }
}
