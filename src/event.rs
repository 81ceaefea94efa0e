//! Events emitted by [`CubeClient`](crate::CubeClient).

use std::time::Duration;

use crate::protocol::ServerMessage;
use crate::state::SessionState;

/// Everything the client reports on its event channel.
///
/// For each decoded frame the client emits [`Server`](Self::Server) with the
/// raw message, followed by [`StateChanged`](Self::StateChanged) with the
/// state it produced. [`Disconnected`](Self::Disconnected) is always the last
/// event.
#[derive(Debug, Clone)]
pub enum CubeEvent {
    /// A transport was opened.
    Connected,
    /// A connection attempt failed or a live connection dropped; the client
    /// waits `delay` and then makes attempt number `attempt`.
    Reconnecting { attempt: u32, delay: Duration },
    /// The live connection dropped.
    ConnectionLost { reason: Option<String> },
    /// A decoded server message.
    Server(ServerMessage),
    /// The session state after a transition.
    StateChanged(Box<SessionState>),
    /// The client stopped: shut down, dropped, or out of reconnect attempts.
    Disconnected { reason: Option<String> },
}

impl CubeEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::ConnectionLost { .. } => "connection_lost",
            Self::Server(msg) => msg.event_name(),
            Self::StateChanged(_) => "state_changed",
            Self::Disconnected { .. } => "disconnected",
        }
    }
}
