//! Async client for the tic-tac-cube room protocol.
//!
//! [`CubeClient`] is a thin handle. Its methods validate input against the
//! latest published [`SessionState`] and queue requests on an unbounded MPSC
//! channel to a background connection task. That task owns the transport, the
//! session store and the state; it runs every input through
//! [`reduce`](crate::state::reduce), publishes the result on a
//! [`watch`](tokio::sync::watch) channel and reports [`CubeEvent`]s on the
//! bounded channel returned from [`CubeClient::start`].
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), tictac_cube_client::CubeError> {
//! use tictac_cube_client::{
//!     CubeClient, CubeConfig, CubeEvent, MemorySessionStore, WebSocketConnector,
//! };
//!
//! let connector = WebSocketConnector::new("ws://localhost:5000/ws");
//! let (client, mut events) =
//!     CubeClient::start(connector, CubeConfig::new(), MemorySessionStore::new());
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         CubeEvent::Connected => client.create_game("Ann")?,
//!         CubeEvent::StateChanged(state) => println!("{:?}", state.phase),
//!         CubeEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::error::{CubeError, Result};
use crate::event::CubeEvent;
use crate::protocol::{ClientMessage, Coord, Seat, ServerMessage};
use crate::reconnect::ReconnectPolicy;
use crate::session::{validate_player_name, RoomCode, SessionStore};
use crate::state::{reduce, Action, Effect, SessionState, Transition};
use crate::transport::{Connector, Transport};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound (exclusive) for the number in a generated quick-create name.
const QUICK_NAME_RANGE: u32 = 1000;

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`CubeClient`].
///
/// ```
/// use std::time::Duration;
/// use tictac_cube_client::{CubeConfig, ReconnectPolicy};
///
/// let config = CubeConfig::new()
///     .with_event_channel_capacity(64)
///     .with_shutdown_timeout(Duration::from_secs(2))
///     .with_reconnect_policy(ReconnectPolicy::new().with_max_attempts(3));
/// assert_eq!(config.event_channel_capacity, 64);
/// assert_eq!(config.reconnect.max_attempts, 3);
/// ```
#[derive(Debug, Clone)]
pub struct CubeConfig {
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer falls behind, events are dropped with a warning
    /// rather than stalling the connection task. `Disconnected` is always
    /// delivered. Defaults to **256**; values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`CubeClient::shutdown`] waits for the connection task before
    /// aborting it. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Retry behavior for failed connects and dropped connections.
    pub reconnect: ReconnectPolicy,
}

impl Default for CubeConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl CubeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the event channel capacity. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the graceful shutdown timeout. Zero aborts immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

// ── Commands ────────────────────────────────────────────────────────

/// Requests from the handle to the connection task.
#[derive(Debug)]
enum Command {
    /// Forward a frame to the server.
    Send(ClientMessage),
    /// Run a local action through the reducer.
    Apply(Action),
    /// Leave the room and recycle the connection.
    Leave,
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running tic-tac-cube client.
///
/// Request methods return as soon as the request is queued; the outcome
/// arrives later as a state change. Requests that client-side checks can
/// already refuse fail synchronously with a local-validation [`CubeError`]
/// and also leave an error notice in the state.
pub struct CubeClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<SessionState>,
    connected: Arc<AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl CubeClient {
    /// Spawn the connection task and return a handle plus the event receiver.
    ///
    /// The persisted session is read from `store` first; if one exists the
    /// client asks the server to rejoin it as soon as a connection is open.
    /// Must be called from within a Tokio runtime.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start<C, S>(
        connector: C,
        config: CubeConfig,
        store: S,
    ) -> (Self, mpsc::Receiver<CubeEvent>)
    where
        C: Connector,
        S: SessionStore,
    {
        let persisted = match store.load() {
            Ok(session) => session,
            Err(e) => {
                warn!("could not read persisted session: {e}");
                None
            }
        };
        if let Some(session) = &persisted {
            debug!(room = %session.room, seat = ?session.seat, "found persisted session");
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        // tokio panics on a zero-capacity channel.
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(SessionState::with_persisted(persisted));
        let connected = Arc::new(AtomicBool::new(false));

        let driver = Driver {
            store,
            policy: config.reconnect,
            cmd_rx,
            shutdown_rx,
            event_tx,
            state_tx,
            connected: Arc::clone(&connected),
        };
        let task = tokio::spawn(driver.run(connector));

        let client = Self {
            cmd_tx,
            state_rx,
            connected,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        (client, event_rx)
    }

    // ── Requests ────────────────────────────────────────────────────

    /// Open a new room; the server seats this client first.
    ///
    /// # Errors
    ///
    /// [`CubeError::InvalidPlayerName`] for names shorter than two characters,
    /// [`CubeError::NotConnected`] while no connection is open.
    pub fn create_game(&self, player_name: &str) -> Result<()> {
        let player_name = self.checked(validate_player_name(player_name))?;
        self.send(ClientMessage::CreateGame { player_name })
    }

    /// Like [`create_game`](Self::create_game), generating a `Player_<n>` name
    /// when `player_name` is blank.
    ///
    /// # Errors
    ///
    /// As for [`create_game`](Self::create_game).
    pub fn quick_create_game(&self, player_name: &str) -> Result<()> {
        if player_name.trim().is_empty() {
            let generated = format!("Player_{}", rand::random_range(0..QUICK_NAME_RANGE));
            return self.create_game(&generated);
        }
        self.create_game(player_name)
    }

    /// Join an existing room by code. The code is trimmed and upper-cased.
    ///
    /// # Errors
    ///
    /// [`CubeError::InvalidPlayerName`], [`CubeError::InvalidRoomCode`] or
    /// [`CubeError::NotConnected`].
    pub fn join_game(&self, room: &str, player_name: &str) -> Result<()> {
        let player_name = self.checked(validate_player_name(player_name))?;
        let room = self.checked(RoomCode::parse(room))?;
        self.send(ClientMessage::JoinGame { room, player_name })
    }

    /// Place a mark at `coord`.
    ///
    /// # Errors
    ///
    /// [`CubeError::NotInRoom`], [`CubeError::Rejoining`],
    /// [`CubeError::NoGame`], [`CubeError::GameOver`] or
    /// [`CubeError::NotYourTurn`] from the local pre-check, or
    /// [`CubeError::NotConnected`].
    pub fn make_move(&self, coord: Coord) -> Result<()> {
        let checked = self.state_rx.borrow().check_move(coord);
        let msg = self.checked(checked)?;
        self.send(msg)
    }

    /// Ask the server for a new round.
    ///
    /// # Errors
    ///
    /// [`CubeError::NotInRoom`] or [`CubeError::NotConnected`].
    pub fn reset_game(&self) -> Result<()> {
        let in_room = self.state_rx.borrow().room().is_some();
        self.checked(if in_room { Ok(()) } else { Err(CubeError::NotInRoom) })?;
        self.send(ClientMessage::ResetGame {})
    }

    /// Send chat text to the room and echo it locally.
    ///
    /// # Errors
    ///
    /// [`CubeError::EmptyChatMessage`], [`CubeError::NotInRoom`] or
    /// [`CubeError::NotConnected`].
    pub fn send_chat(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return self.checked(Err(CubeError::EmptyChatMessage));
        }
        let room = self.state_rx.borrow().room().cloned();
        let room = self.checked(room.ok_or(CubeError::NotInRoom))?;
        self.send(ClientMessage::ChatMessage {
            message: text.to_string(),
            room,
        })?;
        self.queue(Command::Apply(Action::ChatSent {
            text: text.to_string(),
        }))
    }

    /// Leave the room: forget the session (including the persisted copy),
    /// close the connection and open a fresh one.
    ///
    /// Works while offline too.
    ///
    /// # Errors
    ///
    /// [`CubeError::NotConnected`] once the client has stopped.
    pub fn leave_game(&self) -> Result<()> {
        self.queue(Command::Leave)
    }

    /// Stop the client: close the transport and end the connection task.
    ///
    /// The event receiver yields `Disconnected` and then `None`.
    pub async fn shutdown(&mut self) {
        debug!("CubeClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("connection task terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("connection task did not exit within timeout; aborting");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("connection task aborted: {join_err}");
                    }
                }
            }
        }

        self.connected.store(false, Ordering::Release);
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// `true` while a transport is open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// A copy of the latest published state.
    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// A receiver that observes every published state.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    pub fn current_room(&self) -> Option<RoomCode> {
        self.state_rx.borrow().room().cloned()
    }

    pub fn local_seat(&self) -> Option<Seat> {
        self.state_rx.borrow().local_seat()
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Pass `result` through, recording a local rejection as a notice.
    fn checked<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_local_rejection() {
                debug!("request rejected locally: {e}");
                let _ = self.cmd_tx.send(Command::Apply(Action::Rejected {
                    reason: e.to_string(),
                }));
            }
        }
        result
    }

    fn send(&self, msg: ClientMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(CubeError::NotConnected);
        }
        self.queue(Command::Send(msg))
    }

    fn queue(&self, cmd: Command) -> Result<()> {
        self.cmd_tx.send(cmd).map_err(|_| CubeError::NotConnected)
    }
}

impl std::fmt::Debug for CubeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CubeClient")
            .field("connected", &self.is_connected())
            .field("room", &self.current_room())
            .field("seat", &self.local_seat())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for CubeClient {
    fn drop(&mut self) {
        // No executor to drive a graceful close here; just stop the task.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Connection task ─────────────────────────────────────────────────

/// Why a live connection ended.
enum Exit {
    Shutdown,
    Left,
    Lost(Option<String>),
}

/// Outcome of waiting while no transport is open.
enum Idle {
    Elapsed,
    Shutdown,
    Left,
}

const SHUTDOWN_REASON: &str = "client shut down";

/// State owned by the background task.
///
/// The connector is passed to [`run`](Self::run) separately so that commands
/// can be handled while a connect attempt is pending.
struct Driver<S> {
    store: S,
    policy: ReconnectPolicy,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    shutdown_rx: oneshot::Receiver<()>,
    event_tx: mpsc::Sender<CubeEvent>,
    state_tx: watch::Sender<SessionState>,
    connected: Arc<AtomicBool>,
}

impl<S: SessionStore> Driver<S> {
    /// Connect, serve, and reconnect until shut down or out of attempts.
    async fn run<C: Connector>(mut self, mut connector: C) {
        debug!("connection task started");
        let mut attempt: u32 = 0;
        let mut last_failure: Option<String> = None;

        let reason = loop {
            if attempt > 0 {
                if !self.policy.allows(attempt) {
                    let tried = attempt - 1;
                    let cause = last_failure.as_deref().unwrap_or("connection failed");
                    warn!(attempts = tried, "giving up on reconnecting: {cause}");
                    break Some(format!("gave up after {tried} reconnection attempts: {cause}"));
                }
                let delay = self.policy.delay_for(attempt);
                warn!(attempt, ?delay, "reconnecting");
                self.emit(CubeEvent::Reconnecting { attempt, delay });
                match self.idle(delay).await {
                    Idle::Elapsed => {}
                    Idle::Shutdown => break Some(SHUTDOWN_REASON.into()),
                    Idle::Left => attempt = 0,
                }
            }

            let Some(opened) = self.connecting(&mut connector).await else {
                break Some(SHUTDOWN_REASON.into());
            };
            let mut transport = match opened {
                Ok(transport) => transport,
                Err(e) => {
                    warn!(attempt, "connect failed: {e}");
                    last_failure = Some(e.to_string());
                    attempt += 1;
                    continue;
                }
            };

            attempt = 0;
            match self.serve(&mut transport).await {
                Exit::Shutdown => break Some(SHUTDOWN_REASON.into()),
                Exit::Left => {}
                Exit::Lost(reason) => {
                    self.emit(CubeEvent::ConnectionLost {
                        reason: reason.clone(),
                    });
                    self.apply(Action::ConnectionLost {
                        reason: reason.clone(),
                    });
                    last_failure = reason;
                    attempt = 1;
                }
            }
        };

        self.finish(reason).await;
        debug!("connection task exited");
    }

    /// Run one connect attempt, handling commands until it settles.
    ///
    /// Returns `None` on shutdown. A leave while connecting takes effect
    /// before the connection is served, so the fresh connection carries no
    /// session to rejoin.
    async fn connecting<C: Connector>(
        &mut self,
        connector: &mut C,
    ) -> Option<Result<C::Transport>> {
        let attempt = tokio::time::timeout(self.policy.connect_timeout, connector.connect());
        tokio::pin!(attempt);
        loop {
            tokio::select! {
                result = &mut attempt => {
                    return Some(result.unwrap_or_else(|_| Err(CubeError::Timeout)));
                }
                _ = &mut self.shutdown_rx => return None,
                cmd = self.cmd_rx.recv() => match self.offline(cmd) {
                    Some(Idle::Shutdown) => return None,
                    Some(Idle::Left) => debug!("left the room while connecting"),
                    Some(Idle::Elapsed) | None => {}
                }
            }
        }
    }

    /// Multiplex one live connection until it ends.
    async fn serve<T: Transport>(&mut self, transport: &mut T) -> Exit {
        self.connected.store(true, Ordering::Release);
        info!("connected to server");
        self.emit(CubeEvent::Connected);

        let outbound = self.apply(Action::Connected);
        if let Err(e) = send_all(transport, outbound).await {
            return self.lost(e);
        }

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let outbound = match cmd {
                        Some(Command::Send(msg)) => vec![msg],
                        Some(Command::Apply(action)) => self.apply(action),
                        Some(Command::Leave) => {
                            self.apply(Action::Left);
                            self.close(transport).await;
                            return Exit::Left;
                        }
                        // Handle dropped.
                        None => {
                            debug!("command channel closed");
                            self.close(transport).await;
                            return Exit::Shutdown;
                        }
                    };
                    if let Err(e) = send_all(transport, outbound).await {
                        return self.lost(e);
                    }
                }

                _ = &mut self.shutdown_rx => {
                    debug!("shutdown signal received");
                    self.close(transport).await;
                    return Exit::Shutdown;
                }

                incoming = transport.recv() => match incoming {
                    Some(Ok(text)) => {
                        let outbound = self.receive(&text);
                        if let Err(e) = send_all(transport, outbound).await {
                            return self.lost(e);
                        }
                    }
                    Some(Err(e)) => return self.lost(e),
                    None => {
                        debug!("transport closed by server");
                        self.connected.store(false, Ordering::Release);
                        return Exit::Lost(None);
                    }
                }
            }
        }
    }

    /// Wait out a backoff delay while still honoring local commands.
    async fn idle(&mut self, delay: Duration) -> Idle {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return Idle::Elapsed,
                _ = &mut self.shutdown_rx => return Idle::Shutdown,
                cmd = self.cmd_rx.recv() => {
                    if let Some(idle) = self.offline(cmd) {
                        return idle;
                    }
                }
            }
        }
    }

    /// Handle a command while no transport is open. `Some` ends the wait.
    fn offline(&mut self, cmd: Option<Command>) -> Option<Idle> {
        match cmd {
            Some(Command::Send(msg)) => {
                warn!(event = msg.event_name(), "dropping request queued while offline");
                None
            }
            Some(Command::Apply(action)) => {
                for msg in self.apply(action) {
                    debug!(event = msg.event_name(), "offline, not sending");
                }
                None
            }
            Some(Command::Leave) => {
                self.apply(Action::Left);
                Some(Idle::Left)
            }
            None => Some(Idle::Shutdown),
        }
    }

    /// Decode one inbound frame and run it through the reducer.
    fn receive(&mut self, text: &str) -> Vec<ClientMessage> {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(msg) => {
                debug!(event = msg.event_name(), "received server message");
                self.emit(CubeEvent::Server(msg.clone()));
                self.apply(Action::Server(msg))
            }
            Err(e) => {
                warn!("skipping undecodable server frame: {e} (raw: {text})");
                Vec::new()
            }
        }
    }

    /// Reduce, run storage effects, publish, and return frames to send.
    fn apply(&mut self, action: Action) -> Vec<ClientMessage> {
        let Transition { state, effects } = {
            let current = self.state_tx.borrow();
            reduce(&current, action, Utc::now())
        };

        let mut outbound = Vec::new();
        for effect in effects {
            match effect {
                Effect::Send(msg) => outbound.push(msg),
                Effect::Persist(session) => {
                    if let Err(e) = self.store.save(&session) {
                        warn!("failed to persist session: {e}");
                    }
                }
                Effect::ClearPersisted => {
                    if let Err(e) = self.store.clear() {
                        warn!("failed to clear persisted session: {e}");
                    }
                }
            }
        }

        debug!(phase = ?state.phase, "state updated");
        self.state_tx.send_replace(state.clone());
        self.emit(CubeEvent::StateChanged(Box::new(state)));
        outbound
    }

    fn lost(&mut self, e: CubeError) -> Exit {
        error!("connection lost: {e}");
        self.connected.store(false, Ordering::Release);
        Exit::Lost(Some(e.to_string()))
    }

    async fn close<T: Transport>(&mut self, transport: &mut T) {
        self.connected.store(false, Ordering::Release);
        if let Err(e) = transport.close().await {
            debug!("transport close failed: {e}");
        }
    }

    /// Emit an event, dropping it with a warning if the channel is full.
    fn emit(&self, event: CubeEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!("event channel full, dropping {} event", dropped.kind());
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    /// Publish the final state and deliver `Disconnected`.
    ///
    /// Uses `send().await` because this is the last event and must not be
    /// dropped.
    async fn finish(&mut self, reason: Option<String>) {
        self.connected.store(false, Ordering::Release);
        self.state_tx.send_modify(|state| state.connected = false);
        if self
            .event_tx
            .send(CubeEvent::Disconnected { reason })
            .await
            .is_err()
        {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Serialize and send `messages` in order.
async fn send_all<T: Transport>(transport: &mut T, messages: Vec<ClientMessage>) -> Result<()> {
    for msg in messages {
        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
                error!(event = msg.event_name(), "failed to serialize client message: {e}");
                continue;
            }
        };
        debug!(event = msg.event_name(), "sending client message");
        transport.send(json).await?;
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use crate::session::MemorySessionStore;
    use crate::state::{NoticeLevel, Phase};
    use crate::transport::Preconnected;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// Replays scripted frames, records sent ones, then pends forever.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, CubeError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
    }

    impl MockTransport {
        fn new(frames: &[&str]) -> (Self, Arc<StdMutex<Vec<String>>>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let transport = Self {
                incoming: frames.iter().map(|f| Some(Ok((*f).to_string()))).collect(),
                sent: Arc::clone(&sent),
            };
            (transport, sent)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), CubeError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, CubeError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), CubeError> {
            Ok(())
        }
    }

    const JOINED_SECOND: &str = r#"{"event":"player_joined_self","data":{
        "player_number":1,"room":"AB12CD",
        "game_state":{"board":[[[0,0,0,0],[0,0,0,0],[0,0,0,0],[0,0,0,0]],
                               [[0,0,0,0],[0,0,0,0],[0,0,0,0],[0,0,0,0]],
                               [[0,0,0,0],[0,0,0,0],[0,0,0,0],[0,0,0,0]],
                               [[0,0,0,0],[0,0,0,0],[0,0,0,0],[0,0,0,0]]],
                      "current_player":0,"players":[],"winner":null,
                      "game_over":false,"winning_cells":[]}}}"#;

    fn quiet_config() -> CubeConfig {
        CubeConfig::new()
            .with_shutdown_timeout(Duration::from_millis(200))
            .with_reconnect_policy(ReconnectPolicy::disabled())
    }

    async fn wait_for_state(
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

    // ── Configuration ───────────────────────────────────────────────

    #[test]
    fn config_defaults() {
        let config = CubeConfig::default();
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = CubeConfig::new().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    #[tokio::test]
    async fn connected_is_first_event() {
        let (transport, _sent) = MockTransport::new(&[]);
        let (mut client, mut events) =
            CubeClient::start(Preconnected::new(transport), quiet_config(), MemorySessionStore::new());

        assert!(matches!(events.recv().await.unwrap(), CubeEvent::Connected));
        assert!(client.is_connected());
        client.shutdown().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn shutdown_emits_disconnected_last() {
        let (transport, _sent) = MockTransport::new(&[]);
        let (mut client, mut events) =
            CubeClient::start(Preconnected::new(transport), quiet_config(), MemorySessionStore::new());
        let _ = events.recv().await;

        client.shutdown().await;

        let mut last = None;
        while let Some(event) = events.recv().await {
            last = Some(event);
        }
        match last {
            Some(CubeEvent::Disconnected { reason }) => {
                assert_eq!(reason.as_deref(), Some(SHUTDOWN_REASON));
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn requests_fail_after_shutdown() {
        let (transport, _sent) = MockTransport::new(&[]);
        let (mut client, mut events) =
            CubeClient::start(Preconnected::new(transport), quiet_config(), MemorySessionStore::new());
        let _ = events.recv().await;
        client.shutdown().await;

        assert!(matches!(client.create_game("Ann"), Err(CubeError::NotConnected)));
        // Double shutdown is harmless.
        client.shutdown().await;
    }

    // ── Validation ──────────────────────────────────────────────────

    #[tokio::test]
    async fn invalid_requests_are_rejected_locally_and_noticed() {
        let (transport, sent) = MockTransport::new(&[]);
        let (mut client, mut events) =
            CubeClient::start(Preconnected::new(transport), quiet_config(), MemorySessionStore::new());
        let _ = events.recv().await;

        assert!(matches!(
            client.create_game(" A "),
            Err(CubeError::InvalidPlayerName { min: 2 })
        ));
        assert!(matches!(
            client.join_game("ABC", "Bob"),
            Err(CubeError::InvalidRoomCode { found: 3, .. })
        ));
        assert!(matches!(client.send_chat("   "), Err(CubeError::EmptyChatMessage)));
        assert!(matches!(client.reset_game(), Err(CubeError::NotInRoom)));

        let state = wait_for_state(&client, |s| {
            s.notice
                .as_ref()
                .is_some_and(|n| n.text == CubeError::NotInRoom.to_string())
        })
        .await;
        assert_eq!(state.notice.unwrap().level, NoticeLevel::Error);
        assert!(sent.lock().unwrap().is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn move_out_of_turn_is_not_sent() {
        let (transport, sent) = MockTransport::new(&[JOINED_SECOND]);
        let (mut client, _events) =
            CubeClient::start(Preconnected::new(transport), quiet_config(), MemorySessionStore::new());

        wait_for_state(&client, |s| s.phase == Phase::Active).await;
        assert_eq!(client.local_seat(), Some(Seat::Second));

        let coord = Coord::new(0, 0, 0).unwrap();
        assert!(matches!(client.make_move(coord), Err(CubeError::NotYourTurn)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sent.lock().unwrap().is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn quick_create_generates_a_name_when_blank() {
        let (transport, sent) = MockTransport::new(&[]);
        let (mut client, mut events) =
            CubeClient::start(Preconnected::new(transport), quiet_config(), MemorySessionStore::new());
        let _ = events.recv().await;

        client.quick_create_game("  ").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let frames = sent.lock().unwrap().clone();
        let msg: ClientMessage = serde_json::from_str(&frames[0]).unwrap();
        match msg {
            ClientMessage::CreateGame { player_name } => {
                let n: u32 = player_name.strip_prefix("Player_").unwrap().parse().unwrap();
                assert!(n < QUICK_NAME_RANGE);
            }
            other => panic!("expected create_game, got {other:?}"),
        }

        client.shutdown().await;
    }

    // ── Backpressure ────────────────────────────────────────────────

    #[tokio::test]
    async fn full_event_channel_drops_events_without_blocking() {
        let chat = r#"{"event":"chat_message","data":{"message":"hi","player_name":"Bob"}}"#;
        let frames = vec![chat; 20];
        let (transport, _sent) = MockTransport::new(&frames);
        let config = quiet_config().with_event_channel_capacity(1);
        let (mut client, mut events) =
            CubeClient::start(Preconnected::new(transport), config, MemorySessionStore::new());

        // The task keeps reducing even though nobody drains events.
        wait_for_state(&client, |s| s.chat.len() == 20).await;
        client.shutdown().await;

        let mut count = 0;
        while events.recv().await.is_some() {
            count += 1;
        }
        // One buffered event plus the final Disconnected.
        assert!(count <= 2, "expected dropped events, got {count}");
    }

    // ── Shutdown timeout ────────────────────────────────────────────

    /// Transport whose `close` never completes.
    struct HangingCloseTransport {
        dropped: Arc<AtomicBool>,
    }

    impl Drop for HangingCloseTransport {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    #[async_trait]
    impl Transport for HangingCloseTransport {
        async fn send(&mut self, _message: String) -> std::result::Result<(), CubeError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, CubeError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), CubeError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn shutdown_timeout_aborts_stuck_task() {
        let dropped = Arc::new(AtomicBool::new(false));
        let transport = HangingCloseTransport {
            dropped: Arc::clone(&dropped),
        };
        let config = quiet_config().with_shutdown_timeout(Duration::from_millis(20));
        let (mut client, mut events) =
            CubeClient::start(Preconnected::new(transport), config, MemorySessionStore::new());
        assert!(matches!(events.recv().await.unwrap(), CubeEvent::Connected));

        client.shutdown().await;

        assert!(dropped.load(Ordering::Acquire), "aborted task should drop the transport");
        assert!(!client.is_connected());
    }
}
