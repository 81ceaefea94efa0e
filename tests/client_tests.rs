//! End-to-end client tests against scripted servers.
//!
//! Each test drives a real `CubeClient` through `MockConnector`, pushing
//! server frames with a `ServerSide` handle and checking the frames the
//! client sends, the published state, the session store and the events.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]

mod common;

use std::time::Duration;

use tictac_cube_client::state::NoticeLevel;
use tictac_cube_client::{
    ChatOrigin, ClientMessage, Coord, CubeClient, CubeConfig, CubeError, CubeEvent,
    MemorySessionStore, Phase, ReconnectPolicy, RoomCode, Seat, Session,
};
use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

use common::{
    chat_frame, connected_frame, error_frame, game_created_frame, game_draw_frame,
    game_over_frame, game_reset_frame, init_tracing, joined_all_frame, joined_self_frame,
    live_transport, move_made_frame, next_matching, player_left_frame, player_reconnected_frame,
    rejoin_failed_frame, rejoin_ok_frame, wait_for_sent, wait_for_state, Attempt, MockConnector,
    MockTransport, ServerSide,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

const ANN_AND_BOB: &[(&str, u8)] = &[("Ann", 0), ("Bob", 1)];

fn room(code: &str) -> RoomCode {
    RoomCode::parse(code).unwrap()
}

fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy::new()
        .with_max_attempts(max_attempts)
        .with_base_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(20))
        .with_connect_timeout(Duration::from_millis(500))
}

fn config(max_attempts: u32) -> CubeConfig {
    CubeConfig::new()
        .with_shutdown_timeout(Duration::from_millis(200))
        .with_reconnect_policy(fast_policy(max_attempts))
}

/// Start a client on one live connection with the given store.
async fn start_live(store: MemorySessionStore) -> (CubeClient, mpsc::Receiver<CubeEvent>, ServerSide) {
    init_tracing();
    let (transport, server) = live_transport();
    let (connector, _calls) = MockConnector::new(vec![Attempt::open(transport)]);
    let (client, mut events) = CubeClient::start(connector, config(0), store);
    next_matching(&mut events, |e| matches!(e, CubeEvent::Connected)).await;
    server.push(connected_frame());
    (client, events, server)
}

/// Start a client and seat it in `AB12CD` with the given seat.
async fn start_seated(
    seat: u8,
    store: MemorySessionStore,
) -> (CubeClient, mpsc::Receiver<CubeEvent>, ServerSide) {
    let (client, events, server) = start_live(store).await;
    server.push(joined_self_frame("AB12CD", seat, ANN_AND_BOB));
    wait_for_state(&client, |s| s.phase == Phase::Active).await;
    (client, events, server)
}

// ════════════════════════════════════════════════════════════════════
// Joining and creating
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn join_takes_second_seat_and_persists_it() {
    let store = MemorySessionStore::new();
    let (mut client, _events, server) = start_live(store.clone()).await;

    assert_ok!(client.join_game(" ab12cd ", "  Bob "));
    let sent = wait_for_sent(&server.sent, 1).await;
    assert_eq!(
        sent[0],
        ClientMessage::JoinGame {
            room: room("AB12CD"),
            player_name: "Bob".into(),
        }
    );

    server.push(joined_self_frame("AB12CD", 1, &[("Ann", 0)]));
    let state = wait_for_state(&client, |s| s.phase == Phase::Active).await;

    assert_eq!(state.local_seat(), Some(Seat::Second));
    assert_eq!(client.current_room(), Some(room("AB12CD")));
    assert_eq!(store.get(), Some(Session::new(room("AB12CD"), Seat::Second)));

    client.shutdown().await;
}

#[tokio::test]
async fn create_seats_first_and_announces_opponent() {
    let store = MemorySessionStore::new();
    let (mut client, _events, server) = start_live(store.clone()).await;

    assert_err!(client.create_game("A"));
    assert_ok!(client.create_game("Ann"));
    let sent = wait_for_sent(&server.sent, 1).await;
    assert_eq!(
        sent[0],
        ClientMessage::CreateGame {
            player_name: "Ann".into()
        }
    );

    server.push(game_created_frame("QW12ER", "Ann"));
    wait_for_state(&client, |s| s.phase == Phase::Active).await;
    assert_eq!(client.local_seat(), Some(Seat::First));
    assert_eq!(store.get(), Some(Session::new(room("QW12ER"), Seat::First)));

    server.push(joined_all_frame("Bob", ANN_AND_BOB));
    let state = wait_for_state(&client, |s| {
        s.chat.last().is_some_and(|e| e.text == "Bob joined the game!")
    })
    .await;
    assert_eq!(
        state.snapshot.unwrap().player_name(Seat::Second),
        Some("Bob")
    );

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Moves
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn moves_are_gated_by_the_snapshot_turn() {
    let (mut client, _events, server) = start_seated(1, MemorySessionStore::new()).await;
    let coord = Coord::new(1, 2, 3).unwrap();

    // First seat is to move.
    assert!(matches!(client.make_move(coord), Err(CubeError::NotYourTurn)));

    server.push(move_made_frame(0, [0, 0, 0], 1, ANN_AND_BOB));
    let state = wait_for_state(&client, |s| s.is_my_turn()).await;
    assert_eq!(
        state.chat.last().unwrap().text,
        "Player X moved at (1,1,1)"
    );

    client.make_move(coord).unwrap();
    let sent = wait_for_sent(&server.sent, 1).await;
    assert_eq!(sent[0], ClientMessage::MakeMove { z: 1, y: 2, x: 3 });

    client.shutdown().await;
}

#[tokio::test]
async fn moves_are_refused_after_game_over() {
    let (mut client, _events, server) = start_seated(0, MemorySessionStore::new()).await;

    let line = [[0, 0, 0], [1, 1, 1], [2, 2, 2], [3, 3, 3]];
    server.push(game_over_frame(1, "Bob", &line, ANN_AND_BOB));
    wait_for_state(&client, |s| s.snapshot.as_ref().is_some_and(|g| g.game_over)).await;

    let coord = Coord::new(0, 1, 0).unwrap();
    assert!(matches!(client.make_move(coord), Err(CubeError::GameOver)));

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Results and scoring
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn game_over_highlights_line_and_scores_once() {
    let (mut client, _events, server) = start_seated(1, MemorySessionStore::new()).await;

    let line: [[u8; 3]; 4] = [[0, 0, 0], [0, 0, 1], [0, 0, 2], [0, 0, 3]];
    server.push(game_over_frame(0, "Ann", &line, ANN_AND_BOB));
    server.push(game_over_frame(0, "Ann", &line, ANN_AND_BOB));
    // A later frame marks the point where both deliveries were processed.
    server.push(chat_frame("Ann", "gg"));

    let state = wait_for_state(&client, |s| {
        s.chat.last().is_some_and(|e| e.text == "gg")
    })
    .await;

    assert_eq!(state.scores.wins(Seat::First), 1);
    assert_eq!(state.scores.wins(Seat::Second), 0);
    let expected: Vec<_> = line
        .iter()
        .map(|[z, y, x]| Coord::new((*z).into(), (*y).into(), (*x).into()).unwrap())
        .collect();
    assert_eq!(state.winning_cells, expected);

    client.shutdown().await;
}

#[tokio::test]
async fn reset_clears_highlight_and_next_result_counts() {
    let (mut client, _events, server) = start_seated(0, MemorySessionStore::new()).await;

    let line = [[3, 0, 0], [3, 1, 0], [3, 2, 0], [3, 3, 0]];
    server.push(game_over_frame(0, "Ann", &line, ANN_AND_BOB));
    wait_for_state(&client, |s| s.scores.wins(Seat::First) == 1).await;

    client.reset_game().unwrap();
    let sent = wait_for_sent(&server.sent, 1).await;
    assert_eq!(sent[0], ClientMessage::ResetGame {});

    server.push(game_reset_frame(ANN_AND_BOB));
    let state = wait_for_state(&client, |s| s.scores.round() == 1).await;
    assert!(state.winning_cells.is_empty());

    server.push(game_over_frame(0, "Ann", &line, ANN_AND_BOB));
    // A draw delivered in the same round is not scored again.
    server.push(game_draw_frame(ANN_AND_BOB));
    let state = wait_for_state(&client, |s| {
        s.notice.as_ref().is_some_and(|n| n.text == "Draw! Nobody wins.")
    })
    .await;
    assert_eq!(state.scores.wins(Seat::First), 2);
    assert_eq!(state.scores.draws, 0);

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Rejoin
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn persisted_session_is_rejoined_on_connect() {
    let store = MemorySessionStore::with_session(Session::new(room("AB12CD"), Seat::Second));
    let (transport, server) = live_transport();
    let (connector, _calls) = MockConnector::new(vec![Attempt::open(transport)]);
    let (mut client, _events) = CubeClient::start(connector, config(0), store.clone());

    let sent = wait_for_sent(&server.sent, 1).await;
    assert_eq!(
        sent[0],
        ClientMessage::RejoinGame {
            room: room("AB12CD"),
            player_number: Seat::Second,
        }
    );
    assert_eq!(client.state().phase, Phase::AwaitingRejoin);

    server.push(rejoin_ok_frame("AB12CD", 1, ANN_AND_BOB));
    let state = wait_for_state(&client, |s| s.phase == Phase::Active).await;
    assert_eq!(state.local_seat(), Some(Seat::Second));
    assert!(state.snapshot.is_some());
    assert_eq!(store.get(), Some(Session::new(room("AB12CD"), Seat::Second)));

    client.shutdown().await;
}

#[tokio::test]
async fn failed_rejoin_returns_to_lobby_and_forgets_session() {
    let store = MemorySessionStore::with_session(Session::new(room("AB12CD"), Seat::Second));
    let (transport, server) = live_transport();
    let (connector, _calls) = MockConnector::new(vec![Attempt::open(transport)]);
    let (mut client, _events) = CubeClient::start(connector, config(0), store.clone());

    wait_for_sent(&server.sent, 1).await;
    server.push(rejoin_failed_frame("Room not found"));

    let state = wait_for_state(&client, |s| s.phase == Phase::Lobby && s.session.is_none()).await;
    assert!(state.snapshot.is_none());
    assert_eq!(state.notice.unwrap().level, NoticeLevel::Error);
    assert_eq!(store.get(), None);
    assert_eq!(client.current_room(), None);

    client.shutdown().await;
}

#[tokio::test]
async fn moves_are_refused_until_rejoin_completes() {
    let store = MemorySessionStore::with_session(Session::new(room("AB12CD"), Seat::First));
    let (transport, server) = live_transport();
    let (connector, _calls) = MockConnector::new(vec![Attempt::open(transport)]);
    let (mut client, _events) = CubeClient::start(connector, config(0), store);

    wait_for_sent(&server.sent, 1).await;
    assert_eq!(client.state().phase, Phase::AwaitingRejoin);
    let coord = Coord::new(0, 0, 0).unwrap();
    assert!(matches!(client.make_move(coord), Err(CubeError::Rejoining)));

    server.push(rejoin_ok_frame("AB12CD", 0, ANN_AND_BOB));
    wait_for_state(&client, |s| s.phase == Phase::Active).await;
    assert_ok!(client.make_move(coord));
    let sent = wait_for_sent(&server.sent, 2).await;
    assert_eq!(sent[1], ClientMessage::MakeMove { z: 0, y: 0, x: 0 });

    client.shutdown().await;
}

#[tokio::test]
async fn leave_while_connecting_skips_the_rejoin() {
    init_tracing();
    let store = MemorySessionStore::with_session(Session::new(room("AB12CD"), Seat::Second));
    let (transport, server) = live_transport();
    let (connector, _calls) = MockConnector::new(vec![Attempt::open(transport)]);
    let connector = connector.with_connect_delay(Duration::from_millis(100));
    let (mut client, mut events) = CubeClient::start(connector, config(0), store.clone());

    assert_ok!(client.leave_game());
    let state = wait_for_state(&client, |s| s.session.is_none()).await;
    assert_eq!(state.phase, Phase::Lobby);
    assert_eq!(store.get(), None);

    next_matching(&mut events, |e| matches!(e, CubeEvent::Connected)).await;
    server.push(connected_frame());
    assert_ok!(client.create_game("Bob"));

    // A rejoin would have been the first frame on the new connection.
    let sent = wait_for_sent(&server.sent, 1).await;
    assert_eq!(
        sent[0],
        ClientMessage::CreateGame {
            player_name: "Bob".into(),
        }
    );

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Reconnection
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn dropped_connection_reconnects_and_rejoins() {
    let store = MemorySessionStore::new();
    let (first, server1) = live_transport();
    let (second, server2) = live_transport();
    let (connector, calls) =
        MockConnector::new(vec![Attempt::open(first), Attempt::open(second)]);
    let (mut client, mut events) = CubeClient::start(connector, config(3), store.clone());

    server1.push(joined_self_frame("AB12CD", 1, ANN_AND_BOB));
    wait_for_state(&client, |s| s.phase == Phase::Active).await;

    server1.hang_up();
    next_matching(&mut events, |e| matches!(e, CubeEvent::ConnectionLost { .. })).await;
    match next_matching(&mut events, |e| matches!(e, CubeEvent::Reconnecting { .. })).await {
        CubeEvent::Reconnecting { attempt, delay } => {
            assert_eq!(attempt, 1);
            assert_eq!(delay, Duration::from_millis(5));
        }
        other => panic!("unexpected {other:?}"),
    }

    let sent = wait_for_sent(&server2.sent, 1).await;
    assert_eq!(
        sent[0],
        ClientMessage::RejoinGame {
            room: room("AB12CD"),
            player_number: Seat::Second,
        }
    );
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);

    server2.push(rejoin_ok_frame("AB12CD", 1, ANN_AND_BOB));
    let state = wait_for_state(&client, |s| s.phase == Phase::Active && s.connected).await;
    assert_eq!(state.local_seat(), Some(Seat::Second));

    client.shutdown().await;
}

#[tokio::test]
async fn receive_error_counts_as_lost_connection() {
    let (first, server1) = live_transport();
    let (second, _server2) = live_transport();
    let (connector, _calls) = MockConnector::new(vec![Attempt::open(first), Attempt::open(second)]);
    let (mut client, mut events) = CubeClient::start(connector, config(2), MemorySessionStore::new());

    next_matching(&mut events, |e| matches!(e, CubeEvent::Connected)).await;
    server1.fail("reset by peer");

    match next_matching(&mut events, |e| matches!(e, CubeEvent::ConnectionLost { .. })).await {
        CubeEvent::ConnectionLost { reason } => {
            assert!(reason.unwrap().contains("reset by peer"));
        }
        other => panic!("unexpected {other:?}"),
    }
    next_matching(&mut events, |e| matches!(e, CubeEvent::Connected)).await;

    client.shutdown().await;
}

#[tokio::test]
async fn gives_up_after_bounded_attempts() {
    let (connector, calls) = MockConnector::new(vec![
        Attempt::Refuse("down".into()),
        Attempt::Refuse("still down".into()),
        Attempt::Refuse("gone".into()),
    ]);
    let (client, mut events) = CubeClient::start(connector, config(2), MemorySessionStore::new());

    let mut attempts = Vec::new();
    let reason = loop {
        match next_matching(&mut events, |e| {
            matches!(e, CubeEvent::Reconnecting { .. } | CubeEvent::Disconnected { .. })
        })
        .await
        {
            CubeEvent::Reconnecting { attempt, delay } => attempts.push((attempt, delay)),
            CubeEvent::Disconnected { reason } => break reason.unwrap(),
            _ => unreachable!(),
        }
    };

    assert_eq!(
        attempts,
        vec![(1, Duration::from_millis(5)), (2, Duration::from_millis(10))]
    );
    assert!(reason.contains("gave up after 2"), "reason: {reason}");
    assert!(reason.contains("gone"), "reason: {reason}");
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    assert!(!client.is_connected());
    assert!(events.recv().await.is_none());
}

// ════════════════════════════════════════════════════════════════════
// Leave
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn leave_forgets_session_and_opens_fresh_connection() {
    let store = MemorySessionStore::new();
    let (first, server1) = live_transport();
    let (second, server2) = live_transport();
    let (connector, calls) =
        MockConnector::new(vec![Attempt::open(first), Attempt::open(second)]);
    let (mut client, mut events) = CubeClient::start(connector, config(0), store.clone());

    server1.push(joined_self_frame("AB12CD", 0, &[("Ann", 0)]));
    wait_for_state(&client, |s| s.phase == Phase::Active).await;
    assert!(store.get().is_some());

    client.leave_game().unwrap();
    let state = wait_for_state(&client, |s| s.phase == Phase::Lobby).await;
    assert!(state.session.is_none());
    assert_eq!(store.get(), None);

    // The fresh connection has nothing to rejoin.
    next_matching(&mut events, |e| matches!(e, CubeEvent::Connected)).await;
    next_matching(&mut events, |e| matches!(e, CubeEvent::Connected)).await;
    assert!(server1.is_closed());
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(server2.sent.lock().unwrap().is_empty());

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Chat and notices
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn chat_is_trimmed_sent_and_echoed() {
    let (mut client, _events, server) = start_seated(1, MemorySessionStore::new()).await;

    client.send_chat("  hello there  ").unwrap();
    let sent = wait_for_sent(&server.sent, 1).await;
    assert_eq!(
        sent[0],
        ClientMessage::ChatMessage {
            message: "hello there".into(),
            room: room("AB12CD"),
        }
    );

    wait_for_state(&client, |s| {
        s.chat.last().is_some_and(|e| e.origin == ChatOrigin::Own)
    })
    .await;
    server.push(chat_frame("Ann", "hi Bob"));
    let state = wait_for_state(&client, |s| {
        s.chat.last().is_some_and(|e| e.text == "hi Bob")
    })
    .await;
    let origins: Vec<_> = state.chat.iter().map(|e| e.origin.clone()).collect();
    assert_eq!(
        origins[origins.len() - 2..],
        [ChatOrigin::Own, ChatOrigin::Opponent { name: "Ann".into() }]
    );

    client.shutdown().await;
}

#[tokio::test]
async fn departures_and_returns_are_logged() {
    let (mut client, _events, server) = start_seated(0, MemorySessionStore::new()).await;

    server.push(player_left_frame("Bob", 1));
    wait_for_state(&client, |s| {
        s.chat.last().is_some_and(|e| e.text == "Bob left the game.")
    })
    .await;

    server.push(player_reconnected_frame(1));
    let state = wait_for_state(&client, |s| {
        s.chat.last().is_some_and(|e| e.text == "The other player reconnected.")
    })
    .await;
    assert_eq!(state.notice.unwrap().level, NoticeLevel::Info);

    client.shutdown().await;
}

#[tokio::test]
async fn server_errors_are_shown_verbatim() {
    let (mut client, _events, server) = start_live(MemorySessionStore::new()).await;

    server.push(error_frame("Room is full"));
    let state = wait_for_state(&client, |s| {
        s.notice.as_ref().is_some_and(|n| n.text == "Room is full")
    })
    .await;
    assert_eq!(state.notice.unwrap().level, NoticeLevel::Error);

    client.shutdown().await;
}

#[tokio::test]
async fn undecodable_frames_do_not_break_the_connection() {
    let (mut client, _events, server) = start_live(MemorySessionStore::new()).await;

    server.push("not json".into());
    server.push(r#"{"event":"mystery","data":{}}"#.into());
    server.push(r#"{"event":"move_made","data":{"z":9}}"#.into());
    server.push(error_frame("still here"));

    wait_for_state(&client, |s| {
        s.notice.as_ref().is_some_and(|n| n.text == "still here")
    })
    .await;
    assert!(client.is_connected());

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Events
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn server_event_precedes_its_state_change() {
    let (transport, _sent, _closed) = MockTransport::with_frames(vec![chat_frame("Ann", "yo")]);
    let (connector, _calls) = MockConnector::new(vec![Attempt::open(transport)]);
    let (mut client, mut events) = CubeClient::start(connector, config(0), MemorySessionStore::new());

    next_matching(&mut events, |e| matches!(e, CubeEvent::Server(_))).await;
    match events.recv().await.unwrap() {
        CubeEvent::StateChanged(state) => {
            assert_eq!(state.chat.last().unwrap().text, "yo");
        }
        other => panic!("expected StateChanged, got {other:?}"),
    }

    client.shutdown().await;
}
