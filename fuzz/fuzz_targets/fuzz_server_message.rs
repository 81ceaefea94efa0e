#![no_main]

use chrono::DateTime;
use libfuzzer_sys::fuzz_target;
use tictac_cube_client::state::{reduce, Action, SessionState};
use tictac_cube_client::ServerMessage;

fuzz_target!(|data: &[u8]| {
    // Raw-byte path, including serde_json's own UTF-8 validation.
    let Ok(msg) = serde_json::from_slice::<ServerMessage>(data) else {
        return;
    };

    // Anything that decodes must also reduce without panicking, applied
    // twice so duplicate-delivery paths are covered.
    let now = DateTime::UNIX_EPOCH;
    let first = reduce(&SessionState::default(), Action::Server(msg.clone()), now);
    let _ = reduce(&first.state, Action::Server(msg), now);
});
