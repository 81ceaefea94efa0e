#![no_main]

use libfuzzer_sys::fuzz_target;
use tictac_cube_client::{ClientMessage, Coord, RoomCode};

fuzz_target!(|data: &[u8]| {
    // Anything that decodes must re-encode.
    if let Ok(msg) = serde_json::from_slice::<ClientMessage>(data) {
        let _ = serde_json::to_string(&msg);
    }

    let _ = serde_json::from_slice::<Coord>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(code) = RoomCode::parse(s) {
            assert_eq!(code.as_str().chars().count(), 6);
        }
    }
});
