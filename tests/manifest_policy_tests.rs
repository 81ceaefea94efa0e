#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests for the tic-tac-cube client.
//!
//! These tests parse Cargo.toml and check it against project policy: the
//! panic-free lint set, the feature layout that keeps the core usable without
//! a WebSocket stack, and the demo and fuzz wiring. A failure means the
//! manifest has drifted from the agreed-upon standards.

use std::path::PathBuf;

/// Returns the project root directory (where Cargo.toml lives).
fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Reads a file relative to the project root and returns its contents.
fn read_project_file(relative_path: &str) -> String {
    let path = project_root().join(relative_path);
    std::fs::read_to_string(&path).unwrap_or_else(|e| {
        panic!(
            "Failed to read '{}': {}. This file is required by project policy.",
            path.display(),
            e
        )
    })
}

fn parse_toml(relative_path: &str) -> toml::Table {
    read_project_file(relative_path)
        .parse::<toml::Table>()
        .unwrap_or_else(|e| panic!("{relative_path} is not valid TOML: {e}"))
}

fn manifest() -> toml::Table {
    parse_toml("Cargo.toml")
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: lints
// ─────────────────────────────────────────────────────────────────────────────

mod lints {
    use super::*;

    /// Every panic-prone lint must be denied crate-wide.
    const PANIC_FREE_LINTS: &[&str] = &[
        "unwrap_used",
        "expect_used",
        "panic",
        "todo",
        "unimplemented",
        "indexing_slicing",
    ];

    #[test]
    fn cargo_toml_denies_all_panic_prone_lints() {
        let manifest = manifest();
        let clippy = manifest["lints"]["clippy"]
            .as_table()
            .expect("Cargo.toml is missing a [lints.clippy] section");
        for lint in PANIC_FREE_LINTS {
            assert_eq!(
                clippy.get(*lint).and_then(|v| v.as_str()),
                Some("deny"),
                "Cargo.toml must set `{lint} = \"deny\"` in [lints.clippy]. \
                 Library code propagates errors instead of panicking."
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: features
// ─────────────────────────────────────────────────────────────────────────────

mod features {
    use super::*;

    #[test]
    fn websocket_transport_is_default_and_optional() {
        let manifest = manifest();
        let features = manifest["features"].as_table().unwrap();

        let default: Vec<_> = features["default"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(default, ["transport-websocket"]);

        let deps = manifest["dependencies"].as_table().unwrap();
        for dep in ["tokio-tungstenite", "futures-util"] {
            assert_eq!(
                deps[dep]["optional"].as_bool(),
                Some(true),
                "`{dep}` must stay optional so the core builds without a WebSocket stack"
            );
        }
    }

    #[test]
    fn core_dependencies_are_not_optional() {
        let manifest = manifest();
        let deps = manifest["dependencies"].as_table().unwrap();
        for dep in ["tokio", "serde", "serde_json", "chrono", "thiserror", "tracing"] {
            let optional = deps[dep]
                .as_table()
                .and_then(|t| t.get("optional"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            assert!(!optional, "`{dep}` is part of the core and must not be optional");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: targets
// ─────────────────────────────────────────────────────────────────────────────

mod targets {
    use super::*;

    #[test]
    fn every_demo_target_points_at_an_existing_file() {
        let manifest = manifest();
        let examples = manifest["example"].as_array().unwrap();
        assert!(!examples.is_empty());
        for example in examples {
            let path = example["path"].as_str().unwrap();
            assert!(
                project_root().join(path).is_file(),
                "demo target `{}` points at missing file {path}",
                example["name"]
            );
        }
    }

    #[test]
    fn websocket_demo_requires_the_websocket_feature() {
        let manifest = manifest();
        let terminal = manifest["example"]
            .as_array()
            .unwrap()
            .iter()
            .find(|e| e["name"].as_str() == Some("terminal_play"))
            .expect("terminal_play demo must be declared");
        let required: Vec<_> = terminal["required-features"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(required, ["transport-websocket"]);
    }

    #[test]
    fn fuzz_targets_exist_and_build_without_default_features() {
        let fuzz = parse_toml("fuzz/Cargo.toml");
        let dep = &fuzz["dependencies"]["tictac-cube-client"];
        assert_eq!(dep["path"].as_str(), Some(".."));
        assert_eq!(dep["default-features"].as_bool(), Some(false));

        for bin in fuzz["bin"].as_array().unwrap() {
            let path = bin["path"].as_str().unwrap();
            assert!(
                project_root().join("fuzz").join(path).is_file(),
                "fuzz target `{}` points at missing file {path}",
                bin["name"]
            );
        }
    }
}
