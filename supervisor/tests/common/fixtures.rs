//! Test fixtures for supervisor tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use supervisor::SupervisorConfig;

/// Fixed test data
pub struct TestFixtures;

impl TestFixtures {
    pub const MARKER: &'static str = "FLHook ready";
    pub const FAST_POLL: Duration = Duration::from_millis(20);
    pub const WAIT: Duration = Duration::from_secs(5);

    /// An on-disk stand-in for the server executable. Keep the `TempDir`
    /// alive for as long as the path is used.
    pub fn executable() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("FLServer.exe");
        std::fs::write(&path, b"MZ").expect("write fake executable");
        (dir, path)
    }

    /// Config pointing at `executable` with loop timings shrunk for tests
    pub fn config(executable: &Path) -> SupervisorConfig {
        SupervisorConfig::default()
            .with_executable(executable)
            .with_poll_interval(Self::FAST_POLL)
            .with_spawn_backoff(Duration::from_millis(200))
            .with_restart_wait_timeout(Self::WAIT)
    }

    /// What the server prints while loading, ending with the marker
    pub fn boot_output() -> Vec<String> {
        vec![
            "Loading universe...".to_string(),
            Self::structured_line(2, "FLHook loaded 42 plugins"),
            Self::MARKER.to_string(),
        ]
    }

    pub fn structured_line(level: i64, message: &str) -> String {
        serde_json::json!({
            "time": "2026-10-18T12:00:00Z",
            "function": "PluginManager::load",
            "level": level,
            "message": message,
        })
        .to_string()
    }
}
