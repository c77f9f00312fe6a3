//! Supervisor configuration
//!
//! Values are layered: defaults, then an optional JSON file, then `FLSERVER_*`
//! environment variables (a `.env` file is honoured), then command-line flags.
//! The configuration is read once when the supervisor is built.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{SupervisorError, SupervisorResult};
use shared::SharedError;

/// Everything the supervisor needs to launch and watch the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub executable_path: Option<PathBuf>,
    /// Defaults to the executable's directory
    pub working_directory: Option<PathBuf>,
    pub arguments: Vec<String>,
    pub port: u16,
    /// Companion agent base URL; derived from `port` when absent
    pub agent_base_url: Option<String>,
    pub readiness_marker: String,
    /// Name used to find stale instances; defaults to the executable file name
    pub process_name: Option<String>,

    pub poll_interval_ms: u64,
    pub spawn_backoff_ms: u64,
    pub probe_timeout_ms: u64,
    pub stale_poll_interval_ms: u64,
    pub stale_timeout_ms: u64,
    pub kill_timeout_ms: u64,
    pub restart_wait_timeout_ms: u64,
    /// Force a restart when the readiness marker never shows up
    pub ready_timeout_ms: Option<u64>,

    pub console_capacity: usize,
    pub sample_capacity: usize,
    pub output_queue_capacity: usize,
    pub health_failure_threshold: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            executable_path: None,
            working_directory: None,
            arguments: Vec::new(),
            port: 2302,
            agent_base_url: None,
            readiness_marker: "FLHook ready".to_string(),
            process_name: None,
            poll_interval_ms: 1_000,
            spawn_backoff_ms: 5_000,
            probe_timeout_ms: 5_000,
            stale_poll_interval_ms: 250,
            stale_timeout_ms: 30_000,
            kill_timeout_ms: 10_000,
            restart_wait_timeout_ms: 120_000,
            ready_timeout_ms: None,
            console_capacity: 10_000,
            sample_capacity: 720,
            output_queue_capacity: 1_024,
            health_failure_threshold: 1,
        }
    }
}

/// Resolved launch parameters handed to the process controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub executable: PathBuf,
    pub working_directory: PathBuf,
    pub arguments: Vec<String>,
    pub process_name: String,
}

impl SupervisorConfig {
    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: &Path) -> SupervisorResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Defaults overlaid with `FLSERVER_*` environment variables
    pub fn from_env() -> SupervisorResult<Self> {
        // Missing .env is fine
        let _ = dotenv::dotenv();
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values found through `lookup` on top of `self`
    pub fn overlay<F>(mut self, lookup: F) -> SupervisorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("FLSERVER_EXECUTABLE") {
            self.executable_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup("FLSERVER_WORKDIR") {
            self.working_directory = Some(PathBuf::from(dir));
        }
        if let Some(args) = lookup("FLSERVER_ARGS") {
            self.arguments = args.split_whitespace().map(str::to_string).collect();
        }
        if let Some(port) = lookup("FLSERVER_PORT") {
            self.port = port.trim().parse().map_err(|_| SharedError::InvalidConfig {
                field: "FLSERVER_PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(url) = lookup("FLSERVER_AGENT_URL") {
            self.agent_base_url = Some(url);
        }
        if let Some(marker) = lookup("FLSERVER_READY_MARKER") {
            self.readiness_marker = marker;
        }
        Ok(self)
    }

    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable_path = Some(path.into());
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Vec<String>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_agent_base_url(mut self, url: impl Into<String>) -> Self {
        self.agent_base_url = Some(url.into());
        self
    }

    pub fn with_readiness_marker(mut self, marker: impl Into<String>) -> Self {
        self.readiness_marker = marker.into();
        self
    }

    pub fn with_process_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = Some(name.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_spawn_backoff(mut self, backoff: Duration) -> Self {
        self.spawn_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn with_restart_wait_timeout(mut self, timeout: Duration) -> Self {
        self.restart_wait_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ready_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn with_health_failure_threshold(mut self, threshold: u32) -> Self {
        self.health_failure_threshold = threshold;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn spawn_backoff(&self) -> Duration {
        Duration::from_millis(self.spawn_backoff_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn stale_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stale_poll_interval_ms)
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_timeout_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    pub fn restart_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.restart_wait_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_ms.map(Duration::from_millis)
    }

    /// Check the executable and resolve everything needed to spawn it
    pub fn launch_spec(&self) -> SupervisorResult<LaunchSpec> {
        let executable = match &self.executable_path {
            Some(path) if !path.as_os_str().is_empty() => path.clone(),
            _ => return Err(SupervisorError::ExecutableNotConfigured),
        };
        if !executable.is_file() {
            return Err(SupervisorError::ExecutableMissing { path: executable });
        }

        let working_directory = self
            .working_directory
            .clone()
            .or_else(|| executable.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        let process_name = match &self.process_name {
            Some(name) => name.clone(),
            None => executable
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| SupervisorError::config("executable path has no file name"))?,
        };

        Ok(LaunchSpec {
            executable,
            working_directory,
            arguments: self.arguments.clone(),
            process_name,
        })
    }

    /// URL the health prober pings
    pub fn probe_url(&self) -> SupervisorResult<Url> {
        let base = match &self.agent_base_url {
            Some(url) => url.clone(),
            None => format!("http://127.0.0.1:{}/", self.port),
        };
        let mut base = Url::parse(&base)
            .map_err(|e| SupervisorError::config(format!("invalid agent base URL '{base}': {e}")))?;
        // Url::join replaces the last segment unless the path ends in '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join("ping")
            .map_err(|e| SupervisorError::config(format!("invalid probe URL: {e}")))
    }
}
