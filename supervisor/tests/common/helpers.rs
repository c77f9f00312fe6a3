//! Test helpers for driving the supervisor loop
//!
//! [`FakeServer`] is a scriptable stand-in for the game server. The mocks
//! built from it delegate every call to its shared state, so a test can make
//! the server crash, go unhealthy or fail to spawn between iterations.

#![allow(dead_code)]

use chrono::Utc;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use supervisor::traits::{MockHealthCheck, MockProcessController};
use supervisor::{
    LaunchSpec, OutputLine, ProbeError, ProcessInfo, Supervisor, SupervisorCommand, SupervisorConfig, SupervisorError,
    SupervisorResult,
};

use super::fixtures::TestFixtures;

#[derive(Default)]
struct FakeState {
    alive: bool,
    next_pid: u32,
    start_attempts: u32,
    starts: u32,
    terminations: u32,
    overlapping_starts: u32,
    failing_starts: u32,
    die_on_start: bool,
    boot_lines: Vec<String>,
    pending: VecDeque<OutputLine>,
    inputs: Vec<String>,
    memory: Option<u64>,
    launches: Vec<LaunchSpec>,
}

pub struct FakeServer {
    state: Mutex<FakeState>,
    healthy: AtomicBool,
    pings: AtomicU32,
}

impl FakeServer {
    /// Healthy server that prints the readiness marker on every start
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                next_pid: 4_000,
                boot_lines: TestFixtures::boot_output(),
                ..FakeState::default()
            }),
            healthy: AtomicBool::new(true),
            pings: AtomicU32::new(0),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    // Scripting

    pub fn set_boot_lines(&self, lines: Vec<String>) {
        self.state().boot_lines = lines;
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn fail_next_starts(&self, count: u32) {
        self.state().failing_starts = count;
    }

    pub fn set_die_on_start(&self, die: bool) {
        self.state().die_on_start = die;
    }

    pub fn set_memory(&self, bytes: Option<u64>) {
        self.state().memory = bytes;
    }

    pub fn emit(&self, line: &str) {
        self.state().pending.push_back(OutputLine::stdout(line));
    }

    pub fn crash(&self) {
        self.state().alive = false;
    }

    // Observations

    pub fn is_alive(&self) -> bool {
        self.state().alive
    }

    pub fn start_attempts(&self) -> u32 {
        self.state().start_attempts
    }

    pub fn starts(&self) -> u32 {
        self.state().starts
    }

    pub fn terminations(&self) -> u32 {
        self.state().terminations
    }

    /// Starts issued while a previous instance was still alive
    pub fn overlapping_starts(&self) -> u32 {
        self.state().overlapping_starts
    }

    pub fn inputs(&self) -> Vec<String> {
        self.state().inputs.clone()
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.state().launches.clone()
    }

    pub fn pings(&self) -> u32 {
        self.pings.load(Ordering::SeqCst)
    }

    // ProcessController behaviour

    fn start(&self, launch: &LaunchSpec) -> SupervisorResult<ProcessInfo> {
        let mut state = self.state();
        state.start_attempts += 1;
        state.launches.push(launch.clone());

        if state.failing_starts > 0 {
            state.failing_starts -= 1;
            return Err(SupervisorError::SpawnFailed {
                path: launch.executable.clone(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied"),
            });
        }

        if state.alive {
            state.overlapping_starts += 1;
        }
        state.starts += 1;
        state.next_pid += 1;
        state.alive = !state.die_on_start;
        state.pending = state.boot_lines.iter().map(OutputLine::stdout).collect();

        Ok(ProcessInfo {
            pid: state.next_pid,
            started_at: Utc::now(),
        })
    }

    fn terminate(&self) {
        let mut state = self.state();
        if state.alive {
            state.terminations += 1;
        }
        state.alive = false;
    }

    fn send_input(&self, line: &str) {
        let mut state = self.state();
        if state.alive {
            state.inputs.push(line.to_string());
        }
    }

    fn drain_output(&self) -> Vec<OutputLine> {
        self.state().pending.drain(..).collect()
    }

    fn ping(&self) -> Result<(), ProbeError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProbeError::Unreachable {
                message: "connection refused".to_string(),
            })
        }
    }
}

/// Captures the message of every event emitted while installed
#[derive(Clone, Default)]
pub struct LogCapture {
    messages: Arc<Mutex<Vec<String>>>,
}

impl LogCapture {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.messages().iter().any(|m| m.contains(needle))
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.messages.lock().unwrap().push(visitor.0);
    }
}

pub type TestSupervisor = Supervisor<MockProcessController, MockHealthCheck>;

/// Common helper functions for supervisor tests
pub struct TestHelpers;

impl TestHelpers {
    /// Mock controller whose every call is answered by `server`
    pub fn controller(server: &Arc<FakeServer>) -> MockProcessController {
        let mut controller = MockProcessController::new();

        let s = Arc::clone(server);
        controller.expect_start().returning(move |launch| s.start(launch));
        let s = Arc::clone(server);
        controller.expect_terminate().returning(move || s.terminate());
        let s = Arc::clone(server);
        controller.expect_is_alive().returning(move || s.is_alive());
        let s = Arc::clone(server);
        controller.expect_send_input().returning(move |line| s.send_input(line));
        let s = Arc::clone(server);
        controller.expect_drain_output().returning(move || s.drain_output());
        let s = Arc::clone(server);
        controller.expect_memory_usage().returning(move || {
            let state = s.state();
            Ok(if state.alive { state.memory } else { None })
        });

        controller
    }

    pub fn prober(server: &Arc<FakeServer>) -> MockHealthCheck {
        let mut prober = MockHealthCheck::new();
        let s = Arc::clone(server);
        prober.expect_ping().returning(move |_| s.ping());
        prober
    }

    pub fn supervisor(config: SupervisorConfig, server: &Arc<FakeServer>) -> TestSupervisor {
        Supervisor::new(config, Self::controller(server), Self::prober(server))
    }

    /// Supervisor with start enabled, not yet iterated
    pub async fn started_supervisor(config: SupervisorConfig, server: &Arc<FakeServer>) -> TestSupervisor {
        let mut supervisor = Self::supervisor(config, server);
        supervisor.apply_command(SupervisorCommand::Start).await;
        supervisor
    }

    pub async fn iterate(supervisor: &mut TestSupervisor, times: usize) {
        for _ in 0..times {
            supervisor.run_iteration().await;
        }
    }

    /// Launch, then read the marker and probe: two iterations
    pub async fn drive_to_ready(supervisor: &mut TestSupervisor) {
        Self::iterate(supervisor, 2).await;
        assert_eq!(supervisor.phase(), shared::Phase::Ready, "server should be ready");
    }

    /// Poll `check` until it holds or the standard wait elapses
    pub async fn eventually<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = Instant::now() + TestFixtures::WAIT;
        while Instant::now() < deadline {
            if check().await {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        false
    }
}
