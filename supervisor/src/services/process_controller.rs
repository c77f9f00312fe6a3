//! Real process controller implementation
//!
//! Owns the one server process: clears out stale instances, spawns the
//! executable with piped stdio, pumps its output into a bounded queue and
//! force-kills it on request.

use async_trait::async_trait;
use chrono::Utc;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

use crate::config::{LaunchSpec, SupervisorConfig};
use crate::error::{SupervisorError, SupervisorResult};
use crate::services::process_table::SystemProcessTable;
use crate::traits::{OutputLine, OutputStream, ProcessController, ProcessInfo, ProcessTable};
use shared::{component_debug, component_info, component_warn, ComponentId};

/// Lines queued for the server console before new input is dropped
const INPUT_QUEUE_CAPACITY: usize = 64;

/// Handle for the managed process
struct ProcessHandle {
    child: Child,
    input: Option<mpsc::Sender<String>>,
    output: mpsc::Receiver<OutputLine>,
    pumps: Vec<JoinHandle<()>>,
    info: ProcessInfo,
}

impl ProcessHandle {
    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

/// Real process controller
pub struct RealProcessController<T: ProcessTable = SystemProcessTable> {
    active: Mutex<Option<ProcessHandle>>,
    table: T,
    output_queue_capacity: usize,
    stale_poll_interval: Duration,
    stale_timeout: Duration,
    kill_timeout: Duration,
}

impl RealProcessController<SystemProcessTable> {
    /// Controller over the host process table with settings from `config`
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::with_table(SystemProcessTable::new()).with_config(config)
    }
}

impl<T: ProcessTable> RealProcessController<T> {
    pub fn with_table(table: T) -> Self {
        Self {
            active: Mutex::new(None),
            table,
            output_queue_capacity: 1_024,
            stale_poll_interval: Duration::from_millis(250),
            stale_timeout: Duration::from_secs(30),
            kill_timeout: Duration::from_secs(10),
        }
    }

    /// Take queue and timing settings from the supervisor config (fluent API)
    pub fn with_config(mut self, config: &SupervisorConfig) -> Self {
        self.output_queue_capacity = config.output_queue_capacity.max(1);
        self.stale_poll_interval = config.stale_poll_interval();
        self.stale_timeout = config.stale_timeout();
        self.kill_timeout = config.kill_timeout();
        self
    }

    pub fn with_stale_timing(mut self, poll_interval: Duration, timeout: Duration) -> Self {
        self.stale_poll_interval = poll_interval;
        self.stale_timeout = timeout;
        self
    }

    /// Kill same-named processes until none are left or the timeout runs out
    async fn kill_stale_processes(&self, name: &str) -> SupervisorResult<()> {
        let started = Instant::now();

        loop {
            let stale = self.table.find_by_name(name);
            if stale.is_empty() {
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= self.stale_timeout {
                return Err(SupervisorError::StaleProcessKillFailed {
                    name: name.to_string(),
                    waited,
                });
            }

            for pid in stale {
                if self.table.kill(pid) {
                    component_info!(ComponentId::current(), "🔪 Killed stale '{}' process (PID: {})", name, pid);
                } else {
                    component_warn!(ComponentId::current(), "⚠️ Failed to kill stale '{}' process (PID: {})", name, pid);
                }
            }

            sleep(self.stale_poll_interval).await;
        }
    }
}

/// Pump lines from one pipe into the output queue until EOF or the queue closes
fn spawn_line_reader<R>(reader: R, stream: OutputStream, tx: mpsc::Sender<OutputLine>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    // The server is not guaranteed to write valid UTF-8
                    let text = String::from_utf8_lossy(&buf).trim_end_matches(['\r', '\n']).to_string();
                    if tx.send(OutputLine { text, stream }).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    component_debug!(ComponentId::current(), "Output reader stopped: {}", e);
                    break;
                }
            }
        }
    })
}

/// Write queued console lines to the server's stdin
///
/// A server that stops reading only stalls this task; terminate aborts it.
fn spawn_input_writer(mut stdin: ChildStdin, mut rx: mpsc::Receiver<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            let payload = format!("{line}\n");
            let written = match stdin.write_all(payload.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                component_warn!(ComponentId::current(), "⚠️ Failed to write to server console: {}", e);
                break;
            }
        }
    })
}

#[async_trait]
impl<T: ProcessTable> ProcessController for RealProcessController<T> {
    async fn start(&self, launch: &LaunchSpec) -> SupervisorResult<ProcessInfo> {
        if !launch.executable.is_file() {
            return Err(SupervisorError::ExecutableMissing {
                path: launch.executable.clone(),
            });
        }

        // Our own previous instance first, then anything else with the same name
        self.terminate().await;
        self.kill_stale_processes(&launch.process_name).await?;

        let mut cmd = Command::new(&launch.executable);
        cmd.args(&launch.arguments)
            .current_dir(&launch.working_directory)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| SupervisorError::SpawnFailed {
            path: launch.executable.clone(),
            source,
        })?;

        let pid = child.id().unwrap_or(0);
        let (tx, rx) = mpsc::channel(self.output_queue_capacity);

        let mut pumps = Vec::with_capacity(3);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(spawn_line_reader(stdout, OutputStream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(spawn_line_reader(stderr, OutputStream::Stderr, tx));
        }

        let input = child.stdin.take().map(|stdin| {
            let (input_tx, input_rx) = mpsc::channel(INPUT_QUEUE_CAPACITY);
            pumps.push(spawn_input_writer(stdin, input_rx));
            input_tx
        });

        let info = ProcessInfo {
            pid,
            started_at: Utc::now(),
        };

        *self.active.lock().await = Some(ProcessHandle {
            child,
            input,
            output: rx,
            pumps,
            info: info.clone(),
        });

        component_info!(
            ComponentId::current(),
            "🚀 Spawned {} (PID: {}) in {}",
            launch.executable.display(),
            pid,
            launch.working_directory.display()
        );
        Ok(info)
    }

    async fn terminate(&self) {
        let Some(mut handle) = self.active.lock().await.take() else {
            return;
        };

        for pump in &handle.pumps {
            pump.abort();
        }

        if let Err(e) = handle.child.start_kill() {
            component_debug!(ComponentId::current(), "Kill signal not delivered (PID: {}): {}", handle.info.pid, e);
        }

        match timeout(self.kill_timeout, handle.child.wait()).await {
            Ok(Ok(status)) => {
                component_debug!(ComponentId::current(), "🛑 Server (PID: {}) exited: {}", handle.info.pid, status);
            }
            Ok(Err(e)) => {
                component_warn!(ComponentId::current(), "⚠️ Waiting for server (PID: {}) failed: {}", handle.info.pid, e);
            }
            Err(_) => {
                component_warn!(
                    ComponentId::current(),
                    "⚠️ Server (PID: {}) did not exit within {:?}",
                    handle.info.pid,
                    self.kill_timeout
                );
            }
        }
    }

    async fn is_alive(&self) -> bool {
        let mut active = self.active.lock().await;
        active.as_mut().map_or(false, ProcessHandle::is_running)
    }

    async fn send_input(&self, line: &str) {
        let mut active = self.active.lock().await;
        let Some(handle) = active.as_mut() else {
            component_debug!(ComponentId::current(), "Server not running, dropping console input");
            return;
        };
        if !handle.is_running() {
            return;
        }
        let Some(input) = handle.input.as_ref() else {
            return;
        };

        match input.try_send(line.to_string()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                component_warn!(ComponentId::current(), "⚠️ Server console is not reading input, dropping line");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                component_debug!(ComponentId::current(), "Server console closed, dropping input");
            }
        }
    }

    async fn drain_output(&self) -> Vec<OutputLine> {
        let mut active = self.active.lock().await;
        let mut lines = Vec::new();
        if let Some(handle) = active.as_mut() {
            while let Ok(line) = handle.output.try_recv() {
                lines.push(line);
            }
        }
        lines
    }

    async fn memory_usage(&self) -> SupervisorResult<Option<u64>> {
        let pid = {
            let mut active = self.active.lock().await;
            let Some(handle) = active.as_mut() else {
                return Ok(None);
            };
            if !handle.is_running() {
                return Ok(None);
            }
            handle.info.pid
        };
        Ok(self.table.memory_of(pid))
    }
}
