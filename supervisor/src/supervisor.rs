//! Main supervisor implementation
//!
//! A single task owns the [`SupervisorState`] and the process controller.
//! Each iteration checks liveness, then readiness, then health, records a
//! memory sample and finally honours a manual restart request. Any error
//! raised inside an iteration is treated as the server having stopped
//! responding and takes the forced-restart path.
//!
//! Everything else talks to the loop through a cloneable [`SupervisorHandle`]:
//! commands go in over an mpsc channel, status comes out over a watch channel.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, timeout, Instant};

use shared::{
    component_debug, component_error, component_info, component_warn, logging, ComponentId, DiagnosticSample, Phase,
    SupervisorStatus,
};

use crate::{
    config::SupervisorConfig,
    core::{readiness, DiagnosticsSink, ReadinessDetector, SupervisorState, DEFAULT_PAGE_SIZE},
    error::{SupervisorError, SupervisorResult},
    traits::{HealthCheck, ProcessController},
};

const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Requests from handles to the loop
#[derive(Debug)]
pub enum SupervisorCommand {
    Start,
    Pause,
    Terminate { ack: oneshot::Sender<()> },
    RequestRestart { delay: Duration },
    SendInput { line: String },
}

/// The control loop for one game-server process
pub struct Supervisor<C, H>
where
    C: ProcessController + 'static,
    H: HealthCheck + 'static,
{
    config: SupervisorConfig,

    /// Injected services
    controller: C,
    prober: H,

    detector: ReadinessDetector,
    diagnostics: Arc<DiagnosticsSink>,
    state: SupervisorState,

    command_tx: mpsc::Sender<SupervisorCommand>,
    command_rx: mpsc::Receiver<SupervisorCommand>,
    status_tx: watch::Sender<SupervisorStatus>,

    /// Shutdown signal
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,

    /// Last configuration problem reported, so it is only logged once
    last_config_problem: Option<String>,
}

impl<C, H> Supervisor<C, H>
where
    C: ProcessController + 'static,
    H: HealthCheck + 'static,
{
    /// Create new supervisor with injected dependencies
    pub fn new(config: SupervisorConfig, controller: C, prober: H) -> Self {
        let diagnostics = Arc::new(DiagnosticsSink::new(config.sample_capacity, config.console_capacity));
        let detector = ReadinessDetector::new(config.readiness_marker.clone());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (status_tx, _) = watch::channel(SupervisorStatus::default());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        Self {
            config,
            controller,
            prober,
            detector,
            diagnostics,
            state: SupervisorState::new(),
            command_tx,
            command_rx,
            status_tx,
            shutdown_tx,
            shutdown_rx,
            last_config_problem: None,
        }
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            commands: self.command_tx.clone(),
            status: self.status_tx.subscribe(),
            shutdown: self.shutdown_tx.clone(),
            diagnostics: Arc::clone(&self.diagnostics),
            restart_wait_timeout: self.config.restart_wait_timeout(),
        }
    }

    pub fn get_shutdown_sender(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn diagnostics(&self) -> Arc<DiagnosticsSink> {
        Arc::clone(&self.diagnostics)
    }

    /// Main loop. Returns after a shutdown signal, with the server terminated.
    pub async fn run(mut self) {
        logging::log_startup(ComponentId::current(), "server supervisor");

        loop {
            self.run_iteration().await;
            if !self.wait_for_next_iteration().await {
                break;
            }
        }

        self.terminate_child("supervisor shutdown").await;
        logging::log_shutdown(ComponentId::current(), "supervisor loop stopped");
    }

    /// One pass of the loop; never fails
    pub async fn run_iteration(&mut self) {
        if let Err(e) = self.tick().await {
            component_warn!(ComponentId::current(), "⚠️ Supervisor iteration failed: {}", e);

            let recovery = match self.state.phase() {
                phase if phase.is_running() => self.restart_now("stopped responding").await,
                Phase::Starting => {
                    self.controller.terminate().await;
                    self.state.return_to_idle(self.config.spawn_backoff(), Instant::now())
                }
                _ => Ok(()),
            };
            if let Err(e) = recovery {
                logging::log_error(ComponentId::current(), "Forced restart", &e);
            }
        }
        self.publish().await;
    }

    /// Apply a command from a handle. Returns true when the loop should run
    /// its next iteration right away.
    pub async fn apply_command(&mut self, command: SupervisorCommand) -> bool {
        match command {
            SupervisorCommand::Start => {
                self.state.enable_start();
                component_info!(ComponentId::current(), "▶️ Server start enabled");
                self.publish().await;
                true
            }
            SupervisorCommand::Pause => {
                self.state.pause();
                component_info!(ComponentId::current(), "⏸️ Server start attempts paused");
                self.publish().await;
                false
            }
            SupervisorCommand::Terminate { ack } => {
                self.terminate_child("operator request").await;
                let _ = ack.send(());
                false
            }
            SupervisorCommand::RequestRestart { delay } => {
                if self.state.request_restart(delay) {
                    component_info!(ComponentId::current(), "🔄 Restart requested with {:?} delay", delay);
                } else {
                    component_debug!(ComponentId::current(), "Restart request coalesced or nothing to restart");
                }
                true
            }
            SupervisorCommand::SendInput { line } => {
                self.controller.send_input(&line).await;
                false
            }
        }
    }

    /// Sleep one poll interval while serving commands. False on shutdown.
    async fn wait_for_next_iteration(&mut self) -> bool {
        let pause = sleep(self.config.poll_interval());
        tokio::pin!(pause);

        loop {
            tokio::select! {
                _ = &mut pause => return true,
                Some(()) = self.shutdown_rx.recv() => return false,
                Some(command) = self.command_rx.recv() => {
                    if self.apply_command(command).await {
                        return true;
                    }
                }
            }
        }
    }

    async fn tick(&mut self) -> SupervisorResult<()> {
        match self.state.phase() {
            Phase::Idle | Phase::RestartPending => {
                if self.state.can_attempt_start(Instant::now()) {
                    self.launch().await?;
                }
                Ok(())
            }
            Phase::AwaitingReady | Phase::Ready => self.supervise().await,
            Phase::Starting | Phase::Terminated => Ok(()),
        }
    }

    /// Liveness, readiness, health, diagnostics, manual restart - in that order
    async fn supervise(&mut self) -> SupervisorResult<()> {
        if !self.controller.is_alive().await {
            let reason = match self.state.phase() {
                Phase::Ready => "exited unexpectedly",
                _ => "exited before becoming ready",
            };
            return self.restart_now(reason).await;
        }

        self.process_output().await;

        let mut probed = false;
        if self.state.phase() == Phase::AwaitingReady {
            if self.state.marker_seen() {
                probed = true;
                match self.prober.ping(self.config.probe_timeout()).await {
                    Ok(()) => {
                        self.state.record_probe_success();
                        self.state.mark_ready()?;
                        logging::log_success(ComponentId::current(), "Server is ready");
                    }
                    Err(e) => {
                        self.state.record_probe_failure();
                        component_debug!(ComponentId::current(), "Readiness marker seen but probe failed: {}", e);
                    }
                }
            }

            if let Some(ready_timeout) = self.config.ready_timeout() {
                if self.state.ready_deadline_passed(Instant::now(), ready_timeout) {
                    return self.restart_now("never reported ready").await;
                }
            }
        }

        if self.state.phase() == Phase::Ready {
            if !probed {
                match self.prober.ping(self.config.probe_timeout()).await {
                    Ok(()) => self.state.record_probe_success(),
                    Err(e) => {
                        let failures = self.state.record_probe_failure();
                        component_warn!(ComponentId::current(), "⚠️ Health probe failed ({} in a row): {}", failures, e);
                        if failures >= self.config.health_failure_threshold.max(1) {
                            return self.restart_now("stopped responding").await;
                        }
                    }
                }
            }

            if let Some(bytes) = self.controller.memory_usage().await? {
                self.diagnostics.record_memory_sample(bytes);
            }
        }

        if let Some(delay) = self.state.take_restart_request() {
            component_info!(ComponentId::current(), "🔄 Restarting server on request, next start in {:?}", delay);
            self.process_output().await;
            self.controller.terminate().await;
            self.state.schedule_restart(delay, Instant::now())?;
        }

        Ok(())
    }

    /// Kill the current process and start a new one straight away
    async fn restart_now(&mut self, reason: &str) -> SupervisorResult<()> {
        component_info!(ComponentId::current(), "🔄 Server {}, restarting", reason);
        if self.state.take_restart_request().is_some() {
            component_debug!(ComponentId::current(), "Pending restart request folded into this restart");
        }

        // Keep whatever it printed on the way down
        self.process_output().await;
        self.controller.terminate().await;

        if self.state.ready_to_start() {
            self.launch().await
        } else {
            self.state.return_to_idle(Duration::ZERO, Instant::now())
        }
    }

    async fn launch(&mut self) -> SupervisorResult<()> {
        let launch = match self.config.launch_spec() {
            Ok(spec) => {
                self.last_config_problem = None;
                spec
            }
            Err(e) => {
                self.report_config_problem(&e);
                return self.state.return_to_idle(Duration::ZERO, Instant::now());
            }
        };

        self.state.begin_start()?;
        self.publish().await;

        match self.controller.start(&launch).await {
            Ok(info) => {
                self.state.start_succeeded(info.pid, Instant::now())?;
                component_info!(
                    ComponentId::current(),
                    "✅ Server started (PID: {}), waiting for '{}'",
                    info.pid,
                    self.detector.marker()
                );
            }
            Err(e) if e.is_configuration() => {
                self.report_config_problem(&e);
                self.state.start_failed(Duration::ZERO, Instant::now())?;
            }
            Err(e) => {
                component_error!(ComponentId::current(), error = ?e, "❌ Failed to start server: {}", e);
                self.state.start_failed(self.config.spawn_backoff(), Instant::now())?;
            }
        }
        Ok(())
    }

    fn report_config_problem(&mut self, error: &SupervisorError) {
        let message = error.to_string();
        if self.last_config_problem.as_deref() != Some(message.as_str()) {
            component_warn!(ComponentId::current(), "⚠️ Cannot start server: {}", message);
            self.last_config_problem = Some(message);
        }
    }

    /// Feed queued output into the console buffer and the readiness detector
    async fn process_output(&mut self) {
        for line in self.controller.drain_output().await {
            self.diagnostics.record_console_line(&line.text);

            let observation = self.detector.observe(&line.text);
            match &observation.record {
                Some(record) => readiness::forward_record(record),
                None => component_debug!(ComponentId::Server, "{}", line.text),
            }

            if observation.ready_signal && !self.state.marker_seen() {
                self.state.observe_marker();
                component_info!(ComponentId::current(), "📣 Readiness marker observed");
            }
        }
    }

    async fn terminate_child(&mut self, reason: &str) {
        self.process_output().await;
        self.controller.terminate().await;
        self.state.terminate();
        self.publish().await;
        component_info!(ComponentId::current(), "🛑 Server terminated: {}", reason);
    }

    async fn publish(&mut self) {
        let alive = self.controller.is_alive().await;
        self.status_tx.send_replace(self.state.status(alive));
    }
}

/// Cloneable front end to a running [`Supervisor`]
#[derive(Clone)]
pub struct SupervisorHandle {
    commands: mpsc::Sender<SupervisorCommand>,
    status: watch::Receiver<SupervisorStatus>,
    shutdown: mpsc::Sender<()>,
    diagnostics: Arc<DiagnosticsSink>,
    restart_wait_timeout: Duration,
}

impl SupervisorHandle {
    async fn send(&self, command: SupervisorCommand) -> SupervisorResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SupervisorError::LoopUnavailable)
    }

    /// Allow the loop to start the server; returns without waiting
    pub async fn start(&self) -> SupervisorResult<()> {
        self.send(SupervisorCommand::Start).await
    }

    /// Stop new start attempts; a running server keeps running
    pub async fn pause(&self) -> SupervisorResult<()> {
        self.send(SupervisorCommand::Pause).await
    }

    /// Kill the server and disable starting. Waits until the loop has done it.
    pub async fn terminate(&self) -> SupervisorResult<()> {
        let (ack, done) = oneshot::channel();
        self.send(SupervisorCommand::Terminate { ack }).await?;
        done.await.map_err(|_| SupervisorError::LoopUnavailable)
    }

    /// As of the loop's last published status
    pub fn is_alive(&self) -> bool {
        self.status.borrow().alive
    }

    pub fn is_ready(&self) -> bool {
        self.status.borrow().phase == Phase::Ready
    }

    pub fn phase(&self) -> Phase {
        self.status.borrow().phase
    }

    pub fn status(&self) -> SupervisorStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorStatus> {
        self.status.clone()
    }

    /// Ask for a restart and return immediately
    pub async fn request_restart(&self, delay: Duration) -> SupervisorResult<()> {
        self.send(SupervisorCommand::RequestRestart { delay }).await
    }

    /// Restart and wait for the new process to become ready
    pub async fn restart_server(&self, delay: Duration) -> SupervisorResult<()> {
        self.restart_server_within(delay, self.restart_wait_timeout).await
    }

    pub async fn restart_server_within(&self, delay: Duration, wait: Duration) -> SupervisorResult<()> {
        let mut status = self.status.clone();
        let baseline = status.borrow_and_update().starts;

        self.request_restart(delay).await?;

        let restarted = timeout(wait, async move {
            status
                .wait_for(|s| s.starts > baseline && s.phase == Phase::Ready)
                .await
                .map(|_| ())
        })
        .await;

        match restarted {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SupervisorError::LoopUnavailable),
            Err(_) => Err(SupervisorError::RestartTimeout { timeout: wait }),
        }
    }

    /// Forward a console command to the server's stdin
    pub async fn send_command(&self, text: &str) -> SupervisorResult<()> {
        self.send(SupervisorCommand::SendInput { line: text.to_string() }).await
    }

    /// Console text, newest first, 50 lines per page
    pub fn console_messages(&self, page: usize) -> Vec<String> {
        self.diagnostics
            .console_lines(page, DEFAULT_PAGE_SIZE)
            .into_iter()
            .map(|line| line.text)
            .collect()
    }

    pub fn message_count(&self) -> usize {
        self.diagnostics.line_count()
    }

    pub fn memory_samples(&self) -> Vec<DiagnosticSample> {
        self.diagnostics.memory_samples()
    }

    /// Ask the loop to stop; it terminates the server on the way out
    pub fn shutdown(&self) {
        let _ = self.shutdown.try_send(());
    }
}
