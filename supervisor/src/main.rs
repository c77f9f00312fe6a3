//! Main entry point for the supervisor binary
//!
//! Wires the real process controller and HTTP prober into the supervisor loop
//! and gives the operator a line-based console on stdin.

use anyhow::Context;
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::mpsc;

use shared::{component_info, component_warn, logging, ComponentId};
use supervisor::{
    console::{OperatorCommand, HELP},
    services::{HttpHealthProber, RealProcessController},
    Supervisor, SupervisorConfig, SupervisorHandle,
};

/// Keeps an FLServer instance running and healthy
#[derive(Parser)]
#[command(name = "flsupervisor")]
#[command(about = "Launches, watches and restarts an FLServer process")]
pub struct Args {
    /// JSON configuration file, applied before environment variables
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Path to the server executable
    #[arg(long)]
    pub executable: Option<PathBuf>,

    /// Working directory for the server (defaults to the executable's directory)
    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    /// Extra argument for the server; repeat for more
    #[arg(long = "arg")]
    pub args: Vec<String>,

    /// Port of the companion agent used for health probes
    #[arg(long)]
    pub port: Option<u16>,

    /// Companion agent base URL (overrides --port)
    #[arg(long)]
    pub agent_url: Option<String>,

    /// Output line that signals the server finished loading
    #[arg(long)]
    pub ready_marker: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Defaults, then the config file, then the environment, then flags
    fn load_config(&self) -> anyhow::Result<SupervisorConfig> {
        let _ = dotenv::dotenv();

        let base = match &self.config {
            Some(path) => SupervisorConfig::from_json_file(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?,
            None => SupervisorConfig::default(),
        };
        let mut config = base.overlay(|key| std::env::var(key).ok())?;

        if let Some(executable) = &self.executable {
            config = config.with_executable(executable);
        }
        if let Some(dir) = &self.working_dir {
            config = config.with_working_directory(dir);
        }
        if !self.args.is_empty() {
            config = config.with_arguments(self.args.clone());
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(url) = &self.agent_url {
            config = config.with_agent_base_url(url);
        }
        if let Some(marker) = &self.ready_marker {
            config = config.with_readiness_marker(marker);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    ComponentId::init_supervisor();
    logging::init_tracing_with_level(Some(&args.log_level));

    let config = args.load_config()?;
    let controller = RealProcessController::from_config(&config);
    let prober = HttpHealthProber::from_config(&config).context("invalid health probe address")?;
    component_info!(ComponentId::current(), "🩺 Health probe target: {}", prober.url());

    let supervisor = Supervisor::new(config, controller, prober);
    let handle = supervisor.handle();

    // Set up graceful shutdown
    let shutdown_sender = supervisor.get_shutdown_sender();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                logging::log_shutdown(ComponentId::current(), "Received Ctrl+C signal");
                let _ = shutdown_sender.send(()).await;
            }
            Err(err) => {
                logging::log_error(ComponentId::current(), "Signal handling", &err);
            }
        }
    });

    let mut supervisor_task = tokio::spawn(supervisor.run());
    handle.start().await?;

    let mut operator_lines = spawn_stdin_reader();
    loop {
        tokio::select! {
            _ = &mut supervisor_task => break,
            line = operator_lines.recv() => match line {
                Some(line) => {
                    if !handle_operator_line(&handle, &line).await? {
                        handle.shutdown();
                    }
                }
                // stdin closed; keep supervising until Ctrl+C
                None => {
                    supervisor_task.await?;
                    break;
                }
            }
        }
    }

    logging::log_success(ComponentId::current(), "Supervisor stopped gracefully");
    Ok(())
}

/// Operator input, read line by line on a dedicated thread
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    logging::log_error(ComponentId::current(), "Reading operator input", &e);
                    break;
                }
            }
        }
    });
    rx
}

/// Returns false when the operator asked to quit
async fn handle_operator_line(handle: &SupervisorHandle, line: &str) -> anyhow::Result<bool> {
    let command = match OperatorCommand::parse(line) {
        Ok(command) => command,
        Err(message) => {
            component_warn!(ComponentId::current(), "⚠️ {}", message);
            return Ok(true);
        }
    };

    match command {
        OperatorCommand::Nothing => {}
        OperatorCommand::Help => println!("{HELP}"),
        OperatorCommand::Status => {
            let status = handle.status();
            println!(
                "phase={} alive={} ready_to_start={} pid={} starts={} health_failures={} console_lines={}",
                status.phase,
                status.alive,
                status.ready_to_start,
                status.pid.map_or_else(|| "-".to_string(), |pid| pid.to_string()),
                status.starts,
                status.consecutive_health_failures,
                handle.message_count()
            );
            if let Some(sample) = handle.memory_samples().last() {
                println!("memory={} bytes at {}", sample.memory_bytes, sample.timestamp_utc);
            }
        }
        OperatorCommand::Restart { delay } => {
            let handle = handle.clone();
            // Waiting for readiness can take minutes; keep the console responsive
            tokio::spawn(async move {
                match handle.restart_server(delay).await {
                    Ok(()) => logging::log_success(ComponentId::current(), "Server restarted"),
                    Err(e) => logging::log_error(ComponentId::current(), "Server restart", &e),
                }
            });
        }
        OperatorCommand::Console { page } => {
            for text in handle.console_messages(page) {
                println!("{text}");
            }
        }
        OperatorCommand::Stop => handle.terminate().await?,
        OperatorCommand::Start => handle.start().await?,
        OperatorCommand::Quit => return Ok(false),
        OperatorCommand::Server(text) => handle.send_command(&text).await?,
    }
    Ok(true)
}
