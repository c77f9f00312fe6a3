//! Supervisor state machine
//!
//! Pure state for the control loop. Every mutation goes through a named
//! transition so the phase graph can be audited and tested without any real
//! process behind it.

use std::time::Duration;
use tokio::time::Instant;

use crate::error::{SupervisorError, SupervisorResult};
use shared::{Phase, SupervisorStatus};

/// Whether `from -> to` is an edge of the phase graph
pub fn is_allowed(from: Phase, to: Phase) -> bool {
    use Phase::*;

    match (from, to) {
        (_, Terminated) => true,
        (Idle, Starting) => true,
        (Starting, AwaitingReady) | (Starting, Idle) => true,
        (AwaitingReady, Ready) => true,
        (AwaitingReady | Ready, Starting | Idle | RestartPending) => true,
        (RestartPending, Starting) | (RestartPending, Idle) => true,
        (Terminated, Idle) => true,
        _ => false,
    }
}

/// The single mutable record owned by the supervisor loop
#[derive(Debug)]
pub struct SupervisorState {
    phase: Phase,
    ready_to_start: bool,
    /// Delay of the pending manual restart
    restart_request: Option<Duration>,
    consecutive_health_failures: u32,

    // Readiness evidence, reset on every start
    marker_seen: bool,
    probe_succeeded: bool,

    pid: Option<u32>,
    starts: u64,
    next_attempt_at: Option<Instant>,
    restart_at: Option<Instant>,
    awaiting_since: Option<Instant>,
}

impl Default for SupervisorState {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            ready_to_start: false,
            restart_request: None,
            consecutive_health_failures: 0,
            marker_seen: false,
            probe_succeeded: false,
            pid: None,
            starts: 0,
            next_attempt_at: None,
            restart_at: None,
            awaiting_since: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ready_to_start(&self) -> bool {
        self.ready_to_start
    }

    pub fn marker_seen(&self) -> bool {
        self.marker_seen
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn starts(&self) -> u64 {
        self.starts
    }

    pub fn consecutive_health_failures(&self) -> u32 {
        self.consecutive_health_failures
    }

    pub fn restart_pending(&self) -> bool {
        self.restart_request.is_some() || self.phase == Phase::RestartPending
    }

    fn transition(&mut self, to: Phase) -> SupervisorResult<()> {
        if !is_allowed(self.phase, to) {
            return Err(SupervisorError::InvalidTransition { from: self.phase, to });
        }
        self.phase = to;
        Ok(())
    }

    /// Operator gate: allow start attempts. Leaves `Terminated` for `Idle`.
    pub fn enable_start(&mut self) {
        self.ready_to_start = true;
        self.next_attempt_at = None;
        if self.phase == Phase::Terminated {
            self.phase = Phase::Idle;
        }
    }

    /// Operator gate: stop new start attempts without touching a running process
    pub fn pause(&mut self) {
        self.ready_to_start = false;
    }

    /// Whether the loop may launch the server at `now`
    pub fn can_attempt_start(&self, now: Instant) -> bool {
        if !self.ready_to_start {
            return false;
        }
        match self.phase {
            Phase::Idle => self.next_attempt_at.map_or(true, |at| now >= at),
            Phase::RestartPending => self.restart_at.map_or(true, |at| now >= at),
            _ => false,
        }
    }

    pub fn begin_start(&mut self) -> SupervisorResult<()> {
        self.transition(Phase::Starting)?;
        self.pid = None;
        self.restart_at = None;
        self.next_attempt_at = None;
        Ok(())
    }

    pub fn start_succeeded(&mut self, pid: u32, now: Instant) -> SupervisorResult<()> {
        self.transition(Phase::AwaitingReady)?;
        self.pid = Some(pid);
        self.starts += 1;
        self.marker_seen = false;
        self.probe_succeeded = false;
        self.consecutive_health_failures = 0;
        self.awaiting_since = Some(now);
        Ok(())
    }

    /// Back to `Idle`, eligible again after `retry_after`
    pub fn start_failed(&mut self, retry_after: Duration, now: Instant) -> SupervisorResult<()> {
        self.transition(Phase::Idle)?;
        self.pid = None;
        self.next_attempt_at = Some(now + retry_after);
        Ok(())
    }

    /// Drop back to `Idle` from wherever the loop is; no-op when already idle
    pub fn return_to_idle(&mut self, retry_after: Duration, now: Instant) -> SupervisorResult<()> {
        if self.phase != Phase::Idle {
            self.transition(Phase::Idle)?;
        }
        self.pid = None;
        self.restart_at = None;
        self.next_attempt_at = Some(now + retry_after);
        Ok(())
    }

    pub fn observe_marker(&mut self) {
        self.marker_seen = true;
    }

    pub fn record_probe_success(&mut self) {
        self.probe_succeeded = true;
        self.consecutive_health_failures = 0;
    }

    /// Returns the new consecutive failure count
    pub fn record_probe_failure(&mut self) -> u32 {
        self.consecutive_health_failures += 1;
        self.consecutive_health_failures
    }

    /// `AwaitingReady -> Ready`; needs the marker and a successful probe since the last start
    pub fn mark_ready(&mut self) -> SupervisorResult<()> {
        if !(self.marker_seen && self.probe_succeeded) {
            return Err(SupervisorError::InvalidTransition {
                from: self.phase,
                to: Phase::Ready,
            });
        }
        self.transition(Phase::Ready)?;
        self.awaiting_since = None;
        Ok(())
    }

    /// True when `AwaitingReady` has lasted longer than `timeout`
    pub fn ready_deadline_passed(&self, now: Instant, timeout: Duration) -> bool {
        self.phase == Phase::AwaitingReady
            && self
                .awaiting_since
                .map_or(false, |since| now.saturating_duration_since(since) >= timeout)
    }

    /// Record a manual restart request. Returns false when it coalesced onto
    /// one already in flight or there is no running process to restart.
    pub fn request_restart(&mut self, delay: Duration) -> bool {
        if self.restart_pending() || !self.phase.is_running() {
            return false;
        }
        self.restart_request = Some(delay);
        true
    }

    pub fn take_restart_request(&mut self) -> Option<Duration> {
        self.restart_request.take()
    }

    /// Process killed for a manual restart; start again after `delay`
    pub fn schedule_restart(&mut self, delay: Duration, now: Instant) -> SupervisorResult<()> {
        self.transition(Phase::RestartPending)?;
        self.pid = None;
        self.restart_at = Some(now + delay);
        Ok(())
    }

    /// Explicit shutdown. Idempotent.
    pub fn terminate(&mut self) {
        self.phase = Phase::Terminated;
        self.ready_to_start = false;
        self.restart_request = None;
        self.pid = None;
        self.restart_at = None;
        self.awaiting_since = None;
    }

    pub fn status(&self, alive: bool) -> SupervisorStatus {
        SupervisorStatus {
            phase: self.phase,
            alive,
            ready_to_start: self.ready_to_start,
            pid: self.pid,
            starts: self.starts,
            consecutive_health_failures: self.consecutive_health_failures,
        }
    }
}
