//! Unit tests for the supervisor loop with strict mock expectations
//!
//! Each test pins down which collaborator calls an iteration is allowed to
//! make, independent of any scripted server behaviour.

use chrono::Utc;
use std::time::Duration;

use shared::Phase;
use supervisor::traits::{MockHealthCheck, MockProcessController};
use supervisor::{OutputLine, ProcessInfo, Supervisor, SupervisorCommand, SupervisorConfig, SupervisorError};

mod common;
use common::TestFixtures;

fn process_info() -> ProcessInfo {
    ProcessInfo {
        pid: 4242,
        started_at: Utc::now(),
    }
}

/// Controller that starts fine and whose process stays up without output
fn quiet_running_controller() -> MockProcessController {
    let mut controller = MockProcessController::new();
    controller.expect_start().returning(|_| Ok(process_info()));
    controller.expect_terminate().returning(|| ());
    controller.expect_is_alive().returning(|| true);
    controller.expect_drain_output().returning(Vec::new);
    controller.expect_memory_usage().returning(|| Ok(None));
    controller
}

async fn enabled(
    config: SupervisorConfig,
    controller: MockProcessController,
    prober: MockHealthCheck,
) -> Supervisor<MockProcessController, MockHealthCheck> {
    let mut supervisor = Supervisor::new(config, controller, prober);
    supervisor.apply_command(SupervisorCommand::Start).await;
    supervisor
}

/// Nothing is launched until start is enabled
#[tokio::test]
async fn test_no_start_before_enabled() {
    let (_dir, exe) = TestFixtures::executable();
    let mut controller = MockProcessController::new();
    controller.expect_start().times(0);
    controller.expect_is_alive().returning(|| false);

    let mut supervisor = Supervisor::new(TestFixtures::config(&exe), controller, MockHealthCheck::new());
    for _ in 0..3 {
        supervisor.run_iteration().await;
    }

    assert_eq!(supervisor.phase(), Phase::Idle);
    assert!(!supervisor.state().ready_to_start());
}

/// An empty executable path means the server is never started
#[tokio::test]
async fn test_unconfigured_executable_is_never_started() {
    let mut controller = MockProcessController::new();
    controller.expect_start().times(0);
    controller.expect_is_alive().returning(|| false);

    let config = SupervisorConfig::default().with_executable("");
    let mut supervisor = enabled(config, controller, MockHealthCheck::new()).await;
    for _ in 0..3 {
        supervisor.run_iteration().await;
    }

    assert_eq!(supervisor.phase(), Phase::Idle);
    assert_eq!(supervisor.state().starts(), 0);
}

#[tokio::test]
async fn test_missing_executable_is_never_started() {
    let mut controller = MockProcessController::new();
    controller.expect_start().times(0);
    controller.expect_is_alive().returning(|| false);

    let config = TestFixtures::config("/no/such/dir/FLServer.exe".as_ref());
    let mut supervisor = enabled(config, controller, MockHealthCheck::new()).await;
    for _ in 0..3 {
        supervisor.run_iteration().await;
    }

    assert_eq!(supervisor.phase(), Phase::Idle);
}

/// The executable's directory is the default working directory
#[tokio::test]
async fn test_launch_uses_executable_directory() {
    let (dir, exe) = TestFixtures::executable();
    let expected_dir = dir.path().to_path_buf();

    let mut controller = MockProcessController::new();
    controller
        .expect_start()
        .withf(move |launch| launch.working_directory == expected_dir && launch.process_name == "FLServer.exe")
        .times(1)
        .returning(|_| Ok(process_info()));
    controller.expect_is_alive().returning(|| true);

    let config = TestFixtures::config(&exe).with_arguments(vec!["/c".to_string()]);
    let mut supervisor = enabled(config, controller, MockHealthCheck::new()).await;
    supervisor.run_iteration().await;

    assert_eq!(supervisor.phase(), Phase::AwaitingReady);
    assert_eq!(supervisor.state().pid(), Some(4242));
}

/// Without the marker the health endpoint is never asked
#[tokio::test]
async fn test_no_probe_before_marker() {
    let (_dir, exe) = TestFixtures::executable();
    let mut prober = MockHealthCheck::new();
    prober.expect_ping().times(0);

    let mut supervisor = enabled(TestFixtures::config(&exe), quiet_running_controller(), prober).await;
    for _ in 0..5 {
        supervisor.run_iteration().await;
    }

    assert_eq!(supervisor.phase(), Phase::AwaitingReady);
}

/// An empty marker never matches, so the server can never become ready
#[tokio::test]
async fn test_empty_marker_never_signals_ready() {
    let (_dir, exe) = TestFixtures::executable();
    let mut controller = MockProcessController::new();
    controller.expect_start().returning(|_| Ok(process_info()));
    controller.expect_is_alive().returning(|| true);
    controller
        .expect_drain_output()
        .returning(|| vec![OutputLine::stdout("FLHook ready")]);

    let mut prober = MockHealthCheck::new();
    prober.expect_ping().times(0);

    let config = TestFixtures::config(&exe).with_readiness_marker("");
    let mut supervisor = enabled(config, controller, prober).await;
    for _ in 0..3 {
        supervisor.run_iteration().await;
    }

    assert_eq!(supervisor.phase(), Phase::AwaitingReady);
}

/// A dead process is restarted without ever being probed
#[tokio::test]
async fn test_dead_process_is_never_probed() {
    let (_dir, exe) = TestFixtures::executable();
    let mut controller = MockProcessController::new();
    controller.expect_start().times(3).returning(|_| Ok(process_info()));
    controller.expect_terminate().returning(|| ());
    controller.expect_is_alive().returning(|| false);
    controller
        .expect_drain_output()
        .returning(|| vec![OutputLine::stdout("FLHook ready")]);

    let mut prober = MockHealthCheck::new();
    prober.expect_ping().times(0);

    let mut supervisor = enabled(TestFixtures::config(&exe), controller, prober).await;
    for _ in 0..3 {
        supervisor.run_iteration().await;
    }

    assert_eq!(supervisor.state().starts(), 3);
    assert_eq!(supervisor.phase(), Phase::AwaitingReady);
}

/// Optional readiness deadline forces a restart
#[tokio::test]
async fn test_ready_timeout_forces_restart() {
    let (_dir, exe) = TestFixtures::executable();
    let mut controller = MockProcessController::new();
    controller.expect_start().times(2).returning(|_| Ok(process_info()));
    controller.expect_terminate().times(1).returning(|| ());
    controller.expect_is_alive().returning(|| true);
    controller.expect_drain_output().returning(Vec::new);

    let config = TestFixtures::config(&exe).with_ready_timeout(Some(Duration::from_millis(50)));
    let mut supervisor = enabled(config, controller, MockHealthCheck::new()).await;

    supervisor.run_iteration().await;
    supervisor.run_iteration().await;
    assert_eq!(supervisor.state().starts(), 1);

    tokio::time::sleep(Duration::from_millis(80)).await;
    supervisor.run_iteration().await;

    assert_eq!(supervisor.state().starts(), 2);
    assert_eq!(supervisor.phase(), Phase::AwaitingReady);
}

/// A failing collaborator inside an iteration takes the forced-restart path
#[tokio::test]
async fn test_iteration_error_forces_restart() {
    let (_dir, exe) = TestFixtures::executable();
    let mut controller = MockProcessController::new();
    controller.expect_start().times(2).returning(|_| Ok(process_info()));
    controller.expect_terminate().times(1).returning(|| ());
    controller.expect_is_alive().returning(|| true);
    let mut first_drain = true;
    controller.expect_drain_output().returning(move || {
        if std::mem::take(&mut first_drain) {
            vec![OutputLine::stdout("FLHook ready")]
        } else {
            Vec::new()
        }
    });
    controller
        .expect_memory_usage()
        .returning(|| Err(SupervisorError::config("process table unavailable")));

    let mut prober = MockHealthCheck::new();
    prober.expect_ping().returning(|_| Ok(()));

    let mut supervisor = enabled(TestFixtures::config(&exe), controller, prober).await;
    supervisor.run_iteration().await; // launch
    supervisor.run_iteration().await; // ready, then sampling fails

    assert_eq!(supervisor.state().starts(), 2);
    assert_eq!(supervisor.phase(), Phase::AwaitingReady);
}

/// Health failures below the threshold are tolerated
#[tokio::test]
async fn test_failure_threshold() {
    let (_dir, exe) = TestFixtures::executable();
    let mut controller = MockProcessController::new();
    controller.expect_start().times(1).returning(|_| Ok(process_info()));
    controller.expect_terminate().times(0);
    controller.expect_is_alive().returning(|| true);
    let mut first_drain = true;
    controller.expect_drain_output().returning(move || {
        if std::mem::take(&mut first_drain) {
            vec![OutputLine::stdout("FLHook ready")]
        } else {
            Vec::new()
        }
    });
    controller.expect_memory_usage().returning(|| Ok(Some(1_024)));

    let mut calls = 0u32;
    let mut prober = MockHealthCheck::new();
    prober.expect_ping().returning(move |_| {
        calls += 1;
        if calls == 1 {
            Ok(())
        } else {
            Err(supervisor::ProbeError::Timeout {
                timeout: Duration::from_secs(5),
            })
        }
    });

    let config = TestFixtures::config(&exe).with_health_failure_threshold(3);
    let mut supervisor = enabled(config, controller, prober).await;
    for _ in 0..4 {
        supervisor.run_iteration().await;
    }

    assert_eq!(supervisor.phase(), Phase::Ready);
    assert_eq!(supervisor.state().consecutive_health_failures(), 2);
    // Sampled on every ready iteration, healthy or not
    assert_eq!(supervisor.diagnostics().memory_samples().len(), 3);
}

/// A health check that times out in `Ready` restarts the server at the default threshold
#[tokio::test]
async fn test_health_check_timeout_forces_restart() {
    let (_dir, exe) = TestFixtures::executable();
    let mut controller = MockProcessController::new();
    controller.expect_start().times(2).returning(|_| Ok(process_info()));
    controller.expect_terminate().times(1).returning(|| ());
    controller.expect_is_alive().returning(|| true);
    let mut first_drain = true;
    controller.expect_drain_output().returning(move || {
        if std::mem::take(&mut first_drain) {
            vec![OutputLine::stdout("FLHook ready")]
        } else {
            Vec::new()
        }
    });
    controller.expect_memory_usage().returning(|| Ok(Some(1_024)));

    let mut calls = 0u32;
    let mut prober = MockHealthCheck::new();
    prober.expect_ping().times(2).returning(move |timeout| {
        calls += 1;
        if calls == 1 {
            Ok(())
        } else {
            Err(supervisor::ProbeError::Timeout { timeout })
        }
    });

    let mut supervisor = enabled(TestFixtures::config(&exe), controller, prober).await;
    supervisor.run_iteration().await; // launch
    supervisor.run_iteration().await; // marker and probe
    assert_eq!(supervisor.phase(), Phase::Ready);

    supervisor.run_iteration().await; // health check times out
    assert_eq!(supervisor.state().starts(), 2);
    assert_eq!(supervisor.phase(), Phase::AwaitingReady);
    assert_eq!(supervisor.state().consecutive_health_failures(), 0);
}
