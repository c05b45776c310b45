use std::time::{Duration, Instant};

use anvil_utils::{poll_until, Cmd, CmdStatus};

#[tokio::test]
async fn test_run_captures_stdout_and_stderr_combined() {
    let report = Cmd::new("sh")
        .args(["-c", "echo out; echo err >&2"])
        .run()
        .await;
    assert_eq!(report.status, CmdStatus::Passed);
    assert!(report.passed());
    assert_eq!(report.exit_code, Some(0));
    assert!(report.output.contains("out"));
    assert!(report.output.contains("err"));
    assert!(report.error_summary.is_none());
}

#[tokio::test]
async fn test_failed_run_summarizes_exit_code() {
    let report = Cmd::new("sh").args(["-c", "exit 3"]).run().await;
    assert_eq!(report.status, CmdStatus::Failed);
    assert_eq!(report.exit_code, Some(3));
    assert_eq!(report.error_summary.as_deref(), Some("exit code 3"));
}

#[tokio::test]
async fn test_stderr_error_line_beats_exit_code_in_summary() {
    let report = Cmd::new("sh")
        .args(["-c", "echo 'ERROR: device not responding' >&2; exit 1"])
        .run()
        .await;
    assert_eq!(report.status, CmdStatus::Failed);
    assert_eq!(
        report.error_summary.as_deref(),
        Some("ERROR: device not responding")
    );
}

#[tokio::test]
async fn test_deadline_kills_the_child_promptly() {
    let started = Instant::now();
    let report = Cmd::new("sleep")
        .arg("30")
        .timeout(Duration::from_millis(200))
        .run()
        .await;
    assert_eq!(report.status, CmdStatus::Timeout);
    assert!(report.exit_code.is_none());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_deadline_keeps_output_printed_before_the_kill() {
    let report = Cmd::new("sh")
        .args(["-c", "echo diagnostic progress; sleep 30"])
        .timeout(Duration::from_millis(500))
        .run()
        .await;
    assert_eq!(report.status, CmdStatus::Timeout);
    assert!(report.output.contains("diagnostic progress"));
}

#[tokio::test]
async fn test_spawn_failure_is_a_failed_report_not_a_panic() {
    let report = Cmd::new("/nonexistent/anvil-test-binary").run().await;
    assert_eq!(report.status, CmdStatus::Failed);
    assert!(report.error_summary.unwrap().contains("failed to spawn"));
}

#[tokio::test]
async fn test_poll_until_evaluates_at_least_once() {
    let satisfied = poll_until(
        || async { true },
        Duration::from_millis(0),
        Duration::from_millis(10),
    )
    .await;
    assert!(satisfied);
}

#[tokio::test]
async fn test_poll_until_gives_up_after_the_deadline() {
    let started = Instant::now();
    let satisfied = poll_until(
        || async { false },
        Duration::from_millis(100),
        Duration::from_millis(20),
    )
    .await;
    assert!(!satisfied);
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_poll_until_stops_as_soon_as_satisfied() {
    let mut calls = 0u32;
    let satisfied = poll_until(
        || {
            calls += 1;
            let done = calls >= 3;
            async move { done }
        },
        Duration::from_secs(5),
        Duration::from_millis(10),
    )
    .await;
    assert!(satisfied);
    assert_eq!(calls, 3);
}
