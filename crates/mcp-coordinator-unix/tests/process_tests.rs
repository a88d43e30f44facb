#![cfg(unix)]

use mcp_coordinator_core::{
    LaunchRequest, ProcessError, ProcessHandle, ProcessLauncher, TerminationResult, process_env,
};
use mcp_coordinator_unix::UnixProcessManager;
use nix::errno::Errno;
use nix::sys::signal;
use nix::unistd::Pid;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

fn request<'a>(
    command: &'a str,
    args: &'a [String],
    env: &'a HashMap<String, String>,
) -> LaunchRequest<'a> {
    LaunchRequest {
        server_name: "test",
        command,
        args,
        env,
        working_dir: None,
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_spawn_and_terminate() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let manager = UnixProcessManager::new();
    let env = process_env();
    let args = strings(&["30"]);

    let spawned = manager.spawn(request("sleep", &args, &env)).unwrap();
    let handle = spawned.handle;
    let pid = handle.pid().expect("spawned process has a pid");
    assert!(!handle.has_exited());
    assert_eq!(handle.command(), "sleep");

    let result = handle.terminate(Duration::from_secs(2)).await;
    assert_eq!(result, TerminationResult::Success);
    assert!(handle.has_exited());

    let probe = signal::kill(Pid::from_raw(pid as i32), None);
    assert_eq!(probe, Err(Errno::ESRCH));

    // Terminating twice is harmless
    assert_eq!(
        handle.terminate(Duration::from_millis(100)).await,
        TerminationResult::ProcessNotFound
    );
}

#[tokio::test]
async fn test_sigterm_ignored_escalates_to_sigkill() {
    let manager = UnixProcessManager::new();
    let env = process_env();
    let args = strings(&["-c", "trap '' TERM; sleep 30"]);

    let spawned = manager.spawn(request("/bin/sh", &args, &env)).unwrap();
    let handle = spawned.handle;
    // Give the shell time to install its trap
    tokio::time::sleep(Duration::from_millis(200)).await;

    let result = handle.terminate(Duration::from_millis(300)).await;
    assert_eq!(result, TerminationResult::Success);
    assert!(handle.has_exited());
}

#[tokio::test]
async fn test_natural_exit_is_observed() {
    let manager = UnixProcessManager::new();
    let env = process_env();
    let args: Vec<String> = Vec::new();

    let spawned = manager.spawn(request("true", &args, &env)).unwrap();
    let status = tokio::time::timeout(Duration::from_secs(5), spawned.handle.wait_for_exit())
        .await
        .expect("exit observed");
    assert!(status.success());
    assert!(spawned.handle.has_exited());
}

#[tokio::test]
async fn test_missing_command_fails_to_spawn() {
    let manager = UnixProcessManager::new();
    let env = process_env();
    let args: Vec<String> = Vec::new();

    let result = manager.spawn(request("/definitely/not/a/real/binary", &args, &env));
    assert!(matches!(result, Err(ProcessError::IoError(_))));
}

#[tokio::test]
async fn test_child_sees_only_given_environment() {
    let manager = UnixProcessManager::new();
    let mut env = HashMap::new();
    env.insert("GREETING".to_string(), "hello".to_string());
    let args = strings(&["-c", "echo \"$GREETING:${HOME:-unset}\""]);

    let spawned = manager.spawn(request("/bin/sh", &args, &env)).unwrap();
    let mut lines = BufReader::new(spawned.stdout).lines();
    let line = lines.next_line().await.unwrap();
    assert_eq!(line.as_deref(), Some("hello:unset"));
}

#[tokio::test]
async fn test_pipes_carry_data() {
    let manager = UnixProcessManager::new();
    let env = process_env();
    let args: Vec<String> = Vec::new();

    let spawned = manager.spawn(request("cat", &args, &env)).unwrap();
    let mut stdin = spawned.stdin;
    stdin.write_all(b"ping\n").await.unwrap();
    stdin.flush().await.unwrap();

    let mut lines = BufReader::new(spawned.stdout).lines();
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ping"));

    drop(stdin);
    let status = tokio::time::timeout(Duration::from_secs(5), spawned.handle.wait_for_exit())
        .await
        .expect("cat exits on EOF");
    assert!(status.success());
}

#[test]
fn test_platform_name() {
    assert_eq!(UnixProcessManager::new().platform_name(), "unix");
}
