#![cfg(unix)]

use common::{HostError, LayoutPaths, ServerEntry, ServerMode};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::{Duration, Instant};
use supervisor::{StopOutcome, Supervisor};
use tokio::process::Command;

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn entry(name: &str, port: u16) -> ServerEntry {
    ServerEntry::new(name, ServerMode::Storage, "127.0.0.1", port, 1.0)
}

/// Stand-in instance: a shell that sleeps, optionally deaf to SIGTERM.
fn sleeper(root: &std::path::Path, ignore_term: bool) -> Supervisor {
    let script = if ignore_term {
        "trap '' TERM; exec sleep 30"
    } else {
        "exec sleep 30"
    };
    let launcher = move |_: &ServerEntry, _: &LayoutPaths| {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    };
    Supervisor::new(root, Arc::new(launcher))
        .with_stop_timeout(Duration::from_millis(500))
        .with_kill_on_drop(true)
}

#[tokio::test]
async fn start_creates_layout_and_tracks_handle() {
    let root = tempfile::tempdir().unwrap();
    let supervisor = sleeper(root.path(), false);
    let blog = entry("blog", free_port());

    let info = supervisor.start(&blog).await.unwrap();
    assert_eq!(info.name, "blog");
    assert_eq!(info.addr, blog.bind_addr());
    assert!(info.pid.is_some());
    assert!(root.path().join("blog/storage").is_dir());
    assert!(root.path().join("blog/site").is_dir());
    assert!(supervisor.is_running("blog").await);

    supervisor.stop("blog").await.unwrap();
    assert!(!supervisor.is_running("blog").await);
}

#[tokio::test]
async fn second_start_is_already_running() {
    let root = tempfile::tempdir().unwrap();
    let supervisor = sleeper(root.path(), false);
    let blog = entry("blog", free_port());

    supervisor.start(&blog).await.unwrap();
    let err = supervisor.start(&blog).await.unwrap_err();
    assert!(matches!(err, HostError::AlreadyRunning { .. }));

    supervisor.stop_all().await;
}

#[tokio::test]
async fn stop_unknown_and_double_stop_report_not_running() {
    let root = tempfile::tempdir().unwrap();
    let supervisor = sleeper(root.path(), false);

    assert!(supervisor.stop("never").await.unwrap_err().is_not_running());

    let blog = entry("blog", free_port());
    supervisor.start(&blog).await.unwrap();
    assert_eq!(supervisor.stop("blog").await.unwrap(), StopOutcome::Graceful);
    assert!(supervisor.stop("blog").await.unwrap_err().is_not_running());
}

#[tokio::test]
async fn occupied_port_is_a_bind_conflict() {
    let root = tempfile::tempdir().unwrap();
    let supervisor = sleeper(root.path(), false);
    let squatter = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = squatter.local_addr().unwrap().port();

    let err = supervisor.start(&entry("blog", port)).await.unwrap_err();
    match err {
        HostError::BindConflict { name, addr, .. } => {
            assert_eq!(name, "blog");
            assert_eq!(addr, format!("127.0.0.1:{}", port));
        }
        other => panic!("expected bind conflict, got {other}"),
    }
    assert!(!supervisor.is_running("blog").await);
}

#[tokio::test]
async fn unresponsive_instance_is_killed_after_timeout() {
    let root = tempfile::tempdir().unwrap();
    let supervisor = sleeper(root.path(), true);
    supervisor.start(&entry("stuck", free_port())).await.unwrap();
    // Let the shell install its trap before signalling.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let began = Instant::now();
    assert_eq!(supervisor.stop("stuck").await.unwrap(), StopOutcome::Killed);
    assert!(began.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn stop_all_drains_every_handle() {
    let root = tempfile::tempdir().unwrap();
    let supervisor = sleeper(root.path(), false);
    for name in ["a", "b", "c"] {
        supervisor.start(&entry(name, free_port())).await.unwrap();
    }
    assert_eq!(supervisor.running().await.len(), 3);

    let results = supervisor.stop_all().await;
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|(_, outcome)| outcome.is_ok()));
    assert!(supervisor.running().await.is_empty());
    assert!(supervisor.stop_all().await.is_empty());
}

#[tokio::test]
async fn exited_child_is_not_running_and_can_restart() {
    let root = tempfile::tempdir().unwrap();
    let launcher = |_: &ServerEntry, _: &LayoutPaths| Command::new("true");
    let supervisor = Supervisor::new(root.path(), Arc::new(launcher));
    let blog = entry("blog", free_port());

    supervisor.start(&blog).await.unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while supervisor.is_running("blog").await {
        assert!(Instant::now() < deadline, "child never exited");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(supervisor.stop("blog").await.unwrap_err().is_not_running());

    supervisor.start(&blog).await.unwrap();
}

#[tokio::test]
async fn fresh_supervisor_tracks_nothing() {
    let root = tempfile::tempdir().unwrap();
    let first = sleeper(root.path(), false);
    first.start(&entry("blog", free_port())).await.unwrap();
    first.stop_all().await;
    drop(first);

    let second = sleeper(root.path(), false);
    assert!(second.running().await.is_empty());
    assert!(second.stop("blog").await.unwrap_err().is_not_running());
}
