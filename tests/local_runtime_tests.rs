//! End-to-end tests of the library over `LocalRuntime` with real `sh` commands.
#![cfg(unix)]

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use scaffold::errors::DevServerError;
use scaffold::executor::{CommandExecutor, ExecutionSummary, ExecutorEvent};
use scaffold::reducer::{CommandQueueEntry, Reducer};
use scaffold::sandbox::{
    BootState, DevServerState, LocalRuntime, LocalRuntimeConfig, SessionConfig, SessionManager,
};
use scaffold::step::StepStatus;
use scaffold::workspace::Workspace;

fn session(dir: &TempDir, install: &str, dev: &str, timeout: Duration) -> Arc<SessionManager> {
    let runtime = Arc::new(LocalRuntime::new(LocalRuntimeConfig {
        root: dir.path().join("sandbox"),
        shell: "sh".to_string(),
        preserve: vec!["node_modules".to_string()],
    }));
    Arc::new(SessionManager::new(
        runtime,
        SessionConfig {
            shell: "sh".to_string(),
            install_command: install.to_string(),
            dev_command: dev.to_string(),
            ready_timeout: timeout,
        },
    ))
}

const RESPONSE: &str = r#"<boltArtifact id="demo" title="Demo">
<boltAction type="file" filePath="greeting.txt">hello</boltAction>
<boltAction type="file" filePath="lib/words.txt">one
two</boltAction>
<boltAction type="shell">npm install</boltAction>
<boltAction type="shell">cat greeting.txt > copy.txt</boltAction>
<boltAction type="shell">wc -l lib/words.txt</boltAction>
</boltArtifact>"#;

#[tokio::test]
async fn test_full_pipeline_mounts_and_runs_commands() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir, "true", "true", Duration::from_secs(5));
    let (tx, mut rx) = mpsc::channel(64);
    let executor = CommandExecutor::new(Arc::clone(&session)).with_event_channel(tx);

    let mut workspace = Workspace::new(Reducer::default());
    let ingest = workspace.ingest(RESPONSE);
    assert_eq!(ingest.queued, 2);
    assert_eq!(ingest.skipped, 1);

    workspace.mount(&session).await.unwrap();
    assert_eq!(session.boot_state().await, BootState::Ready);

    let summary = workspace.run_commands(&executor).await;
    assert_eq!(summary, ExecutionSummary { completed: 2, failed: 0 });
    assert!(workspace.steps().iter().all(|s| s.status == StepStatus::Completed));

    let root = dir.path().join("sandbox");
    assert_eq!(fs::read_to_string(root.join("copy.txt")).unwrap(), "hello");

    drop(executor);
    let mut saw_wc_output = false;
    while let Some(event) = rx.recv().await {
        if let ExecutorEvent::Output { step_id: 5, line } = event {
            saw_wc_output |= line.contains("lib/words.txt");
        }
    }
    assert!(saw_wc_output);

    session.teardown().await.unwrap();
    assert_eq!(session.boot_state().await, BootState::Unbooted);
}

#[tokio::test]
async fn test_remount_keeps_preserved_directories() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir, "true", "true", Duration::from_secs(5));
    let executor = CommandExecutor::new(Arc::clone(&session));

    let mut workspace = Workspace::default();
    workspace.ingest(
        r#"<boltArtifact><boltAction type="file" filePath="a.txt">a</boltAction></boltArtifact>
<execute><command>mkdir -p node_modules/pkg && touch stray.txt</command></execute>"#,
    );
    workspace.mount(&session).await.unwrap();
    workspace.run_commands(&executor).await;

    workspace.ingest(
        r#"<boltArtifact><boltAction type="file" filePath="b.txt">b</boltAction></boltArtifact>"#,
    );
    workspace.mount(&session).await.unwrap();

    let root = dir.path().join("sandbox");
    assert!(root.join("a.txt").is_file());
    assert!(root.join("b.txt").is_file());
    assert!(root.join("node_modules").is_dir());
    assert!(!root.join("stray.txt").exists());
    session.teardown().await.unwrap();
}

#[tokio::test]
async fn test_failed_command_does_not_stop_the_queue() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir, "true", "true", Duration::from_secs(5));
    let executor = CommandExecutor::new(Arc::clone(&session));

    let mut workspace = Workspace::default();
    workspace.ingest(
        r#"<boltArtifact>
<boltAction type="shell">exit 2</boltAction>
<boltAction type="shell">touch ran.txt</boltAction>
</boltArtifact>"#,
    );
    workspace.mount(&session).await.unwrap();
    let summary = workspace.run_commands(&executor).await;

    assert_eq!(summary, ExecutionSummary { completed: 1, failed: 1 });
    assert_eq!(workspace.step(1).unwrap().status, StepStatus::Error);
    assert_eq!(workspace.step(2).unwrap().status, StepStatus::Completed);
    assert!(dir.path().join("sandbox/ran.txt").exists());
    session.teardown().await.unwrap();
}

#[tokio::test]
async fn test_dev_server_reports_its_url() {
    let dir = TempDir::new().unwrap();
    let session = session(
        &dir,
        "true",
        "printf '  > Local:   \\033[36mhttp://localhost:5173/\\033[0m\\n'; sleep 30",
        Duration::from_secs(10),
    );

    let url = session.start_dev_server().await.unwrap();
    assert_eq!(url.as_deref(), Some("http://localhost:5173/"));
    assert_eq!(
        session.dev_server_url().await.as_deref(),
        Some("http://localhost:5173/")
    );

    session.teardown().await.unwrap();
    assert_eq!(session.dev_server_state().await, DevServerState::NotStarted);
}

#[tokio::test]
async fn test_install_failure_falls_back_to_starting_the_server() {
    let dir = TempDir::new().unwrap();
    let session = session(
        &dir,
        "exit 1",
        "echo 'http://127.0.0.1:8080'; sleep 30",
        Duration::from_secs(10),
    );

    let url = session.start_dev_server().await.unwrap();
    assert_eq!(url.as_deref(), Some("http://127.0.0.1:8080"));
    session.teardown().await.unwrap();
}

#[tokio::test]
async fn test_dev_server_timeout_returns_none() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir, "", "sleep 30", Duration::from_millis(300));

    let url = session.start_dev_server().await.unwrap();
    assert_eq!(url, None);
    assert_eq!(session.dev_server_state().await, DevServerState::TimedOut);
    session.teardown().await.unwrap();
}

#[tokio::test]
async fn test_dev_server_exiting_early_is_an_error() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir, "", "echo boom; exit 4", Duration::from_secs(10));

    let err = session.start_dev_server().await.unwrap_err();
    assert!(matches!(
        err,
        DevServerError::ExitedEarly {
            code: 4,
            install_failed: false
        }
    ));
    session.teardown().await.unwrap();
}

#[tokio::test]
async fn test_background_child_does_not_hold_the_command_open() {
    let dir = TempDir::new().unwrap();
    let session = session(&dir, "true", "true", Duration::from_secs(5));
    let (tx, mut rx) = mpsc::channel(64);
    let executor = CommandExecutor::new(Arc::clone(&session)).with_event_channel(tx);

    let entry = CommandQueueEntry {
        step_id: 1,
        command: "sleep 10 & echo started".to_string(),
    };
    let status = tokio::time::timeout(Duration::from_secs(3), executor.execute(&entry))
        .await
        .expect("command should finish when the shell exits");
    assert_eq!(status, StepStatus::Completed);

    drop(executor);
    let mut saw_started = false;
    while let Some(event) = rx.recv().await {
        if let ExecutorEvent::Output { line, .. } = event {
            saw_started |= line == "started";
        }
    }
    assert!(saw_started);
    session.teardown().await.unwrap();
}

#[tokio::test]
async fn test_background_child_of_install_does_not_block_the_dev_server() {
    let dir = TempDir::new().unwrap();
    let session = session(
        &dir,
        "sleep 10 & true",
        "echo 'http://localhost:5174/'; sleep 30",
        Duration::from_secs(10),
    );

    let url = tokio::time::timeout(Duration::from_secs(3), session.start_dev_server())
        .await
        .expect("install should finish when the shell exits")
        .unwrap();
    assert_eq!(url.as_deref(), Some("http://localhost:5174/"));
    session.teardown().await.unwrap();
}
