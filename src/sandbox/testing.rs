//! Scripted in-memory runtime for tests.
//!
//! Boots are counted and can be delayed or made to fail. Spawned commands
//! replay a [`Script`] keyed by the command string (the last argument, so
//! `sh -c "npm install"` is keyed by `npm install`). Unscripted commands exit
//! 0 immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::mount::MountTree;
use super::runtime::{
    ProcessChannels, Sandbox, SandboxProcess, SandboxRuntime, ServerReady, process_channels,
};
use crate::errors::SandboxError;

#[derive(Debug, Clone, Default)]
pub(crate) struct Script {
    exit_code: i32,
    delay: Duration,
    lines: Vec<String>,
    ready_port: Option<u16>,
    hang: bool,
    spawn_error: bool,
}

impl Script {
    pub(crate) fn exit(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub(crate) fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn line(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    /// Announce a server on `port` right after start.
    pub(crate) fn ready(mut self, port: u16) -> Self {
        self.ready_port = Some(port);
        self
    }

    /// Keep running until killed.
    pub(crate) fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    pub(crate) fn spawn_error(mut self) -> Self {
        self.spawn_error = true;
        self
    }
}

pub(crate) struct ScriptedSandbox {
    scripts: Mutex<HashMap<String, Script>>,
    spawned: Mutex<Vec<String>>,
    mounts: Mutex<Vec<MountTree>>,
    fail_mounts: AtomicBool,
    torn_down: AtomicBool,
    kills: Arc<AtomicUsize>,
    ready_tx: broadcast::Sender<ServerReady>,
}

impl ScriptedSandbox {
    fn new() -> Self {
        let (ready_tx, _) = broadcast::channel(16);
        Self {
            scripts: Mutex::new(HashMap::new()),
            spawned: Mutex::new(Vec::new()),
            mounts: Mutex::new(Vec::new()),
            fail_mounts: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            kills: Arc::new(AtomicUsize::new(0)),
            ready_tx,
        }
    }

    pub(crate) fn script(&self, command: &str, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert(command.to_string(), script);
    }

    /// Commands in the order they were spawned.
    pub(crate) fn spawned(&self) -> Vec<String> {
        self.spawned.lock().unwrap().clone()
    }

    pub(crate) fn mounts(&self) -> Vec<MountTree> {
        self.mounts.lock().unwrap().clone()
    }

    pub(crate) fn fail_mounts(&self) {
        self.fail_mounts.store(true, Ordering::SeqCst);
    }

    pub(crate) fn torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_for_kills(&self, expected: usize) {
        for _ in 0..200 {
            if self.kills.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} kills, saw {}",
            expected,
            self.kills.load(Ordering::SeqCst)
        );
    }
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    async fn mount(&self, tree: &MountTree) -> Result<(), SandboxError> {
        if self.fail_mounts.load(Ordering::SeqCst) {
            return Err(SandboxError::Io {
                path: "/".into(),
                source: std::io::Error::other("scripted mount failure"),
            });
        }
        self.mounts.lock().unwrap().push(tree.clone());
        Ok(())
    }

    async fn spawn(&self, program: &str, args: &[String]) -> Result<SandboxProcess, SandboxError> {
        let command = args.last().cloned().unwrap_or_else(|| program.to_string());
        self.spawned.lock().unwrap().push(command.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&command)
            .cloned()
            .unwrap_or_default();

        if script.spawn_error {
            return Err(SandboxError::SpawnFailed {
                command,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted spawn failure"),
            });
        }

        let (process, channels) = process_channels();
        let ready = self.ready_tx.clone();
        let kills = Arc::clone(&self.kills);
        tokio::spawn(async move {
            let ProcessChannels {
                output,
                exit,
                mut kill,
            } = channels;
            for line in script.lines {
                let _ = output.send(line);
            }
            drop(output);
            if let Some(port) = script.ready_port {
                let _ = ready.send(ServerReady {
                    port,
                    url: format!("http://localhost:{}", port),
                });
            }

            let killed = if script.hang {
                let _ = (&mut kill).await;
                true
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(script.delay) => false,
                    _ = &mut kill => true,
                }
            };
            if killed {
                kills.fetch_add(1, Ordering::SeqCst);
            }
            let _ = exit.send(if killed { -1 } else { script.exit_code });
        });

        Ok(process)
    }

    fn server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready_tx.subscribe()
    }

    async fn teardown(&self) -> Result<(), SandboxError> {
        self.torn_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct ScriptedRuntime {
    boots: AtomicUsize,
    failing_boots: AtomicUsize,
    unsupported: bool,
    boot_delay: Duration,
    sandbox: Arc<ScriptedSandbox>,
}

impl ScriptedRuntime {
    pub(crate) fn new() -> Self {
        Self {
            boots: AtomicUsize::new(0),
            failing_boots: AtomicUsize::new(0),
            unsupported: false,
            boot_delay: Duration::ZERO,
            sandbox: Arc::new(ScriptedSandbox::new()),
        }
    }

    pub(crate) fn with_boot_delay(mut self, delay: Duration) -> Self {
        self.boot_delay = delay;
        self
    }

    /// Make the next `count` boots fail.
    pub(crate) fn with_failing_boots(self, count: usize) -> Self {
        self.failing_boots.store(count, Ordering::SeqCst);
        self
    }

    pub(crate) fn unsupported(mut self) -> Self {
        self.unsupported = true;
        self
    }

    pub(crate) fn boot_count(&self) -> usize {
        self.boots.load(Ordering::SeqCst)
    }

    /// The sandbox every successful boot hands out.
    pub(crate) fn sandbox(&self) -> Arc<ScriptedSandbox> {
        Arc::clone(&self.sandbox)
    }
}

#[async_trait]
impl SandboxRuntime for ScriptedRuntime {
    async fn boot(&self) -> Result<Arc<dyn Sandbox>, SandboxError> {
        self.boots.fetch_add(1, Ordering::SeqCst);
        if !self.boot_delay.is_zero() {
            tokio::time::sleep(self.boot_delay).await;
        }
        if self.unsupported {
            return Err(SandboxError::Unsupported(
                "scripted runtime refuses to boot".to_string(),
            ));
        }
        if self
            .failing_boots
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SandboxError::BootFailed("scripted boot failure".to_string()));
        }
        let sandbox: Arc<dyn Sandbox> = self.sandbox.clone();
        Ok(sandbox)
    }
}
