//! A sandbox runtime backed by a host directory and host processes.
//!
//! The work directory plays the sandbox file system and commands run through
//! the configured shell inside it. Output lines that mention a local URL
//! (`http://localhost:5173/`, `http://127.0.0.1:3000`, ...) are announced as
//! server readiness.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::mount::{MountEntry, MountTree};
use super::runtime::{
    ProcessChannels, Sandbox, SandboxProcess, SandboxRuntime, ServerReady, process_channels,
};
use crate::errors::SandboxError;

static ANSI_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").unwrap());

static LOCAL_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(https?)://(localhost|127\.0\.0\.1|0\.0\.0\.0|\[::1?\]):(\d{1,5})(/\S*)?").unwrap()
});

/// Find the first local server URL in a line of process output.
pub fn detect_server_url(line: &str) -> Option<ServerReady> {
    let clean = ANSI_REGEX.replace_all(line, "");
    let cap = LOCAL_URL_REGEX.captures(&clean)?;
    let port: u16 = cap.get(3)?.as_str().parse().ok()?;
    let scheme = cap.get(1)?.as_str();
    let host = match cap.get(2)?.as_str() {
        // Wildcard binds are reachable through loopback.
        "0.0.0.0" | "[::]" => "localhost",
        host => host,
    };
    let path = cap.get(4).map(|m| m.as_str()).unwrap_or("");
    Some(ServerReady {
        port,
        url: format!("{}://{}:{}{}", scheme, host, port, path),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRuntimeConfig {
    /// Directory that becomes the sandbox file system.
    pub root: PathBuf,
    /// Shell used to probe the environment at boot.
    pub shell: String,
    /// Top-level entries a mount leaves in place.
    pub preserve: Vec<String>,
}

pub struct LocalRuntime {
    config: LocalRuntimeConfig,
}

impl LocalRuntime {
    pub fn new(config: LocalRuntimeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SandboxRuntime for LocalRuntime {
    async fn boot(&self) -> Result<Arc<dyn Sandbox>, SandboxError> {
        let shell = &self.config.shell;
        let probe = Command::new(shell)
            .arg("-c")
            .arg("exit 0")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match probe {
            Ok(status) if status.success() => {}
            Ok(status) => {
                return Err(SandboxError::Unsupported(format!(
                    "shell '{}' failed its probe with {}",
                    shell, status
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SandboxError::Unsupported(format!(
                    "shell '{}' not found",
                    shell
                )));
            }
            Err(e) => {
                return Err(SandboxError::BootFailed(format!(
                    "could not run shell '{}': {}",
                    shell, e
                )));
            }
        }

        let root = &self.config.root;
        tokio::fs::create_dir_all(root).await.map_err(io_at(root))?;

        let (ready_tx, _) = broadcast::channel(16);
        let (shutdown_tx, _) = broadcast::channel(1);
        info!(root = %root.display(), "local sandbox booted");

        let sandbox: Arc<dyn Sandbox> = Arc::new(LocalSandbox {
            root: root.clone(),
            preserve: self.config.preserve.clone(),
            ready_tx,
            shutdown_tx,
        });
        Ok(sandbox)
    }
}

pub struct LocalSandbox {
    root: PathBuf,
    preserve: Vec<String>,
    ready_tx: broadcast::Sender<ServerReady>,
    shutdown_tx: broadcast::Sender<()>,
}

impl LocalSandbox {
    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn clear_root(&self) -> Result<(), SandboxError> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(io_at(&self.root))?;
        while let Some(entry) = dir.next_entry().await.map_err(io_at(&self.root))? {
            let name = entry.file_name();
            if self.preserve.iter().any(|p| name.to_str() == Some(p.as_str())) {
                continue;
            }
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(io_at(&path))?;
            if file_type.is_dir() {
                tokio::fs::remove_dir_all(&path).await.map_err(io_at(&path))?;
            } else {
                tokio::fs::remove_file(&path).await.map_err(io_at(&path))?;
            }
        }
        Ok(())
    }

    async fn write_tree(&self, tree: &MountTree) -> Result<(), SandboxError> {
        let mut pending: Vec<(PathBuf, &MountTree)> = vec![(self.root.clone(), tree)];
        while let Some((dir, tree)) = pending.pop() {
            for (name, entry) in tree.entries() {
                if !is_safe_name(name) {
                    return Err(SandboxError::UnsafePath(name.to_string()));
                }
                let path = dir.join(name);
                match entry {
                    MountEntry::File { contents } => {
                        tokio::fs::write(&path, contents)
                            .await
                            .map_err(io_at(&path))?;
                    }
                    MountEntry::Directory(children) => {
                        tokio::fs::create_dir_all(&path)
                            .await
                            .map_err(io_at(&path))?;
                        pending.push((path, children));
                    }
                }
            }
        }
        Ok(())
    }
}

fn io_at(path: &Path) -> impl FnOnce(std::io::Error) -> SandboxError {
    let path = path.to_path_buf();
    move |source| SandboxError::Io { path, source }
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn mount(&self, tree: &MountTree) -> Result<(), SandboxError> {
        self.clear_root().await?;
        self.write_tree(tree).await?;
        debug!(root = %self.root.display(), files = tree.file_count(), "mounted tree");
        Ok(())
    }

    async fn spawn(&self, program: &str, args: &[String]) -> Result<SandboxProcess, SandboxError> {
        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SandboxError::SpawnFailed {
                command: program.to_string(),
                source,
            })?;

        let (process, channels) = process_channels();
        let ProcessChannels { output, exit, mut kill } = channels;

        let announced = Arc::new(AtomicBool::new(false));
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(
                stdout,
                output.clone(),
                self.ready_tx.clone(),
                Arc::clone(&announced),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(
                stderr,
                output,
                self.ready_tx.clone(),
                announced,
            ));
        }

        let mut shutdown = self.shutdown_tx.subscribe();
        let label = program.to_string();
        tokio::spawn(async move {
            let finished = tokio::select! {
                status = child.wait() => Some(status),
                _ = &mut kill => None,
                _ = shutdown.recv() => None,
            };
            let status = match finished {
                Some(status) => status,
                None => {
                    debug!(program = %label, "killing sandbox process");
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let code = match status {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    warn!(program = %label, error = %e, "failed to wait for sandbox process");
                    -1
                }
            };
            let _ = exit.send(code);
        });

        Ok(process)
    }

    fn server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready_tx.subscribe()
    }

    async fn teardown(&self) -> Result<(), SandboxError> {
        let _ = self.shutdown_tx.send(());
        info!(root = %self.root.display(), "local sandbox torn down");
        Ok(())
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(
    reader: R,
    output: mpsc::UnboundedSender<String>,
    ready: broadcast::Sender<ServerReady>,
    announced: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !announced.load(Ordering::SeqCst)
                    && let Some(server) = detect_server_url(&line)
                    && !announced.swap(true, Ordering::SeqCst)
                {
                    debug!(url = %server.url, "server readiness detected in output");
                    let _ = ready.send(server);
                }
                let _ = output.send(line);
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "stopped reading process output");
                break;
            }
        }
    }
}
