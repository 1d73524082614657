//! Sandbox runtime contract, the local runtime and session management.

mod dev_server;
pub mod local;
pub mod mount;
pub mod runtime;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use dev_server::DevServerState;
pub use local::{LocalRuntime, LocalRuntimeConfig, LocalSandbox, detect_server_url};
pub use mount::{MountEntry, MountTree};
pub use runtime::{
    OUTPUT_DRAIN_GRACE, ProcessChannels, ProcessEvent, Sandbox, SandboxProcess, SandboxRuntime,
    ServerReady, process_channels,
};
pub use session::{BootState, SessionConfig, SessionManager};
