// Node - Local network of node subprocesses

pub mod orchestrator;
pub mod process;
pub mod role;

pub use orchestrator::{OrchestratorSettings, ProcessOrchestrator, StopReport, StoppedNode};
pub use process::{NodeCommand, NodeProcessHandle};
pub use role::{AuthorityRole, PortTable, UnknownRole, BOOTSTRAP_NODE_KEY, BOOTSTRAP_PEER_ID};

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

/// Node process errors
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("Failed to spawn {role} node from {}: {source}", .binary.display())]
    SpawnFailed {
        role: AuthorityRole,
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{role} node exited during startup (status: {status:?})")]
    ExitedDuringStartup {
        role: AuthorityRole,
        status: Option<ExitStatus>,
    },

    #[error("{role} node not ready after {timeout:?}: {last_error}")]
    NotReady {
        role: AuthorityRole,
        timeout: Duration,
        last_error: String,
    },

    #[error("Bootstrap {bootstrap} node is not running; start it again before {role}")]
    BootstrapGone {
        bootstrap: AuthorityRole,
        role: AuthorityRole,
    },

    #[error("{role} node (pid {pid}) still running {timeout:?} after SIGKILL")]
    StopTimeout {
        role: AuthorityRole,
        pid: u32,
        timeout: Duration,
    },

    #[error("Failed to signal {role} node: {source}")]
    Signal {
        role: AuthorityRole,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to purge {}: {source}", .path.display())]
    Purge {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
