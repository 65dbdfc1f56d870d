// Process - One node subprocess: command line, spawn, exit tracking, signals

use super::role::{AuthorityRole, PortTable, BOOTSTRAP_NODE_KEY};
use super::NodeError;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything needed to build one node's command line
#[derive(Debug, Clone)]
pub struct NodeCommand {
    pub binary: PathBuf,
    pub role: AuthorityRole,
    pub chain: String,
    pub ports: PortTable,
    /// None for the bootstrap node, else the bootstrap node's role
    pub bootnode: Option<AuthorityRole>,
    pub print_logs: bool,
    /// Exported as TMPDIR so `--tmp` databases land under it
    pub tmp_dir: PathBuf,
}

impl NodeCommand {
    pub fn is_bootstrap(&self) -> bool {
        self.bootnode.is_none()
    }

    pub fn args(&self) -> Vec<String> {
        let (rpc_port, p2p_port) = self.ports.ports(self.role);
        let mut args = vec![
            self.role.flag(),
            if self.print_logs { "-linfo" } else { "-lerror" }.to_string(),
            "--chain".to_string(),
            self.chain.clone(),
            "--tmp".to_string(),
            format!("--rpc-port={}", rpc_port),
            format!("--port={}", p2p_port),
        ];

        match self.bootnode {
            None => {
                args.extend([
                    "--node-key".to_string(),
                    BOOTSTRAP_NODE_KEY.to_string(),
                    "-lruntime::offchain=debug".to_string(),
                    "--rpc-cors".to_string(),
                    "all".to_string(),
                    "--rpc-methods=unsafe".to_string(),
                    "--unsafe-rpc-external".to_string(),
                ]);
            }
            Some(bootstrap) => {
                args.push("--bootnodes".to_string());
                args.push(self.ports.bootnode_addr(bootstrap));
            }
        }
        args
    }
}

/// Read-only view of a running node
#[derive(Debug, Clone)]
pub struct NodeProcessHandle {
    pub role: AuthorityRole,
    pub rpc_port: u16,
    pub p2p_port: u16,
    pub pid: u32,
    exit: watch::Receiver<Option<ExitStatus>>,
}

impl NodeProcessHandle {
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.rpc_port)
    }

    pub fn http_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.rpc_port)
    }

    /// False once the OS has reported the process exit
    pub fn is_running(&self) -> bool {
        self.exit.borrow().is_none()
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        *self.exit.borrow()
    }

    /// Resolve when the process exits
    pub async fn wait_exit(&self) -> Option<ExitStatus> {
        let mut exit = self.exit.clone();
        let status = match exit.wait_for(|status| status.is_some()).await {
            Ok(status) => *status,
            // Sender gone without a status: the waiter task was aborted
            Err(_) => None,
        };
        status
    }
}

/// An owned node process. Dropping it kills the process.
pub(crate) struct NodeProcess {
    pub handle: NodeProcessHandle,
    waiter: JoinHandle<()>,
}

impl NodeProcess {
    pub fn spawn(command: &NodeCommand) -> Result<Self, NodeError> {
        let role = command.role;
        let mut cmd = Command::new(&command.binary);
        cmd.args(command.args())
            .env("TMPDIR", &command.tmp_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if command.print_logs {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let mut child = cmd.spawn().map_err(|source| NodeError::SpawnFailed {
            role,
            binary: command.binary.clone(),
            source,
        })?;

        let pid = child.id().ok_or(NodeError::ExitedDuringStartup { role, status: None })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, role));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, role));
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let waiter = tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => {
                    debug!(%role, %status, "Node process exited");
                    let _ = exit_tx.send(Some(status));
                }
                Err(e) => warn!(%role, error = %e, "Failed to wait for node process"),
            }
        });

        let (rpc_port, p2p_port) = command.ports.ports(role);
        info!(%role, pid, rpc_port, p2p_port, bootstrap = command.is_bootstrap(), "Node spawned");

        Ok(Self {
            handle: NodeProcessHandle {
                role,
                rpc_port,
                p2p_port,
                pid,
                exit: exit_rx,
            },
            waiter,
        })
    }

    pub fn interrupt(&self) -> io::Result<()> {
        send_signal(self.handle.pid, libc::SIGINT)
    }

    pub fn kill(&self) -> io::Result<()> {
        send_signal(self.handle.pid, libc::SIGKILL)
    }
}

impl Drop for NodeProcess {
    fn drop(&mut self) {
        // Dropping the child inside the aborted task triggers kill_on_drop
        self.waiter.abort();
    }
}

fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let result = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

async fn forward_lines<R>(reader: R, role: AuthorityRole)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        info!(target: "node", role = %role, "{}", line);
    }
}
