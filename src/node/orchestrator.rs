// Orchestrator - Start, probe and stop a set of peered node processes
//
// The first node started in a run is the bootstrap peer, launched with the
// fixed node key. Every later node dials it through --bootnodes; while it is
// down only its own role can be started again. Stopping signals all nodes,
// awaits each exit and escalates to SIGKILL on timeout.

use super::process::{NodeCommand, NodeProcess, NodeProcessHandle};
use super::role::{AuthorityRole, PortTable};
use super::NodeError;
use crate::rpc::HttpClient;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// Orchestrator knobs
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub binary: PathBuf,
    pub chain: String,
    pub tmp_dir: PathBuf,
    pub ports: PortTable,
    pub print_logs: bool,
    pub startup_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub port_release_delay: Duration,
    pub probe_interval: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("target/release/firechain-node"),
            chain: "qa-dev".to_string(),
            tmp_dir: PathBuf::from("tmp/fire"),
            ports: PortTable::default(),
            print_logs: false,
            startup_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(10),
            port_release_delay: Duration::ZERO,
            probe_interval: Duration::from_millis(500),
        }
    }
}

/// How one node went down
#[derive(Debug, Clone)]
pub struct StoppedNode {
    pub role: AuthorityRole,
    pub status: Option<ExitStatus>,
    /// SIGINT was not enough and SIGKILL was sent
    pub forced: bool,
}

/// Outcome of [`ProcessOrchestrator::stop_all`]
#[derive(Debug, Clone, Default)]
pub struct StopReport {
    pub stopped: Vec<StoppedNode>,
}

impl StopReport {
    pub fn forced(&self) -> impl Iterator<Item = &StoppedNode> {
        self.stopped.iter().filter(|n| n.forced)
    }

    pub fn all_graceful(&self) -> bool {
        self.forced().next().is_none()
    }
}

/// Owns every node process of a run
pub struct ProcessOrchestrator {
    settings: OrchestratorSettings,
    /// In start order
    nodes: Vec<NodeProcess>,
    /// Role launched with the bootstrap node key in this run
    bootstrap: Option<AuthorityRole>,
}

impl ProcessOrchestrator {
    pub fn new(settings: OrchestratorSettings) -> Self {
        Self {
            settings,
            nodes: Vec::new(),
            bootstrap: None,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn handles(&self) -> Vec<NodeProcessHandle> {
        self.nodes.iter().map(|n| n.handle.clone()).collect()
    }

    pub fn handle(&self, role: AuthorityRole) -> Option<NodeProcessHandle> {
        self.nodes
            .iter()
            .find(|n| n.handle.role == role)
            .map(|n| n.handle.clone())
    }

    /// The bootstrap role, while its process runs
    pub fn bootstrap(&self) -> Option<AuthorityRole> {
        self.bootstrap.filter(|&role| self.is_running(role))
    }

    fn is_running(&self, role: AuthorityRole) -> bool {
        self.nodes.iter().any(|n| n.handle.role == role && n.handle.is_running())
    }

    pub fn running_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.handle.is_running()).count()
    }

    /// Start the given roles in order and wait until each answers `system_health`.
    /// Roles already running are returned as they are.
    pub async fn start_nodes(&mut self, roles: &[AuthorityRole]) -> Result<Vec<NodeProcessHandle>, NodeError> {
        self.nodes.retain(|n| {
            if !n.handle.is_running() {
                warn!(role = %n.handle.role, status = ?n.handle.exit_status(), "Forgetting exited node");
            }
            n.handle.is_running()
        });

        if self.nodes.is_empty() {
            self.bootstrap = None;
            self.purge_tmp()?;
        }
        std::fs::create_dir_all(&self.settings.tmp_dir).map_err(|source| NodeError::Purge {
            path: self.settings.tmp_dir.clone(),
            source,
        })?;

        let mut handles = Vec::with_capacity(roles.len());
        for &role in roles {
            if let Some(existing) = self.handle(role) {
                debug!(%role, "Node already running");
                handles.push(existing);
                continue;
            }

            let command = self.node_command(role)?;
            let process = NodeProcess::spawn(&command)?;
            let handle = process.handle.clone();
            self.track(&command, process);

            if let Err(e) = self.wait_ready(&handle).await {
                // Dropping the process kills it
                self.nodes.retain(|n| n.handle.role != role);
                return Err(e);
            }
            handles.push(handle);
        }

        info!(nodes = self.nodes.len(), "Network started");
        Ok(handles)
    }

    /// Command line for `role`. With no bootstrap yet, or when `role` is the
    /// bootstrap coming back, it carries the bootstrap node key; otherwise it
    /// dials the running bootstrap node.
    pub fn node_command(&self, role: AuthorityRole) -> Result<NodeCommand, NodeError> {
        let bootnode = match self.bootstrap {
            None => None,
            Some(bootstrap) if self.is_running(bootstrap) => Some(bootstrap),
            Some(bootstrap) if bootstrap == role => None,
            Some(bootstrap) => return Err(NodeError::BootstrapGone { bootstrap, role }),
        };

        Ok(NodeCommand {
            binary: self.settings.binary.clone(),
            role,
            chain: self.settings.chain.clone(),
            ports: self.settings.ports,
            bootnode,
            print_logs: self.settings.print_logs,
            tmp_dir: self.settings.tmp_dir.clone(),
        })
    }

    fn track(&mut self, command: &NodeCommand, process: NodeProcess) {
        if command.is_bootstrap() {
            self.bootstrap = Some(command.role);
        }
        self.nodes.push(process);
    }

    /// Poll `system_health` over HTTP until the node answers, exits, or the startup timeout passes
    async fn wait_ready(&self, handle: &NodeProcessHandle) -> Result<(), NodeError> {
        let role = handle.role;
        let client = HttpClient::new(&handle.http_url(), self.settings.probe_interval.max(Duration::from_secs(1)))
            .map_err(|e| NodeError::NotReady {
                role,
                timeout: self.settings.startup_timeout,
                last_error: e.to_string(),
            })?;

        let started = Instant::now();
        let deadline = started + self.settings.startup_timeout;
        let mut last_error = String::from("no probe attempted");

        loop {
            if !handle.is_running() {
                return Err(NodeError::ExitedDuringStartup {
                    role,
                    status: handle.exit_status(),
                });
            }

            match client.health().await {
                Ok(health) => {
                    info!(%role, peers = health.peers, elapsed_ms = started.elapsed().as_millis() as u64, "Node ready");
                    return Ok(());
                }
                Err(e) => last_error = e.to_string(),
            }

            if Instant::now() >= deadline {
                return Err(NodeError::NotReady {
                    role,
                    timeout: self.settings.startup_timeout,
                    last_error,
                });
            }
            sleep(self.settings.probe_interval).await;
        }
    }

    /// SIGINT every node, await each exit, SIGKILL on timeout
    pub async fn stop_all(&mut self) -> Result<StopReport, NodeError> {
        if self.nodes.is_empty() {
            return Ok(StopReport::default());
        }

        for node in &self.nodes {
            if node.handle.is_running() {
                if let Err(e) = node.interrupt() {
                    debug!(role = %node.handle.role, error = %e, "SIGINT failed");
                }
            }
        }

        let shutdown_timeout = self.settings.shutdown_timeout;
        let results = join_all(self.nodes.iter().map(|node| stop_one(node, shutdown_timeout))).await;
        self.nodes.clear();
        self.bootstrap = None;

        let mut report = StopReport::default();
        for result in results {
            report.stopped.push(result?);
        }

        if !self.settings.port_release_delay.is_zero() {
            sleep(self.settings.port_release_delay).await;
        }

        info!(
            stopped = report.stopped.len(),
            forced = report.forced().count(),
            "Network stopped"
        );
        Ok(report)
    }

    /// Delete the shared temporary directory. Returns whether anything was removed.
    pub fn purge_tmp(&self) -> Result<bool, NodeError> {
        purge_dir(&self.settings.tmp_dir)
    }
}

impl Drop for ProcessOrchestrator {
    fn drop(&mut self) {
        if self.running_count() > 0 {
            warn!(nodes = self.running_count(), "Orchestrator dropped with running nodes, killing them");
        }
    }
}

async fn stop_one(node: &NodeProcess, shutdown_timeout: Duration) -> Result<StoppedNode, NodeError> {
    let role = node.handle.role;
    if let Ok(status) = timeout(shutdown_timeout, node.handle.wait_exit()).await {
        return Ok(StoppedNode { role, status, forced: false });
    }

    warn!(%role, pid = node.handle.pid, "Node ignored SIGINT, sending SIGKILL");
    node.kill().map_err(|source| NodeError::Signal { role, source })?;

    match timeout(shutdown_timeout, node.handle.wait_exit()).await {
        Ok(status) => Ok(StoppedNode { role, status, forced: true }),
        Err(_) => Err(NodeError::StopTimeout {
            role,
            pid: node.handle.pid,
            timeout: shutdown_timeout,
        }),
    }
}

pub(crate) fn purge_dir(path: &Path) -> Result<bool, NodeError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            info!(path = %path.display(), "Purged temporary storage");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(NodeError::Purge {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::role::BOOTSTRAP_NODE_KEY;
    use std::os::unix::fs::PermissionsExt;
    use std::os::unix::process::ExitStatusExt;
    use tempfile::TempDir;

    /// Executable shell script standing in for the node binary; it ignores the node arguments
    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn spawn_as(orchestrator: &mut ProcessOrchestrator, role: AuthorityRole, binary: &Path) {
        let mut command = orchestrator.node_command(role).unwrap();
        command.binary = binary.to_path_buf();
        for _ in 0..20 {
            match NodeProcess::spawn(&command) {
                Ok(process) => return orchestrator.track(&command, process),
                // Another test forked while the script was still open for writing
                Err(NodeError::SpawnFailed { source, .. }) if source.raw_os_error() == Some(libc::ETXTBSY) => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => panic!("{}", e),
            }
        }
        panic!("could not spawn {}", binary.display());
    }

    fn settings(dir: &TempDir, binary: &str) -> OrchestratorSettings {
        OrchestratorSettings {
            binary: PathBuf::from(binary),
            tmp_dir: dir.path().join("fire"),
            ports: PortTable::default().with_offset(4_000),
            startup_timeout: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(2),
            probe_interval: Duration::from_millis(100),
            ..Default::default()
        }
    }

    #[test]
    fn test_purge_tmp() {
        let dir = TempDir::new().unwrap();
        let orchestrator = ProcessOrchestrator::new(settings(&dir, "true"));
        assert!(!orchestrator.purge_tmp().unwrap());

        let db = dir.path().join("fire/substrate/chains/qa-dev");
        std::fs::create_dir_all(&db).unwrap();
        std::fs::write(db.join("db"), b"state").unwrap();
        assert!(orchestrator.purge_tmp().unwrap());
        assert!(!dir.path().join("fire").exists());
    }

    #[tokio::test]
    async fn test_bad_binary_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let mut orchestrator = ProcessOrchestrator::new(settings(&dir, "/nonexistent/firechain-node"));
        let err = orchestrator.start_nodes(&[AuthorityRole::Alice]).await.unwrap_err();
        assert!(matches!(err, NodeError::SpawnFailed { role: AuthorityRole::Alice, .. }));
        assert_eq!(orchestrator.running_count(), 0);
    }

    #[tokio::test]
    async fn test_early_exit_is_startup_error() {
        let dir = TempDir::new().unwrap();
        let mut orchestrator = ProcessOrchestrator::new(settings(&dir, "false"));
        let err = orchestrator.start_nodes(&[AuthorityRole::Alice]).await.unwrap_err();
        assert!(matches!(err, NodeError::ExitedDuringStartup { role: AuthorityRole::Alice, .. }));
        assert!(orchestrator.handles().is_empty());
    }

    #[tokio::test]
    async fn test_peers_dial_the_recorded_bootstrap() {
        let dir = TempDir::new().unwrap();
        let idle = script(&dir, "idle-node", "while true; do sleep 0.1; done");
        let mut orchestrator = ProcessOrchestrator::new(settings(&dir, "unused"));
        assert!(orchestrator.node_command(AuthorityRole::Charlie).unwrap().is_bootstrap());

        spawn_as(&mut orchestrator, AuthorityRole::Alice, &idle);
        spawn_as(&mut orchestrator, AuthorityRole::Bob, &idle);
        assert_eq!(orchestrator.bootstrap(), Some(AuthorityRole::Alice));

        let charlie = orchestrator.node_command(AuthorityRole::Charlie).unwrap();
        assert_eq!(charlie.bootnode, Some(AuthorityRole::Alice));
        let alice_addr = orchestrator.settings().ports.bootnode_addr(AuthorityRole::Alice);
        assert!(charlie.args().contains(&alice_addr));

        // Bob is first in line now, but he never had the bootstrap key
        orchestrator.nodes.remove(0);
        assert_eq!(orchestrator.bootstrap(), None);
        assert!(matches!(
            orchestrator.node_command(AuthorityRole::Charlie),
            Err(NodeError::BootstrapGone { bootstrap: AuthorityRole::Alice, role: AuthorityRole::Charlie })
        ));

        let alice = orchestrator.node_command(AuthorityRole::Alice).unwrap();
        assert!(alice.is_bootstrap());
        assert!(alice.args().contains(&BOOTSTRAP_NODE_KEY.to_string()));
    }

    #[tokio::test]
    async fn test_stop_all_interrupts_then_kills() {
        let dir = TempDir::new().unwrap();
        let graceful = script(&dir, "graceful-node", "trap 'exit 0' INT\nwhile true; do sleep 0.1; done");
        let stubborn = script(&dir, "stubborn-node", "trap '' INT\nwhile true; do sleep 0.1; done");
        let mut settings = settings(&dir, "unused");
        settings.shutdown_timeout = Duration::from_secs(1);
        let mut orchestrator = ProcessOrchestrator::new(settings);

        spawn_as(&mut orchestrator, AuthorityRole::Alice, &graceful);
        spawn_as(&mut orchestrator, AuthorityRole::Bob, &stubborn);
        assert_eq!(orchestrator.running_count(), 2);
        // Give both shells time to install their traps
        sleep(Duration::from_millis(500)).await;

        let report = orchestrator.stop_all().await.unwrap();
        assert_eq!(report.stopped.len(), 2);
        assert!(!report.all_graceful());

        let alice = report.stopped.iter().find(|n| n.role == AuthorityRole::Alice).unwrap();
        assert!(!alice.forced);
        assert_eq!(alice.status.and_then(|s| s.code()), Some(0));

        let bob = report.stopped.iter().find(|n| n.role == AuthorityRole::Bob).unwrap();
        assert!(bob.forced);
        assert_eq!(bob.status.and_then(|s| s.signal()), Some(libc::SIGKILL));

        assert_eq!(orchestrator.running_count(), 0);
        assert_eq!(orchestrator.bootstrap(), None);
    }

    #[tokio::test]
    async fn test_stop_all_without_nodes() {
        let dir = TempDir::new().unwrap();
        let mut orchestrator = ProcessOrchestrator::new(settings(&dir, "true"));
        let report = orchestrator.stop_all().await.unwrap();
        assert!(report.stopped.is_empty());
        assert!(report.all_graceful());
    }
}
