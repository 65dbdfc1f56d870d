// Context - One test run: its nodes, its connection, its teardown
//
// Teardown order is fixed: close the RPC connection first, then stop nodes.

use crate::client::{ChainConnection, ConnectionManager};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::node::{AuthorityRole, NodeProcessHandle, ProcessOrchestrator, StopReport};
use crate::tx::ExtrinsicSubmitter;
use crate::wait::{BlockWaiter, EventWaiter, ReceiptWaiter};
use std::sync::Arc;
use tracing::{info, warn};

pub struct TestContext {
    config: HarnessConfig,
    orchestrator: ProcessOrchestrator,
    connections: ConnectionManager,
    torn_down: bool,
}

impl TestContext {
    /// Purge temporary storage, start `roles` and connect to the first node
    /// (or to `rpc.endpoint` when configured)
    pub async fn start(config: HarnessConfig, roles: &[AuthorityRole]) -> Result<Self> {
        config.validate()?;
        let mut orchestrator = ProcessOrchestrator::new(config.orchestrator_settings());
        let handles = orchestrator.start_nodes(roles).await?;

        let endpoint = match (&config.rpc.endpoint, handles.first()) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, Some(first)) => first.ws_url(),
            (None, None) => return Err(HarnessError::NoEndpoint),
        };

        let mut context = Self {
            connections: ConnectionManager::new(&endpoint, config.connection_settings()),
            config,
            orchestrator,
            torn_down: false,
        };

        if let Err(e) = context.connections.connect().await {
            warn!(error = %e, "Initial connection failed, stopping nodes");
            let _ = context.shutdown().await;
            return Err(e.into());
        }
        Ok(context)
    }

    /// Use an already running node at `rpc.endpoint` (or the bootstrap rpc port)
    pub async fn attach(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.rpc.endpoint.clone().unwrap_or_else(|| {
            format!("ws://127.0.0.1:{}", config.node.ports.rpc_port(AuthorityRole::Alice))
        });

        let context = Self {
            connections: ConnectionManager::new(&endpoint, config.connection_settings()),
            orchestrator: ProcessOrchestrator::new(config.orchestrator_settings()),
            config,
            torn_down: false,
        };
        context.connections.connect().await?;
        Ok(context)
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &str {
        self.connections.endpoint()
    }

    pub fn nodes(&self) -> Vec<NodeProcessHandle> {
        self.orchestrator.handles()
    }

    /// Start more nodes into the running network
    pub async fn start_nodes(&mut self, roles: &[AuthorityRole]) -> Result<Vec<NodeProcessHandle>> {
        Ok(self.orchestrator.start_nodes(roles).await?)
    }

    /// The live connection, reconnecting if it dropped
    pub async fn connection(&self) -> Result<Arc<ChainConnection>> {
        Ok(self.connections.connect().await?)
    }

    pub async fn submitter(&self) -> Result<ExtrinsicSubmitter> {
        Ok(ExtrinsicSubmitter::new(self.connection().await?))
    }

    pub async fn event_waiter(&self) -> Result<EventWaiter> {
        Ok(EventWaiter::new(self.connection().await?, self.config.event_wait_settings()))
    }

    pub async fn block_waiter(&self) -> Result<BlockWaiter> {
        Ok(BlockWaiter::new(self.connection().await?))
    }

    /// Receipt polling at the configured event poll interval
    pub async fn receipt_waiter(&self) -> Result<ReceiptWaiter> {
        let interval = self.config.event_wait_settings().poll_interval;
        Ok(ReceiptWaiter::new(self.connection().await?, interval))
    }

    /// Disconnect, then stop every node and await its exit
    pub async fn teardown(mut self) -> Result<StopReport> {
        self.shutdown().await
    }

    async fn shutdown(&mut self) -> Result<StopReport> {
        self.torn_down = true;
        self.connections.disconnect().await;
        let report = self.orchestrator.stop_all().await?;
        info!(endpoint = %self.connections.endpoint(), "Test context torn down");
        Ok(report)
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        if !self.torn_down {
            warn!("TestContext dropped without teardown");
        }
    }
}
