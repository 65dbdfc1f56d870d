// Runner - Command execution

use super::{DevnetCmd, EndpointArgs, WaitBlocksCmd, WaitEventCmd};
use anyhow::Context;
use fire_e2e::chain::format_balance;
use fire_e2e::client::ChainConnection;
use fire_e2e::node::{AuthorityRole, ProcessOrchestrator};
use fire_e2e::rpc::HeadKind;
use fire_e2e::wait::{AwaitSpec, BlockWaiter, EventWaiter};
use fire_e2e::{DevAccount, HarnessConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

/// Start the requested nodes and keep them up until Ctrl-C
pub async fn run_devnet(config: HarnessConfig, cmd: &DevnetCmd) -> anyhow::Result<()> {
    let roles = AuthorityRole::parse_list(&cmd.roles)?;
    if roles.is_empty() {
        anyhow::bail!("no roles given");
    }

    let mut orchestrator = ProcessOrchestrator::new(config.orchestrator_settings());
    info!(binary = %config.node.binary.display(), chain = %config.node.chain, "Starting devnet");

    let handles = match orchestrator.start_nodes(&roles).await {
        Ok(handles) => handles,
        Err(e) => {
            let _ = orchestrator.stop_all().await;
            return Err(e).context("devnet startup failed");
        }
    };

    for handle in &handles {
        println!("{:<8} pid {:<7} {}  p2p {}", handle.role, handle.pid, handle.ws_url(), handle.p2p_port);
    }
    println!("Press Ctrl-C to stop");

    signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    info!("Stopping devnet");

    let report = orchestrator.stop_all().await?;
    for node in report.forced() {
        warn!(role = %node.role, "Node had to be killed");
    }
    Ok(())
}

pub fn purge(config: &HarnessConfig) -> anyhow::Result<()> {
    let orchestrator = ProcessOrchestrator::new(config.orchestrator_settings());
    if orchestrator.purge_tmp()? {
        println!("Purged {}", config.node.tmp_dir.display());
    } else {
        println!("Nothing to purge at {}", config.node.tmp_dir.display());
    }
    Ok(())
}

pub async fn info(config: &HarnessConfig, args: &EndpointArgs) -> anyhow::Result<()> {
    let connection = connect(config, &args.endpoint).await?;
    let client = connection.client();

    let chain = client.system_chain().await?;
    let version = connection.runtime_version().await;
    let (best, best_hash) = connection.best_block().await?;
    let finalized_hash = client.finalized_head().await?;
    let finalized = connection.block_number(finalized_hash).await?;
    let health = client.health().await?;

    println!("Chain:      {}", chain);
    println!("Genesis:    {}", connection.genesis_hash());
    println!(
        "Runtime:    {} v{} (tx v{})",
        version.spec_name, version.spec_version, version.transaction_version
    );
    println!("Best:       #{} {}", best, best_hash);
    println!("Finalized:  #{} {}", finalized, finalized_hash);
    println!("Peers:      {} (syncing: {})", health.peers, health.is_syncing);

    let alice = DevAccount::Alice.account_id()?;
    if let Ok(info) = connection.account_info(&alice).await {
        println!("Alice free: {}", format_balance(info.free));
    }

    connection.close();
    Ok(())
}

pub async fn wait_event(config: &HarnessConfig, cmd: &WaitEventCmd) -> anyhow::Result<()> {
    let connection = connect(config, &cmd.endpoint.endpoint).await?;
    let waiter = EventWaiter::new(Arc::clone(&connection), config.event_wait_settings());

    let mut spec = AwaitSpec::new(&cmd.pallet, &cmd.event);
    if let Some(field) = &cmd.field {
        spec = spec.with_field(field);
    }

    let record = waiter.wait_for(&spec, Duration::from_secs(cmd.timeout)).await?;
    println!("{}", record);
    connection.close();
    Ok(())
}

pub async fn wait_blocks(config: &HarnessConfig, cmd: &WaitBlocksCmd) -> anyhow::Result<()> {
    let connection = connect(config, &cmd.endpoint.endpoint).await?;
    let waiter = BlockWaiter::new(Arc::clone(&connection));
    let kind = if cmd.finalized { HeadKind::Finalized } else { HeadKind::New };

    let outcome = waiter
        .wait_for_heads(kind, cmd.count, Duration::from_secs(cmd.timeout))
        .await?;
    println!(
        "Observed {} of {} blocks{}",
        outcome.observed,
        cmd.count,
        outcome.last.map(|n| format!(", last #{}", n)).unwrap_or_default()
    );
    connection.close();

    if !outcome.reached {
        anyhow::bail!("timed out after {}s", cmd.timeout);
    }
    Ok(())
}

async fn connect(config: &HarnessConfig, endpoint: &str) -> anyhow::Result<Arc<ChainConnection>> {
    let connection = ChainConnection::connect(endpoint, &config.connection_settings())
        .await
        .with_context(|| format!("failed to connect to {}", endpoint))?;
    Ok(Arc::new(connection))
}
