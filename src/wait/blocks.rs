// Blocks - Wait on block production through header subscriptions

use super::WaitError;
use crate::chain::primitives::{BlockNumber, H256};
use crate::client::ChainConnection;
use crate::rpc::{HeadKind, Header};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// How a block wait ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockWaitOutcome {
    /// New block heights seen
    pub observed: u32,
    /// `observed` got to the requested count before the timeout
    pub reached: bool,
    /// Highest block number seen
    pub last: Option<BlockNumber>,
}

/// Waits on new or finalized heads
pub struct BlockWaiter {
    connection: Arc<ChainConnection>,
}

impl BlockWaiter {
    pub fn new(connection: Arc<ChainConnection>) -> Self {
        Self { connection }
    }

    /// Resolve after `count` new best blocks or when `limit` elapses
    pub async fn wait_for_blocks(&self, count: u32, limit: Duration) -> Result<BlockWaitOutcome, WaitError> {
        self.wait_for_heads(HeadKind::New, count, limit).await
    }

    /// Resolve after `count` new finalized blocks or when `limit` elapses
    pub async fn wait_for_finalized_blocks(&self, count: u32, limit: Duration) -> Result<BlockWaitOutcome, WaitError> {
        self.wait_for_heads(HeadKind::Finalized, count, limit).await
    }

    /// Count headers above the height current at subscription time.
    /// A header at a height already seen (a fork) is not counted again.
    /// Subscribing, reading the start height and the head stream all share
    /// one deadline; the subscription is released without waiting on the node.
    pub async fn wait_for_heads(
        &self,
        kind: HeadKind,
        count: u32,
        limit: Duration,
    ) -> Result<BlockWaitOutcome, WaitError> {
        let deadline = Instant::now() + limit;
        let mut outcome = BlockWaitOutcome::default();
        if count == 0 {
            outcome.reached = true;
            return Ok(outcome);
        }

        let counted = timeout_at(deadline, self.count_heads(kind, count, &mut outcome)).await;
        match counted {
            Err(_) => debug!(?kind, observed = outcome.observed, "Block wait timed out"),
            Ok(result) => result?,
        }
        info!(?kind, observed = outcome.observed, reached = outcome.reached, "Block wait finished");
        Ok(outcome)
    }

    async fn count_heads(&self, kind: HeadKind, count: u32, outcome: &mut BlockWaitOutcome) -> Result<(), WaitError> {
        let mut subscription = self.connection.client().subscribe_heads(kind).await?;
        let mut highest = self.start_height(kind).await?;

        loop {
            let header = match subscription.next_item::<Header>().await {
                None => return Err(WaitError::SubscriptionClosed),
                Some(Err(e)) => {
                    warn!(error = %e, "Skipping malformed header");
                    continue;
                }
                Some(Ok(header)) => header,
            };

            let Some(number) = header.block_number() else {
                continue;
            };
            if number <= highest {
                continue;
            }
            highest = number;
            outcome.observed += 1;
            outcome.last = Some(number);
            debug!(number, observed = outcome.observed, ?kind, "New head");

            if outcome.observed >= count {
                outcome.reached = true;
                return Ok(());
            }
        }
    }

    /// Resolve once the best block number is at least `target`
    pub async fn wait_for_block_number(&self, target: BlockNumber, limit: Duration) -> Result<BlockNumber, WaitError> {
        let deadline = Instant::now() + limit;
        let mut best = 0;
        let reached = timeout_at(deadline, self.reach_block(target, &mut best)).await;
        match reached {
            Err(_) => Err(WaitError::BlockNotReached { target, best, timeout: limit }),
            Ok(result) => result,
        }
    }

    async fn reach_block(&self, target: BlockNumber, best: &mut BlockNumber) -> Result<BlockNumber, WaitError> {
        let mut subscription = self.connection.client().subscribe_heads(HeadKind::New).await?;
        *best = self.connection.best_block().await?.0;

        while *best < target {
            match subscription.next_item::<Header>().await {
                None => return Err(WaitError::SubscriptionClosed),
                Some(Ok(header)) => {
                    if let Some(number) = header.block_number() {
                        *best = (*best).max(number);
                    }
                }
                Some(Err(e)) => warn!(error = %e, "Skipping malformed header"),
            }
        }
        Ok(*best)
    }

    /// Seal `count` blocks on a manual-seal node (`engine_createBlock`)
    pub async fn fast_forward(&self, count: u32) -> Result<Vec<H256>, WaitError> {
        let mut hashes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let created = self.connection.client().create_block(true, true).await?;
            hashes.push(created.hash);
        }
        debug!(count, "Fast-forwarded");
        Ok(hashes)
    }

    async fn start_height(&self, kind: HeadKind) -> Result<BlockNumber, WaitError> {
        match kind {
            HeadKind::New => Ok(self.connection.best_block().await?.0),
            HeadKind::Finalized => {
                let hash = self.connection.client().finalized_head().await?;
                Ok(self.connection.block_number(hash).await?)
            }
        }
    }
}
