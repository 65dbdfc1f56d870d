// Receipts - Poll for the receipt of a submitted Ethereum transaction

use super::WaitError;
use crate::chain::primitives::H256;
use crate::client::ChainConnection;
use crate::rpc::EthReceipt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Waits until a transaction hash has a receipt
pub struct ReceiptWaiter {
    connection: Arc<ChainConnection>,
    poll_interval: Duration,
}

impl ReceiptWaiter {
    pub fn new(connection: Arc<ChainConnection>, poll_interval: Duration) -> Self {
        Self { connection, poll_interval }
    }

    /// Receipt of `hash` once mined, or `ReceiptNotFound` after `limit`.
    /// Failed polls are retried unless the connection is gone or the node has no Ethereum RPC.
    pub async fn wait_for_receipt(&self, hash: H256, limit: Duration) -> Result<EthReceipt, WaitError> {
        let mut polls = 0u32;
        let found = timeout(limit, self.poll(hash, &mut polls)).await;
        match found {
            Ok(receipt) => receipt,
            Err(_) => {
                debug!(%hash, polls, "No receipt");
                Err(WaitError::ReceiptNotFound { hash, timeout: limit, polls })
            }
        }
    }

    async fn poll(&self, hash: H256, polls: &mut u32) -> Result<EthReceipt, WaitError> {
        loop {
            *polls += 1;
            match self.connection.client().eth_get_transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    info!(%hash, block = ?receipt.block_number(), success = receipt.succeeded(), "Receipt found");
                    return Ok(receipt);
                }
                Ok(None) => {}
                Err(e) if e.is_connection_lost() || e.is_method_missing() => return Err(e.into()),
                Err(e) => warn!(%hash, error = %e, "Receipt poll failed, retrying"),
            }
            sleep(self.poll_interval).await;
        }
    }
}
