// Wait - Bounded synchronization with on-chain effects

pub mod blocks;
pub mod events;
pub mod receipts;

pub use blocks::{BlockWaitOutcome, BlockWaiter};
pub use events::{AwaitSpec, EventPredicate, EventWaitSettings, EventWaiter, PayloadMatch};
pub use receipts::ReceiptWaiter;

use crate::chain::primitives::{BlockNumber, H256};
use crate::client::ClientError;
use crate::rpc::RpcError;
use std::time::Duration;

/// Wait errors
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("{what} not observed within {timeout:?} ({blocks_scanned} blocks scanned)")]
    NotObserved {
        what: String,
        timeout: Duration,
        blocks_scanned: u32,
    },

    #[error("Block #{target} not reached within {timeout:?} (best #{best})")]
    BlockNotReached {
        target: BlockNumber,
        best: BlockNumber,
        timeout: Duration,
    },

    #[error("No receipt for {hash} within {timeout:?} ({polls} polls)")]
    ReceiptNotFound { hash: H256, timeout: Duration, polls: u32 },

    #[error("Subscription closed by the node")]
    SubscriptionClosed,

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl WaitError {
    pub fn is_not_observed(&self) -> bool {
        matches!(self, WaitError::NotObserved { .. })
    }
}
