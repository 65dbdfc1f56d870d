// Fire E2E - End-to-end harness for Firechain nodes
// Principle: drive the node only through its process boundary and its RPC

pub mod chain;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod node;
pub mod rpc;
pub mod tx;
pub mod wait;

#[cfg(test)]
mod tests;

pub use chain::{AccountId32, DispatchFailure, DispatchOutcome, EventRecord, Metadata, H160, H256, UNIT};
pub use client::{ChainConnection, ConnectionManager, ConnectionSettings};
pub use config::HarnessConfig;
pub use context::TestContext;
pub use error::{HarnessError, Result};
pub use node::{AuthorityRole, NodeProcessHandle, ProcessOrchestrator, StopReport};
pub use rpc::{EthBlock, EthReceipt, RpcError, WsClient};
pub use tx::{
    Call, DevAccount, ExtrinsicState, ExtrinsicSubmitter, NonceMode, PoolRejection, PoolRejectionKind, Signer,
    SubmittedExtrinsic, TxError, TxOptions, Weight,
};
pub use wait::{AwaitSpec, BlockWaitOutcome, BlockWaiter, EventWaiter, ReceiptWaiter, WaitError};
