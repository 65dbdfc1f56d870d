// Error - Crate-level error aggregating every module's error type

use crate::chain::{DecodeError, EventError, MetadataError};
use crate::client::ClientError;
use crate::config::ConfigError;
use crate::node::NodeError;
use crate::rpc::RpcError;
use crate::tx::{ExtrinsicError, SignerError, TxError};
use crate::wait::WaitError;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Event error: {0}")]
    Events(#[from] EventError),

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("Extrinsic error: {0}")]
    Extrinsic(#[from] ExtrinsicError),

    #[error("Transaction error: {0}")]
    Tx(#[from] TxError),

    #[error("Wait error: {0}")]
    Wait(#[from] WaitError),

    #[error("No nodes running and no endpoint configured")]
    NoEndpoint,
}

pub type Result<T> = std::result::Result<T, HarnessError>;
