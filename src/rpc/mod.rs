// RPC - JSON-RPC transport to the node (WebSocket for calls and subscriptions, HTTP for probes)
//
// Substrate and Ethereum methods share the node's WebSocket endpoint.

pub mod eth;
pub mod http;
pub mod methods;
pub mod types;
pub mod ws;

use std::time::Duration;

pub use eth::{EthBlock, EthReceipt};
pub use http::HttpClient;
pub use methods::HeadKind;
pub use types::{
    codes, Block, CreatedBlock, Header, Health, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RuntimeVersion, SignedBlock, SubscriptionId,
};
pub use ws::{Subscription, WsClient};

/// RPC errors
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request {method} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("RPC error: {0}")]
    Call(JsonRpcError),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RpcError {
    /// The node's error payload, when the call itself was rejected
    pub fn call_error(&self) -> Option<&JsonRpcError> {
        match self {
            RpcError::Call(e) => Some(e),
            _ => None,
        }
    }

    /// Errors after which the connection is unusable
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, RpcError::ConnectionClosed | RpcError::Transport(_))
    }
}

pub type RpcResult<T> = Result<T, RpcError>;
