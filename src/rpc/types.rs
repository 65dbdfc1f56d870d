// Types RPC - Structures for JSON-RPC 2.0 requests, responses and subscription notifications
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// =============================================================================
// JSON-RPC 2.0 PROTOCOL TYPES
// =============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0")
    pub jsonrpc: String,

    /// Method name (e.g., "chain_getBlock")
    pub method: String,

    /// Method parameters
    #[serde(default)]
    pub params: Value,

    /// Request ID
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id,
        }
    }
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version
    pub jsonrpc: String,

    /// Result (absent or null on failure; null is also a valid success value)
    #[serde(default)]
    pub result: Option<Value>,

    /// Error (present on failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,

    /// Request ID
    pub id: u64,
}

impl JsonRpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: u64, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// Successful result (null when the node returned null) or the call error
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Optional additional data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Method not found (-32601)
    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, &format!("Method not found: {}", method))
    }

    /// `data` rendered as text, whatever JSON shape the node used
    pub fn data_text(&self) -> String {
        match &self.data {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)?;
        if self.data.is_some() {
            write!(f, ": {}", self.data_text())?;
        }
        Ok(())
    }
}

/// Error codes seen from substrate nodes
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    /// Transaction pool rejections (author_* methods)
    pub const POOL_INVALID_TX: i32 = 1010;
    pub const POOL_UNKNOWN_VALIDITY: i32 = 1011;
    pub const POOL_TEMPORARILY_BANNED: i32 = 1012;
    pub const POOL_ALREADY_IMPORTED: i32 = 1013;
    pub const POOL_TOO_LOW_PRIORITY: i32 = 1014;
    pub const POOL_CYCLE_DETECTED: i32 = 1015;
    pub const POOL_IMMEDIATELY_DROPPED: i32 = 1016;
}

// =============================================================================
// SUBSCRIPTIONS
// =============================================================================

/// Subscription id as sent by the node (string or number)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubscriptionId {
    Number(u64),
    String(String),
}

impl SubscriptionId {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(SubscriptionId::String(s.clone())),
            Value::Number(n) => n.as_u64().map(SubscriptionId::Number),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            SubscriptionId::Number(n) => Value::from(*n),
            SubscriptionId::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SubscriptionId::Number(n) => write!(f, "{}", n),
            SubscriptionId::String(s) => write!(f, "{}", s),
        }
    }
}

/// Params of a subscription notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionParams {
    pub subscription: SubscriptionId,
    pub result: Value,
}

/// Server-initiated notification for a subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: SubscriptionParams,
}

impl JsonRpcNotification {
    pub fn new(method: &str, subscription: SubscriptionId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: SubscriptionParams { subscription, result },
        }
    }
}

/// Any message arriving on a WebSocket connection
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IncomingMessage {
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

// =============================================================================
// NODE RESPONSE TYPES
// =============================================================================

/// `system_health` result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub peers: u64,
    pub is_syncing: bool,
    pub should_have_peers: bool,
}

/// Block header (`chain_getHeader`, head subscriptions)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub parent_hash: String,
    /// Hex-encoded block number
    pub number: String,
    pub state_root: String,
    pub extrinsics_root: String,
    #[serde(default)]
    pub digest: Value,
}

impl Header {
    pub fn block_number(&self) -> Option<u32> {
        u32::from_str_radix(self.number.trim_start_matches("0x"), 16).ok()
    }
}

/// `state_getRuntimeVersion` result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeVersion {
    pub spec_name: String,
    pub impl_name: String,
    pub spec_version: u32,
    pub impl_version: u32,
    pub transaction_version: u32,
    #[serde(default)]
    pub authoring_version: u32,
}

/// `chain_getBlock` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedBlock {
    pub block: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    /// Hex-encoded extrinsics, each including its compact length prefix
    pub extrinsics: Vec<String>,
}

/// `engine_createBlock` result (manual-seal nodes)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedBlock {
    pub hash: crate::chain::primitives::H256,
}
