// Eth - Ethereum JSON-RPC served by the node's EVM layer on the same endpoint
//
// Quantities travel as `0x`-prefixed hex without leading zeros. Balances are
// 18-decimal wei and fit in a u128 on every chain the harness targets.

use super::types::codes;
use super::ws::WsClient;
use super::{RpcError, RpcResult};
use crate::chain::primitives::{H160, H256};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Block selector for state queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EthBlock {
    #[default]
    Latest,
    Pending,
    Earliest,
    Number(u64),
}

impl EthBlock {
    fn param(self) -> Value {
        match self {
            EthBlock::Latest => json!("latest"),
            EthBlock::Pending => json!("pending"),
            EthBlock::Earliest => json!("earliest"),
            EthBlock::Number(number) => json!(quantity(u128::from(number))),
        }
    }
}

pub fn quantity(value: u128) -> String {
    format!("0x{:x}", value)
}

/// Parse a hex quantity; values above u128 are rejected
pub fn parse_quantity(value: &str) -> RpcResult<u128> {
    let digits = value
        .strip_prefix("0x")
        .filter(|d| !d.is_empty())
        .ok_or_else(|| RpcError::Parse(format!("invalid quantity: {:?}", value)))?;
    u128::from_str_radix(digits, 16).map_err(|e| RpcError::Parse(format!("quantity {}: {}", value, e)))
}

fn narrow(value: u128, method: &str) -> RpcResult<u64> {
    u64::try_from(value).map_err(|_| RpcError::Parse(format!("{} result {} exceeds u64", method, value)))
}

/// `eth_getTransactionReceipt` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthReceipt {
    pub transaction_hash: H256,
    pub block_hash: H256,
    pub block_number: String,
    pub from: H160,
    #[serde(default)]
    pub to: Option<H160>,
    #[serde(default)]
    pub contract_address: Option<H160>,
    pub gas_used: String,
    /// EIP-658 status, `0x1` on success
    #[serde(default)]
    pub status: Option<String>,
}

impl EthReceipt {
    pub fn block_number(&self) -> Option<u64> {
        parse_quantity(&self.block_number).ok().and_then(|n| u64::try_from(n).ok())
    }

    pub fn gas_used(&self) -> Option<u128> {
        parse_quantity(&self.gas_used).ok()
    }

    /// False for reverted transactions and pre-Byzantium receipts
    pub fn succeeded(&self) -> bool {
        self.status.as_deref().and_then(|s| parse_quantity(s).ok()) == Some(1)
    }
}

impl RpcError {
    /// The node has no Ethereum RPC (EVM layer disabled)
    pub fn is_method_missing(&self) -> bool {
        self.call_error().map(|e| e.code) == Some(codes::METHOD_NOT_FOUND)
    }
}

impl WsClient {
    async fn request_quantity(&self, method: &str, params: Value) -> RpcResult<u128> {
        let raw: String = self.request(method, params).await?;
        parse_quantity(&raw)
    }

    /// `eth_chainId`
    pub async fn eth_chain_id(&self) -> RpcResult<u64> {
        narrow(self.request_quantity("eth_chainId", json!([])).await?, "eth_chainId")
    }

    /// `eth_blockNumber`
    pub async fn eth_block_number(&self) -> RpcResult<u64> {
        narrow(self.request_quantity("eth_blockNumber", json!([])).await?, "eth_blockNumber")
    }

    /// `eth_gasPrice` in wei
    pub async fn eth_gas_price(&self) -> RpcResult<u128> {
        self.request_quantity("eth_gasPrice", json!([])).await
    }

    /// `eth_getBalance` in wei
    pub async fn eth_get_balance(&self, address: H160, at: EthBlock) -> RpcResult<u128> {
        self.request_quantity("eth_getBalance", json!([address.to_hex(), at.param()])).await
    }

    /// `eth_getTransactionCount`, the account's next nonce
    pub async fn eth_get_transaction_count(&self, address: H160, at: EthBlock) -> RpcResult<u64> {
        let count = self
            .request_quantity("eth_getTransactionCount", json!([address.to_hex(), at.param()]))
            .await?;
        narrow(count, "eth_getTransactionCount")
    }

    /// `eth_sendRawTransaction` with an already signed RLP payload
    pub async fn eth_send_raw_transaction(&self, raw: &[u8]) -> RpcResult<H256> {
        self.request("eth_sendRawTransaction", json!([format!("0x{}", hex::encode(raw))]))
            .await
    }

    /// `eth_getTransactionReceipt`; None until the transaction is mined
    pub async fn eth_get_transaction_receipt(&self, hash: H256) -> RpcResult<Option<EthReceipt>> {
        self.request("eth_getTransactionReceipt", json!([hash.to_hex()])).await
    }
}
