// Methods - Typed wrappers for the node RPC methods the harness uses

use super::types::{CreatedBlock, Header, Health, RuntimeVersion, SignedBlock};
use super::ws::{Subscription, WsClient};
use super::{RpcError, RpcResult};
use crate::chain::primitives::{decode_hex, H256};
use serde_json::{json, Value};

/// Which head stream to follow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeadKind {
    /// Every imported best block
    #[default]
    New,
    /// Finalized blocks only
    Finalized,
}

impl HeadKind {
    fn methods(self) -> (&'static str, &'static str) {
        match self {
            HeadKind::New => ("chain_subscribeNewHeads", "chain_unsubscribeNewHeads"),
            HeadKind::Finalized => ("chain_subscribeFinalizedHeads", "chain_unsubscribeFinalizedHeads"),
        }
    }
}

fn hex_param(bytes: &[u8]) -> Value {
    Value::String(format!("0x{}", hex::encode(bytes)))
}

fn at_param(at: Option<H256>) -> Value {
    at.map(|h| Value::String(h.to_hex())).unwrap_or(Value::Null)
}

fn parse_hex(value: &str) -> RpcResult<Vec<u8>> {
    decode_hex(value).map_err(|e| RpcError::Parse(e.to_string()))
}

impl WsClient {
    // =========================================================================
    // STATE
    // =========================================================================

    /// `state_getStorage`; None when the key is absent
    pub async fn get_storage(&self, key: &[u8], at: Option<H256>) -> RpcResult<Option<Vec<u8>>> {
        let result: Option<String> = self
            .request("state_getStorage", json!([hex_param(key), at_param(at)]))
            .await?;
        result.map(|s| parse_hex(&s)).transpose()
    }

    /// `state_getMetadata` as raw SCALE bytes
    pub async fn get_metadata(&self, at: Option<H256>) -> RpcResult<Vec<u8>> {
        let result: String = self.request("state_getMetadata", json!([at_param(at)])).await?;
        parse_hex(&result)
    }

    pub async fn runtime_version(&self, at: Option<H256>) -> RpcResult<RuntimeVersion> {
        self.request("state_getRuntimeVersion", json!([at_param(at)])).await
    }

    // =========================================================================
    // CHAIN
    // =========================================================================

    /// `chain_getBlockHash`; the best block when `number` is None
    pub async fn block_hash(&self, number: Option<u32>) -> RpcResult<Option<H256>> {
        let params = match number {
            Some(n) => json!([n]),
            None => json!([]),
        };
        self.request("chain_getBlockHash", params).await
    }

    pub async fn genesis_hash(&self) -> RpcResult<H256> {
        self.block_hash(Some(0))
            .await?
            .ok_or_else(|| RpcError::Parse("node returned no genesis hash".to_string()))
    }

    pub async fn header(&self, hash: Option<H256>) -> RpcResult<Option<Header>> {
        self.request("chain_getHeader", json!([at_param(hash)])).await
    }

    pub async fn block(&self, hash: Option<H256>) -> RpcResult<Option<SignedBlock>> {
        self.request("chain_getBlock", json!([at_param(hash)])).await
    }

    pub async fn finalized_head(&self) -> RpcResult<H256> {
        self.request("chain_getFinalizedHead", json!([])).await
    }

    /// Follow new or finalized heads
    pub async fn subscribe_heads(&self, kind: HeadKind) -> RpcResult<Subscription> {
        let (subscribe, unsubscribe) = kind.methods();
        self.subscribe(subscribe, json!([]), unsubscribe).await
    }

    // =========================================================================
    // SYSTEM
    // =========================================================================

    /// Next nonce for an account, counting transactions already in the pool
    pub async fn account_next_index(&self, ss58: &str) -> RpcResult<u32> {
        self.request("system_accountNextIndex", json!([ss58])).await
    }

    pub async fn health(&self) -> RpcResult<Health> {
        self.request("system_health", json!([])).await
    }

    pub async fn system_chain(&self) -> RpcResult<String> {
        self.request("system_chain", json!([])).await
    }

    // =========================================================================
    // AUTHOR
    // =========================================================================

    /// `author_submitExtrinsic` (no status tracking)
    pub async fn submit_extrinsic(&self, extrinsic: &[u8]) -> RpcResult<H256> {
        self.request("author_submitExtrinsic", json!([hex_param(extrinsic)])).await
    }

    /// `author_submitAndWatchExtrinsic`; pool rejections arrive as `RpcError::Call`
    pub async fn submit_and_watch(&self, extrinsic: &[u8]) -> RpcResult<Subscription> {
        self.subscribe(
            "author_submitAndWatchExtrinsic",
            json!([hex_param(extrinsic)]),
            "author_unwatchExtrinsic",
        )
        .await
    }

    // =========================================================================
    // MANUAL SEAL
    // =========================================================================

    /// `engine_createBlock` on manual-seal nodes
    pub async fn create_block(&self, create_empty: bool, finalize: bool) -> RpcResult<CreatedBlock> {
        self.request("engine_createBlock", json!([create_empty, finalize, Value::Null])).await
    }
}
