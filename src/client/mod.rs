// Client - The shared chain connection and the manager that owns it
//
// A ChainConnection pairs one WebSocket client with the runtime context every
// helper needs (metadata, runtime version, genesis hash). The ConnectionManager
// holds at most one live connection per endpoint.

use crate::chain::decode::{DecodeError, ValueDecoder};
use crate::chain::events::{decode_events, EventError, EventRecord};
use crate::chain::metadata::{Metadata, MetadataError};
use crate::chain::primitives::{AccountId32, Balance, BlockNumber, H256};
use crate::chain::storage::{storage_key, AccountInfo, StorageKeyError};
use crate::rpc::{RpcError, RuntimeVersion, WsClient};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Connection timing knobs
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub retry_interval: Duration,
    pub ss58_prefix: u16,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(60),
            retry_interval: Duration::from_millis(500),
            ss58_prefix: crate::chain::primitives::DEFAULT_SS58_PREFIX,
        }
    }
}

/// Runtime context that changes on upgrades
struct RuntimeContext {
    metadata: Arc<Metadata>,
    version: RuntimeVersion,
}

/// A live RPC connection plus the runtime context fetched on connect
pub struct ChainConnection {
    client: WsClient,
    runtime: RwLock<RuntimeContext>,
    genesis_hash: H256,
    ss58_prefix: u16,
}

impl ChainConnection {
    /// Connect once and load metadata, runtime version and genesis hash
    pub async fn connect(url: &str, settings: &ConnectionSettings) -> Result<Self, ClientError> {
        let client = WsClient::connect(url, settings.request_timeout).await?;
        Self::from_client(client, settings.ss58_prefix).await
    }

    /// Load runtime context over an existing client
    pub async fn from_client(client: WsClient, ss58_prefix: u16) -> Result<Self, ClientError> {
        let genesis_hash = client.genesis_hash().await?;
        let runtime = load_runtime(&client, None).await?;

        info!(
            url = client.url(),
            spec = %runtime.version.spec_name,
            spec_version = runtime.version.spec_version,
            genesis = %genesis_hash,
            "Connected to node"
        );

        Ok(Self {
            client,
            runtime: RwLock::new(runtime),
            genesis_hash,
            ss58_prefix,
        })
    }

    pub fn client(&self) -> &WsClient {
        &self.client
    }

    pub fn genesis_hash(&self) -> H256 {
        self.genesis_hash
    }

    pub fn ss58_prefix(&self) -> u16 {
        self.ss58_prefix
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub async fn metadata(&self) -> Arc<Metadata> {
        Arc::clone(&self.runtime.read().await.metadata)
    }

    pub async fn runtime_version(&self) -> RuntimeVersion {
        self.runtime.read().await.version.clone()
    }

    /// Re-fetch metadata and runtime version (after a runtime upgrade)
    pub async fn refresh_runtime(&self) -> Result<RuntimeVersion, ClientError> {
        let fresh = load_runtime(&self.client, None).await?;
        let version = fresh.version.clone();
        let mut runtime = self.runtime.write().await;
        if runtime.version.spec_version != version.spec_version {
            info!(
                from = runtime.version.spec_version,
                to = version.spec_version,
                "Runtime upgraded"
            );
        }
        *runtime = fresh;
        Ok(version)
    }

    // =========================================================================
    // STATE QUERIES
    // =========================================================================

    /// Decoded storage value; falls back to the entry's default when absent
    pub async fn storage_value(
        &self,
        pallet: &str,
        entry: &str,
        keys: &[Vec<u8>],
        at: Option<H256>,
    ) -> Result<Option<Value>, ClientError> {
        let metadata = self.metadata().await;
        let key = storage_key(&metadata, pallet, entry, keys)?;
        let (_, info) = metadata.storage_entry(pallet, entry)?;

        let bytes = match self.client.get_storage(&key, at).await? {
            Some(bytes) => bytes,
            None => match &info.default {
                Some(default) => default.clone(),
                None => return Ok(None),
            },
        };

        let value = ValueDecoder::new(metadata.types()).decode_all(info.kind.value_ty(), &bytes)?;
        Ok(Some(value))
    }

    /// `System::Account` for an account
    pub async fn account_info(&self, account: &AccountId32) -> Result<AccountInfo, ClientError> {
        let value = self
            .storage_value("System", "Account", &[account.as_bytes().to_vec()], None)
            .await?
            .unwrap_or(Value::Null);
        AccountInfo::from_value(&value).ok_or_else(|| ClientError::UnexpectedShape {
            what: "System.Account".to_string(),
            value,
        })
    }

    pub async fn free_balance(&self, account: &AccountId32) -> Result<Balance, ClientError> {
        Ok(self.account_info(account).await?.free)
    }

    /// Events of a block (best block when `at` is None)
    pub async fn events_at(&self, at: Option<H256>) -> Result<Vec<EventRecord>, ClientError> {
        let metadata = self.metadata().await;
        let key = storage_key(&metadata, "System", "Events", &[])?;
        match self.client.get_storage(&key, at).await? {
            Some(bytes) => Ok(decode_events(&metadata, &bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Best block number and hash
    pub async fn best_block(&self) -> Result<(BlockNumber, H256), ClientError> {
        let hash = self
            .client
            .block_hash(None)
            .await?
            .ok_or_else(|| RpcError::Parse("node returned no best hash".to_string()))?;
        let number = self.block_number(hash).await?;
        Ok((number, hash))
    }

    /// Number of the block with this hash
    pub async fn block_number(&self, hash: H256) -> Result<BlockNumber, ClientError> {
        let header = self
            .client
            .header(Some(hash))
            .await?
            .ok_or_else(|| RpcError::Parse(format!("no header for block {}", hash)))?;
        header
            .block_number()
            .ok_or_else(|| RpcError::Parse(format!("invalid block number {}", header.number)).into())
    }

    pub fn close(&self) {
        self.client.close();
    }
}

async fn load_runtime(client: &WsClient, at: Option<H256>) -> Result<RuntimeContext, ClientError> {
    let bytes = client.get_metadata(at).await?;
    let metadata = Metadata::from_bytes(&bytes)?;
    let version = client.runtime_version(at).await?;
    debug!(pallets = metadata.pallets().count(), "Loaded runtime metadata");
    Ok(RuntimeContext {
        metadata: Arc::new(metadata),
        version,
    })
}

// =============================================================================
// CONNECTION MANAGER
// =============================================================================

/// Owns at most one live connection to one endpoint
pub struct ConnectionManager {
    endpoint: String,
    settings: ConnectionSettings,
    current: Mutex<Option<Arc<ChainConnection>>>,
}

impl ConnectionManager {
    pub fn new(endpoint: &str, settings: ConnectionSettings) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            settings,
            current: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Return the live connection, establishing it first if needed.
    /// The handshake is retried until the node accepts or the connect timeout elapses.
    pub async fn connect(&self) -> Result<Arc<ChainConnection>, ClientError> {
        let mut current = self.current.lock().await;

        if let Some(conn) = current.as_ref() {
            if conn.is_connected() {
                return Ok(Arc::clone(conn));
            }
            warn!(endpoint = %self.endpoint, "Connection lost, reconnecting");
        }

        let deadline = Instant::now() + self.settings.connect_timeout;
        let mut attempts = 0u32;
        let conn = loop {
            attempts += 1;
            match ChainConnection::connect(&self.endpoint, &self.settings).await {
                Ok(conn) => break conn,
                Err(ClientError::Rpc(RpcError::Connect { reason, .. })) => {
                    if Instant::now() + self.settings.retry_interval >= deadline {
                        return Err(ClientError::ConnectTimeout {
                            endpoint: self.endpoint.clone(),
                            attempts,
                            last_error: reason,
                        });
                    }
                    debug!(endpoint = %self.endpoint, attempts, "Node not accepting connections yet");
                    tokio::time::sleep(self.settings.retry_interval).await;
                }
                Err(e) => return Err(e),
            }
        };

        let conn = Arc::new(conn);
        *current = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// Close the live connection, if any
    pub async fn disconnect(&self) {
        if let Some(conn) = self.current.lock().await.take() {
            conn.close();
            info!(endpoint = %self.endpoint, "Disconnected");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|c| c.is_connected())
            .unwrap_or(false)
    }
}

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Events(#[from] EventError),

    #[error(transparent)]
    Storage(#[from] StorageKeyError),

    #[error("Could not connect to {endpoint} after {attempts} attempts: {last_error}")]
    ConnectTimeout {
        endpoint: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Unexpected {what} value: {value}")]
    UnexpectedShape { what: String, value: Value },
}

impl ClientError {
    /// Errors worth retrying on the same connection
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Rpc(e) => !matches!(e, RpcError::Connect { .. }) && !e.is_connection_lost(),
            ClientError::Decode(_) | ClientError::Events(_) | ClientError::UnexpectedShape { .. } => true,
            ClientError::Metadata(_) | ClientError::Storage(_) | ClientError::ConnectTimeout { .. } => false,
        }
    }
}
