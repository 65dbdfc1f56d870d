// Submit - Sign, submit and track extrinsics through the transaction pool
//
// Status mapping (author_extrinsicUpdate):
//   future | ready | broadcast          -> Ready
//   inBlock                             -> InBlock (may be retracted and re-included)
//   finalized                           -> Finalized
//   dropped | usurped | finalityTimeout -> Dropped
//   invalid                             -> Invalid

use super::call::{Call, Weight};
use super::extrinsic::{build_signed, extrinsic_hash, ExtrinsicError, ExtrinsicParams, SignedExtrinsic};
use super::signer::Signer;
use crate::chain::dispatch::{DispatchFailure, DispatchOutcome};
use crate::chain::events::EventRecord;
use crate::chain::metadata::MetadataError;
use crate::chain::primitives::{Balance, Nonce, H256};
use crate::client::{ChainConnection, ClientError};
use crate::rpc::{codes, JsonRpcError, RpcError, Subscription};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tip used for sudo submissions by default
pub const SUDO_TIP: Balance = 2000;

// =============================================================================
// OPTIONS
// =============================================================================

/// How the nonce of a submission is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NonceMode {
    /// Ask the node (`system_accountNextIndex`), counting pool transactions
    #[default]
    Auto,
    Explicit(Nonce),
}

/// Per-submission options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOptions {
    pub tip: Balance,
    pub nonce: NonceMode,
}

impl TxOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults used for sudo calls: a small tip, node-assigned nonce
    pub fn sudo() -> Self {
        Self { tip: SUDO_TIP, nonce: NonceMode::Auto }
    }

    pub fn with_tip(mut self, tip: Balance) -> Self {
        self.tip = tip;
        self
    }

    pub fn with_nonce(mut self, nonce: Nonce) -> Self {
        self.nonce = NonceMode::Explicit(nonce);
        self
    }
}

// =============================================================================
// STATUS MACHINE
// =============================================================================

/// Raw pool status notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TxStatus {
    Future,
    Ready,
    Broadcast(Vec<String>),
    InBlock(H256),
    Retracted(H256),
    FinalityTimeout(H256),
    Finalized(H256),
    Usurped(H256),
    Dropped,
    Invalid,
}

/// Harness-level state of a submitted extrinsic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExtrinsicState {
    Ready,
    InBlock(H256),
    Finalized(H256),
    Dropped,
    Invalid,
}

impl ExtrinsicState {
    fn rank(&self) -> u8 {
        match self {
            ExtrinsicState::Ready => 0,
            ExtrinsicState::InBlock(_) => 1,
            ExtrinsicState::Finalized(_) | ExtrinsicState::Dropped | ExtrinsicState::Invalid => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    pub fn block_hash(&self) -> Option<H256> {
        match self {
            ExtrinsicState::InBlock(h) | ExtrinsicState::Finalized(h) => Some(*h),
            _ => None,
        }
    }
}

impl fmt::Display for ExtrinsicState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExtrinsicState::Ready => write!(f, "Ready"),
            ExtrinsicState::InBlock(h) => write!(f, "InBlock({})", h),
            ExtrinsicState::Finalized(h) => write!(f, "Finalized({})", h),
            ExtrinsicState::Dropped => write!(f, "Dropped"),
            ExtrinsicState::Invalid => write!(f, "Invalid"),
        }
    }
}

/// A submitted extrinsic and everything learned about it so far
#[derive(Debug, Clone, Serialize)]
pub struct SubmittedExtrinsic {
    pub hash: H256,
    pub nonce: Nonce,
    pub sudo: bool,
    pub state: ExtrinsicState,
    /// Every state entered, in order
    pub history: Vec<ExtrinsicState>,
    /// Position in the including block
    pub extrinsic_index: Option<u32>,
    /// Events with phase `ApplyExtrinsic(extrinsic_index)`
    pub events: Vec<EventRecord>,
    pub outcome: Option<DispatchOutcome>,
}

impl SubmittedExtrinsic {
    pub fn new(hash: H256, nonce: Nonce, sudo: bool) -> Self {
        Self {
            hash,
            nonce,
            sudo,
            state: ExtrinsicState::Ready,
            history: vec![ExtrinsicState::Ready],
            extrinsic_index: None,
            events: Vec::new(),
            outcome: None,
        }
    }

    /// Apply a pool notification. Returns true when the state changed.
    /// States never move backwards; a retraction keeps InBlock until the
    /// next inclusion overwrites its hash.
    pub fn apply(&mut self, status: &TxStatus) -> bool {
        let next = match status {
            TxStatus::Future | TxStatus::Ready | TxStatus::Broadcast(_) => ExtrinsicState::Ready,
            TxStatus::InBlock(h) => ExtrinsicState::InBlock(*h),
            TxStatus::Retracted(_) => return false,
            TxStatus::Finalized(h) => ExtrinsicState::Finalized(*h),
            TxStatus::FinalityTimeout(_) | TxStatus::Usurped(_) | TxStatus::Dropped => ExtrinsicState::Dropped,
            TxStatus::Invalid => ExtrinsicState::Invalid,
        };

        if self.state.is_terminal() || next.rank() < self.state.rank() || next == self.state {
            return false;
        }

        if let (ExtrinsicState::InBlock(_), ExtrinsicState::InBlock(_)) = (self.state, next) {
            // Re-inclusion after a retraction: events belong to the old block
            self.extrinsic_index = None;
            self.events.clear();
            self.outcome = None;
        }

        self.state = next;
        self.history.push(next);
        true
    }

    /// The dispatch failure, if the extrinsic failed
    pub fn failure(&self) -> Option<&DispatchFailure> {
        self.outcome.as_ref().and_then(|o| o.failure())
    }

    /// Events of a given pallet and kind emitted by this extrinsic
    pub fn find_events<'a>(&'a self, pallet: &'a str, variant: &'a str) -> impl Iterator<Item = &'a EventRecord> {
        self.events.iter().filter(move |e| e.is(pallet, variant))
    }
}

// =============================================================================
// POOL REJECTIONS
// =============================================================================

/// Why the pool refused a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PoolRejectionKind {
    StaleNonce,
    FutureNonce,
    InsufficientFunds,
    BadProof,
    ExhaustsResources,
    PriorityTooLow,
    TemporarilyBanned,
    AlreadyImported,
    Other,
}

/// Synchronous rejection of a submission by the transaction pool
#[derive(Debug, Clone, PartialEq)]
pub struct PoolRejection {
    pub kind: PoolRejectionKind,
    /// The node's error payload, unchanged
    pub error: JsonRpcError,
}

impl PoolRejection {
    /// Classify a JSON-RPC error; None for errors that are not pool rejections
    pub fn from_rpc(error: &JsonRpcError) -> Option<Self> {
        let kind = match error.code {
            codes::POOL_INVALID_TX => classify_invalid(&error.data_text()),
            codes::POOL_TEMPORARILY_BANNED => PoolRejectionKind::TemporarilyBanned,
            codes::POOL_ALREADY_IMPORTED => PoolRejectionKind::AlreadyImported,
            codes::POOL_TOO_LOW_PRIORITY => PoolRejectionKind::PriorityTooLow,
            codes::POOL_UNKNOWN_VALIDITY
            | codes::POOL_CYCLE_DETECTED
            | codes::POOL_IMMEDIATELY_DROPPED => PoolRejectionKind::Other,
            _ => return None,
        };
        Some(Self { kind, error: error.clone() })
    }

    /// Two transactions competing for the same nonce
    pub fn is_nonce_conflict(&self) -> bool {
        matches!(
            self.kind,
            PoolRejectionKind::StaleNonce | PoolRejectionKind::PriorityTooLow | PoolRejectionKind::AlreadyImported
        )
    }
}

impl fmt::Display for PoolRejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.error)
    }
}

fn classify_invalid(data: &str) -> PoolRejectionKind {
    let data = data.to_ascii_lowercase();
    if data.contains("outdated") || data.contains("stale") {
        PoolRejectionKind::StaleNonce
    } else if data.contains("future") {
        PoolRejectionKind::FutureNonce
    } else if data.contains("inability to pay") || data.contains("payment") || data.contains("funds") {
        PoolRejectionKind::InsufficientFunds
    } else if data.contains("bad signature") || data.contains("proof") {
        PoolRejectionKind::BadProof
    } else if data.contains("exhaust") {
        PoolRejectionKind::ExhaustsResources
    } else {
        PoolRejectionKind::Other
    }
}

// =============================================================================
// PROGRESS
// =============================================================================

/// Live tracking of one submission's status stream
pub struct TxProgress {
    connection: Arc<ChainConnection>,
    subscription: Option<Subscription>,
    extrinsic: SubmittedExtrinsic,
}

impl TxProgress {
    pub fn hash(&self) -> H256 {
        self.extrinsic.hash
    }

    pub fn state(&self) -> ExtrinsicState {
        self.extrinsic.state
    }

    pub fn extrinsic(&self) -> &SubmittedExtrinsic {
        &self.extrinsic
    }

    /// Wait for the next state change; None once the status stream has ended
    pub async fn next_state(&mut self) -> Result<Option<ExtrinsicState>, TxError> {
        loop {
            let Some(subscription) = self.subscription.as_mut() else {
                return Ok(None);
            };

            let next = subscription.next_item::<TxStatus>().await;
            let status = match next {
                None => {
                    self.subscription = None;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    warn!(hash = %self.extrinsic.hash, error = %e, "Unrecognized extrinsic status");
                    continue;
                }
                Some(Ok(status)) => status,
            };

            debug!(hash = %self.extrinsic.hash, ?status, "extrinsic status");
            if !self.extrinsic.apply(&status) {
                continue;
            }

            let state = self.extrinsic.state;
            if let Some(block) = state.block_hash() {
                self.load_events(block).await?;
            }
            if state.is_terminal() {
                self.release().await;
            }
            return Ok(Some(state));
        }
    }

    /// Resolve once included in a block (events and outcome loaded)
    pub async fn wait_for_in_block(mut self) -> Result<SubmittedExtrinsic, TxError> {
        loop {
            match self.next_state().await? {
                Some(ExtrinsicState::InBlock(_)) | Some(ExtrinsicState::Finalized(_)) => {
                    self.release().await;
                    return Ok(self.extrinsic);
                }
                Some(_) => self.check_failed_terminal()?,
                None => return Err(TxError::StreamEnded(self.extrinsic.hash)),
            }
        }
    }

    /// Resolve once finalized (events and outcome loaded)
    pub async fn wait_for_finalized(mut self) -> Result<SubmittedExtrinsic, TxError> {
        loop {
            match self.next_state().await? {
                Some(ExtrinsicState::Finalized(block)) => {
                    info!(hash = %self.extrinsic.hash, %block, outcome = ?self.extrinsic.outcome, "Extrinsic finalized");
                    return Ok(self.extrinsic);
                }
                Some(_) => self.check_failed_terminal()?,
                None => return Err(TxError::StreamEnded(self.extrinsic.hash)),
            }
        }
    }

    /// Resolve once finalized and dispatched successfully
    pub async fn wait_for_success(self) -> Result<SubmittedExtrinsic, TxError> {
        let extrinsic = self.wait_for_finalized().await?;
        match extrinsic.failure() {
            Some(failure) => Err(TxError::DispatchFailed {
                hash: extrinsic.hash,
                failure: failure.clone(),
            }),
            None => Ok(extrinsic),
        }
    }

    fn check_failed_terminal(&self) -> Result<(), TxError> {
        match self.extrinsic.state {
            ExtrinsicState::Dropped => Err(TxError::Dropped(self.extrinsic.hash)),
            ExtrinsicState::Invalid => Err(TxError::Invalid(self.extrinsic.hash)),
            _ => Ok(()),
        }
    }

    async fn release(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            if let Err(e) = subscription.unsubscribe().await {
                debug!(error = %e, "author_unwatchExtrinsic failed");
            }
        }
    }

    /// Locate the extrinsic in its block and keep the events it emitted
    async fn load_events(&mut self, block: H256) -> Result<(), TxError> {
        let signed_block = self
            .connection
            .client()
            .block(Some(block))
            .await
            .map_err(ClientError::from)?
            .ok_or(TxError::BlockNotFound(block))?;

        let index = signed_block
            .block
            .extrinsics
            .iter()
            .position(|xt| extrinsic_hash(xt) == Some(self.extrinsic.hash))
            .ok_or(TxError::NotInBlock { hash: self.extrinsic.hash, block })? as u32;

        let block_events = self.connection.events_at(Some(block)).await?;

        // Later extrinsics must be signed for the new spec version
        if block_events.iter().any(|e| e.is("System", "CodeUpdated")) {
            match self.connection.refresh_runtime().await {
                Ok(version) => info!(%block, spec_version = version.spec_version, "Runtime code updated"),
                Err(e) => warn!(%block, error = %e, "Could not reload runtime after code update"),
            }
        }

        let events: Vec<EventRecord> = block_events
            .into_iter()
            .filter(|e| e.phase.extrinsic_index() == Some(index))
            .collect();

        let metadata = self.connection.metadata().await;
        self.extrinsic.outcome = DispatchOutcome::from_events(&metadata, &events, self.extrinsic.sudo);
        self.extrinsic.extrinsic_index = Some(index);
        self.extrinsic.events = events;
        Ok(())
    }
}

// =============================================================================
// SUBMITTER
// =============================================================================

/// Signs and submits calls over a chain connection
pub struct ExtrinsicSubmitter {
    connection: Arc<ChainConnection>,
}

impl ExtrinsicSubmitter {
    pub fn new(connection: Arc<ChainConnection>) -> Self {
        Self { connection }
    }

    /// Submit a call signed by `signer`
    pub async fn submit(&self, call: &Call, signer: &dyn Signer, options: TxOptions) -> Result<TxProgress, TxError> {
        let extrinsic = self.create_signed(call, signer, options).await?;
        self.submit_signed(extrinsic, call.is_sudo()).await
    }

    /// Submit `Sudo::sudo(call)` signed by `sudo_signer`
    pub async fn submit_as_sudo(
        &self,
        call: Call,
        sudo_signer: &dyn Signer,
        options: TxOptions,
    ) -> Result<TxProgress, TxError> {
        self.submit(&call.sudo(), sudo_signer, options).await
    }

    /// Submit `Sudo::sudo_unchecked_weight(call, weight)` signed by `sudo_signer`
    pub async fn submit_as_sudo_unchecked(
        &self,
        call: Call,
        sudo_signer: &dyn Signer,
        weight: Weight,
        options: TxOptions,
    ) -> Result<TxProgress, TxError> {
        self.submit(&call.sudo_unchecked_weight(weight), sudo_signer, options).await
    }

    /// Build and sign without submitting
    pub async fn create_signed(
        &self,
        call: &Call,
        signer: &dyn Signer,
        options: TxOptions,
    ) -> Result<SignedExtrinsic, TxError> {
        let metadata = self.connection.metadata().await;
        let version = self.connection.runtime_version().await;
        let call_data = call.encode(&metadata)?;

        let nonce = match options.nonce {
            NonceMode::Explicit(nonce) => nonce,
            NonceMode::Auto => {
                let address = signer.account_id().to_ss58(self.connection.ss58_prefix());
                self.connection
                    .client()
                    .account_next_index(&address)
                    .await
                    .map_err(ClientError::from)?
            }
        };

        let params = ExtrinsicParams {
            nonce,
            tip: options.tip,
            spec_version: version.spec_version,
            transaction_version: version.transaction_version,
            genesis_hash: self.connection.genesis_hash(),
        };

        Ok(build_signed(&metadata, &call_data, signer, &params)?)
    }

    /// Submit an already signed extrinsic and watch it
    pub async fn submit_signed(&self, extrinsic: SignedExtrinsic, sudo: bool) -> Result<TxProgress, TxError> {
        let subscription = self
            .connection
            .client()
            .submit_and_watch(extrinsic.bytes())
            .await
            .map_err(TxError::from_rpc)?;

        debug!(hash = %extrinsic.hash(), nonce = extrinsic.nonce(), sudo, "Extrinsic submitted");
        Ok(TxProgress {
            connection: Arc::clone(&self.connection),
            subscription: Some(subscription),
            extrinsic: SubmittedExtrinsic::new(extrinsic.hash(), extrinsic.nonce(), sudo),
        })
    }
}

/// Transaction errors
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Extrinsic(#[from] ExtrinsicError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Rejected by the transaction pool: {0}")]
    Rejected(PoolRejection),

    #[error("Extrinsic {0} was dropped")]
    Dropped(H256),

    #[error("Extrinsic {0} is invalid")]
    Invalid(H256),

    #[error("Status stream of {0} ended before a final state")]
    StreamEnded(H256),

    #[error("Block {0} not found")]
    BlockNotFound(H256),

    #[error("Extrinsic {hash} not found in block {block}")]
    NotInBlock { hash: H256, block: H256 },

    #[error("Extrinsic {hash} failed: {failure}")]
    DispatchFailed { hash: H256, failure: DispatchFailure },
}

impl TxError {
    /// Pool rejections become `Rejected`; everything else stays an RPC failure
    pub fn from_rpc(error: RpcError) -> Self {
        let rejection = error.call_error().and_then(PoolRejection::from_rpc);
        match rejection {
            Some(rejection) => TxError::Rejected(rejection),
            None => TxError::Client(ClientError::Rpc(error)),
        }
    }

    pub fn rejection(&self) -> Option<&PoolRejection> {
        match self {
            TxError::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn h(byte: u8) -> H256 {
        H256::from_bytes([byte; 32])
    }

    #[test]
    fn test_status_parsing() {
        let parse = |v: serde_json::Value| serde_json::from_value::<TxStatus>(v).unwrap();
        assert_eq!(parse(json!("future")), TxStatus::Future);
        assert_eq!(parse(json!({ "broadcast": ["peer"] })), TxStatus::Broadcast(vec!["peer".into()]));
        assert_eq!(parse(json!({ "inBlock": h(1).to_hex() })), TxStatus::InBlock(h(1)));
        assert_eq!(parse(json!({ "finalityTimeout": h(2).to_hex() })), TxStatus::FinalityTimeout(h(2)));
        assert_eq!(parse(json!("invalid")), TxStatus::Invalid);
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut xt = SubmittedExtrinsic::new(h(0), 0, false);
        assert!(!xt.apply(&TxStatus::Future));
        assert!(!xt.apply(&TxStatus::Broadcast(vec![])));
        assert!(xt.apply(&TxStatus::InBlock(h(1))));
        assert!(xt.apply(&TxStatus::Finalized(h(1))));
        assert_eq!(
            xt.history,
            vec![ExtrinsicState::Ready, ExtrinsicState::InBlock(h(1)), ExtrinsicState::Finalized(h(1))]
        );
    }

    #[test]
    fn test_transitions_are_monotonic() {
        let mut xt = SubmittedExtrinsic::new(h(0), 0, false);
        xt.apply(&TxStatus::InBlock(h(1)));
        assert!(!xt.apply(&TxStatus::Ready));
        assert!(!xt.apply(&TxStatus::Retracted(h(1))));
        assert_eq!(xt.state, ExtrinsicState::InBlock(h(1)));

        // Re-inclusion in another block updates the hash
        assert!(xt.apply(&TxStatus::InBlock(h(2))));
        assert_eq!(xt.state, ExtrinsicState::InBlock(h(2)));

        assert!(xt.apply(&TxStatus::Finalized(h(2))));
        assert!(!xt.apply(&TxStatus::Dropped));
        assert!(!xt.apply(&TxStatus::InBlock(h(3))));
        assert_eq!(xt.state, ExtrinsicState::Finalized(h(2)));
    }

    #[test]
    fn test_terminal_failures() {
        let mut xt = SubmittedExtrinsic::new(h(0), 0, false);
        assert!(xt.apply(&TxStatus::Usurped(h(9))));
        assert_eq!(xt.state, ExtrinsicState::Dropped);

        let mut xt = SubmittedExtrinsic::new(h(0), 0, false);
        assert!(xt.apply(&TxStatus::Invalid));
        assert!(!xt.apply(&TxStatus::Finalized(h(1))));
        assert_eq!(xt.history, vec![ExtrinsicState::Ready, ExtrinsicState::Invalid]);
    }

    #[test]
    fn test_pool_rejection_classification() {
        let error = |code: i32, data: &str| JsonRpcError::new(code, "Invalid Transaction").with_data(json!(data));

        let stale = PoolRejection::from_rpc(&error(1010, "Transaction is outdated")).unwrap();
        assert_eq!(stale.kind, PoolRejectionKind::StaleNonce);
        assert!(stale.is_nonce_conflict());

        let future = PoolRejection::from_rpc(&error(1010, "Transaction will be valid in the future")).unwrap();
        assert_eq!(future.kind, PoolRejectionKind::FutureNonce);
        assert!(!future.is_nonce_conflict());

        let funds = PoolRejection::from_rpc(&error(1010, "Inability to pay some fees (e.g. account balance too low)"));
        assert_eq!(funds.unwrap().kind, PoolRejectionKind::InsufficientFunds);

        let proof = PoolRejection::from_rpc(&error(1010, "Transaction has a bad signature"));
        assert_eq!(proof.unwrap().kind, PoolRejectionKind::BadProof);

        let low = PoolRejection::from_rpc(&error(1014, "Priority is too low: (0 vs 0)")).unwrap();
        assert_eq!(low.kind, PoolRejectionKind::PriorityTooLow);
        assert!(low.is_nonce_conflict());

        assert_eq!(
            PoolRejection::from_rpc(&error(1012, "")).unwrap().kind,
            PoolRejectionKind::TemporarilyBanned
        );
        assert!(PoolRejection::from_rpc(&error(-32602, "bad params")).is_none());
    }

    #[test]
    fn test_rpc_error_mapping() {
        let rejected = TxError::from_rpc(RpcError::Call(JsonRpcError::new(1013, "Transaction Already Imported")));
        assert_eq!(rejected.rejection().map(|r| r.kind), Some(PoolRejectionKind::AlreadyImported));

        let closed = TxError::from_rpc(RpcError::ConnectionClosed);
        assert!(closed.rejection().is_none());
    }

    #[test]
    fn test_options() {
        assert_eq!(TxOptions::default().nonce, NonceMode::Auto);
        let sudo = TxOptions::sudo();
        assert_eq!(sudo.tip, SUDO_TIP);
        assert_eq!(TxOptions::new().with_nonce(4).with_tip(1).nonce, NonceMode::Explicit(4));
    }
}
