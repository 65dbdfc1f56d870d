// Harness - End-to-end flows against the in-process mock node

use super::mock_node::{
    MockConfig, MockNode, CHAIN_NAME, EVM_CHAIN_ID, EVM_GAS_PRICE, EVM_GENESIS_ACCOUNT, EVM_GENESIS_BALANCE,
    GENESIS_FREE,
};
use super::test_runtime::SPEC_VERSION;
use crate::chain::decode::value_as_u128;
use crate::chain::primitives::{H160, H256, UNIT};
use crate::client::{ChainConnection, ConnectionSettings};
use crate::config::HarnessConfig;
use crate::context::TestContext;
use crate::tx::{
    Call, DevAccount, ExtrinsicState, ExtrinsicSubmitter, PoolRejectionKind, Signer, TxError, TxOptions, Weight,
};
use crate::rpc::{EthBlock, HeadKind, RpcError, WsClient};
use crate::wait::{AwaitSpec, BlockWaiter, EventWaitSettings, EventWaiter, ReceiptWaiter, WaitError};
use std::sync::Arc;
use std::time::{Duration, Instant};

const MANUAL: MockConfig = MockConfig { block_time: None, session_length: 5 };

fn settings() -> ConnectionSettings {
    ConnectionSettings {
        request_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn fast_events() -> EventWaitSettings {
    EventWaitSettings {
        poll_interval: Duration::from_millis(20),
        catch_up_blocks: 16,
    }
}

async fn connect(node: &MockNode) -> Arc<ChainConnection> {
    Arc::new(ChainConnection::connect(&node.url(), &settings()).await.unwrap())
}

fn rejection_kind(result: Result<crate::tx::TxProgress, TxError>) -> PoolRejectionKind {
    match result {
        Ok(progress) => panic!("submission of {} was accepted", progress.hash()),
        Err(e) => e.rejection().unwrap_or_else(|| panic!("not a pool rejection: {}", e)).kind,
    }
}

// =============================================================================
// RPC TRANSPORT
// =============================================================================

#[tokio::test]
async fn test_raw_request_surfaces_error_payload() {
    let node = MockNode::start_with(MANUAL).await;
    let connection = connect(&node).await;

    let err = connection
        .client()
        .request_raw("firechain_unknown", serde_json::json!([]))
        .await
        .unwrap_err();
    assert_eq!(err.call_error().map(|e| e.code), Some(crate::rpc::codes::METHOD_NOT_FOUND));

    let chain = connection.client().request_raw("system_chain", serde_json::json!([])).await.unwrap();
    assert_eq!(chain, CHAIN_NAME);
}

#[tokio::test]
async fn test_requests_fail_after_close() {
    let node = MockNode::start_with(MANUAL).await;
    let connection = connect(&node).await;
    assert_eq!(connection.genesis_hash(), connection.client().block_hash(Some(0)).await.unwrap().unwrap());

    connection.close();
    let err = connection.client().system_chain().await.unwrap_err();
    assert!(matches!(err, crate::rpc::RpcError::ConnectionClosed), "{}", err);
}

#[tokio::test]
async fn test_timed_out_requests_are_withdrawn() {
    let node = MockNode::start_with(MANUAL).await;
    let client = WsClient::connect(&node.url(), Duration::from_millis(200)).await.unwrap();

    node.stall(Duration::from_millis(800)).await;
    let err = client.system_chain().await.unwrap_err();
    assert!(matches!(err, RpcError::Timeout { .. }), "{}", err);
    let Err(err) = client.subscribe_heads(HeadKind::New).await else {
        panic!("subscribed while the node was stalled");
    };
    assert!(matches!(err, RpcError::Timeout { .. }), "{}", err);
    // The call is forgotten; the subscribe stays to release its late reply
    assert_eq!(client.in_flight(), 1);

    let deadline = Instant::now() + Duration::from_secs(5);
    while (client.in_flight() > 0 || node.head_subscriptions().await > 0) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(client.in_flight(), 0);
    assert_eq!(node.head_subscriptions().await, 0, "late subscription was not released");
    assert_eq!(client.system_chain().await.unwrap(), CHAIN_NAME);
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

#[tokio::test]
async fn test_transfer_reaches_finalized() {
    let node = MockNode::start().await;
    let connection = connect(&node).await;
    let submitter = ExtrinsicSubmitter::new(Arc::clone(&connection));

    let bob = DevAccount::Bob.sr25519().unwrap();
    let ferdie = DevAccount::Ferdie.account_id().unwrap();

    let progress = submitter
        .submit(&Call::transfer_keep_alive(ferdie, 10 * UNIT), &bob, TxOptions::new())
        .await
        .unwrap();
    assert_eq!(progress.state(), ExtrinsicState::Ready);

    let extrinsic = progress.wait_for_success().await.unwrap();
    assert_eq!(extrinsic.history.len(), 3);
    assert!(matches!(extrinsic.history[1], ExtrinsicState::InBlock(_)));
    assert!(matches!(extrinsic.state, ExtrinsicState::Finalized(_)));
    // Index 0 is the inherent
    assert_eq!(extrinsic.extrinsic_index, Some(1));
    assert!(extrinsic.outcome.as_ref().unwrap().is_success());

    let transfer = extrinsic.find_events("Balances", "Transfer").next().unwrap();
    assert_eq!(transfer.field("amount").and_then(value_as_u128), Some(10 * UNIT));

    assert_eq!(connection.free_balance(&ferdie).await.unwrap(), 10 * UNIT);
    assert_eq!(
        connection.free_balance(&bob.account_id()).await.unwrap(),
        GENESIS_FREE - 10 * UNIT
    );
}

#[tokio::test]
async fn test_insufficient_balance_is_module_error() {
    let node = MockNode::start().await;
    let submitter = ExtrinsicSubmitter::new(connect(&node).await);

    let ferdie = DevAccount::Ferdie.sr25519().unwrap();
    let bob = DevAccount::Bob.account_id().unwrap();

    let progress = submitter
        .submit(&Call::transfer_allow_death(bob, UNIT), &ferdie, TxOptions::new())
        .await
        .unwrap();

    match progress.wait_for_success().await {
        Err(TxError::DispatchFailed { failure, .. }) => {
            assert_eq!(failure.module_name().as_deref(), Some("Balances::InsufficientBalance"));
            assert!(!failure.is_origin());
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(extrinsic) => panic!("transfer succeeded: {:?}", extrinsic.outcome),
    }
}

#[tokio::test]
async fn test_sudo_from_non_sudo_account_is_origin_failure() {
    let node = MockNode::start().await;
    let submitter = ExtrinsicSubmitter::new(connect(&node).await);
    let bob = DevAccount::Bob.sr25519().unwrap();

    let extrinsic = submitter
        .submit_as_sudo(Call::remark(b"not allowed".to_vec()), &bob, TxOptions::sudo())
        .await
        .unwrap()
        .wait_for_finalized()
        .await
        .unwrap();

    assert!(extrinsic.sudo);
    assert!(extrinsic.failure().unwrap().is_origin());
    assert_eq!(extrinsic.find_events("System", "ExtrinsicFailed").count(), 1);
}

#[tokio::test]
async fn test_sudo_by_key_holder() {
    let node = MockNode::start().await;
    let submitter = ExtrinsicSubmitter::new(connect(&node).await);
    let alice = DevAccount::Alice.sr25519().unwrap();

    let extrinsic = submitter
        .submit_as_sudo(Call::remark(b"root remark".to_vec()), &alice, TxOptions::sudo())
        .await
        .unwrap()
        .wait_for_success()
        .await
        .unwrap();
    assert_eq!(extrinsic.find_events("Sudo", "Sudid").count(), 1);

    // A signed-only call dispatched as Root fails inside Sudid; the extrinsic itself succeeds
    let ferdie = DevAccount::Ferdie.account_id().unwrap();
    let extrinsic = submitter
        .submit_as_sudo_unchecked(
            Call::transfer_keep_alive(ferdie, UNIT),
            &alice,
            Weight::new(1_000_000, 0),
            TxOptions::sudo(),
        )
        .await
        .unwrap()
        .wait_for_finalized()
        .await
        .unwrap();
    assert_eq!(extrinsic.find_events("System", "ExtrinsicSuccess").count(), 1);
    assert!(extrinsic.failure().unwrap().is_origin());
    assert_eq!(node.free_balance(&ferdie).await, 0);
}

#[tokio::test]
async fn test_runtime_upgrade_refreshes_cached_version() {
    let node = MockNode::start().await;
    let connection = connect(&node).await;
    let submitter = ExtrinsicSubmitter::new(Arc::clone(&connection));
    let alice = DevAccount::Alice.sr25519().unwrap();
    assert_eq!(connection.runtime_version().await.spec_version, SPEC_VERSION);

    let extrinsic = submitter
        .submit_as_sudo_unchecked(
            Call::set_code(b"\0asm firechain v101".to_vec()),
            &alice,
            Weight::new(1_000_000, 0),
            TxOptions::sudo(),
        )
        .await
        .unwrap()
        .wait_for_success()
        .await
        .unwrap();
    assert_eq!(extrinsic.find_events("System", "CodeUpdated").count(), 1);
    assert_eq!(node.spec_version().await, SPEC_VERSION + 1);
    assert_eq!(connection.runtime_version().await.spec_version, SPEC_VERSION + 1);

    // Later submissions keep working against the upgraded runtime
    submitter
        .submit(&Call::remark(b"after upgrade".to_vec()), &alice, TxOptions::new())
        .await
        .unwrap()
        .wait_for_success()
        .await
        .unwrap();
}

#[tokio::test]
async fn test_nonce_conflicts_are_classified() {
    let node = MockNode::start_with(MANUAL).await;
    let submitter = ExtrinsicSubmitter::new(connect(&node).await);
    let bob = DevAccount::Bob.sr25519().unwrap();

    let first = submitter
        .submit(&Call::remark(b"first".to_vec()), &bob, TxOptions::new().with_nonce(0))
        .await
        .unwrap();

    let same_nonce = submitter
        .submit(&Call::remark(b"second".to_vec()), &bob, TxOptions::new().with_nonce(0))
        .await;
    assert_eq!(rejection_kind(same_nonce), PoolRejectionKind::PriorityTooLow);

    let gap = submitter
        .submit(&Call::remark(b"gap".to_vec()), &bob, TxOptions::new().with_nonce(5))
        .await;
    assert_eq!(rejection_kind(gap), PoolRejectionKind::FutureNonce);

    node.produce_block().await;
    first.wait_for_finalized().await.unwrap();

    let stale = submitter
        .submit(&Call::remark(b"stale".to_vec()), &bob, TxOptions::new().with_nonce(0))
        .await;
    let kind = rejection_kind(stale);
    assert_eq!(kind, PoolRejectionKind::StaleNonce);
    assert_eq!(node.pool_len().await, 0);
}

#[tokio::test]
async fn test_resubmitting_identical_bytes() {
    let node = MockNode::start_with(MANUAL).await;
    let submitter = ExtrinsicSubmitter::new(connect(&node).await);
    let charlie = DevAccount::Charlie.sr25519().unwrap();

    let signed = submitter
        .create_signed(&Call::remark(b"once".to_vec()), &charlie, TxOptions::new())
        .await
        .unwrap();
    let _progress = submitter.submit_signed(signed.clone(), false).await.unwrap();

    match submitter.submit_signed(signed, false).await {
        Err(TxError::Rejected(rejection)) => {
            assert_eq!(rejection.kind, PoolRejectionKind::AlreadyImported);
            assert!(rejection.is_nonce_conflict());
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("duplicate accepted"),
    }
    assert_eq!(node.submissions().await, 1);
}

#[tokio::test]
async fn test_auto_nonce_counts_pending_transactions() {
    let node = MockNode::start_with(MANUAL).await;
    let submitter = ExtrinsicSubmitter::new(connect(&node).await);
    let dave = DevAccount::Dave.sr25519().unwrap();

    let first = submitter
        .submit(&Call::remark(b"a".to_vec()), &dave, TxOptions::new())
        .await
        .unwrap();
    let second = submitter
        .submit(&Call::remark(b"b".to_vec()), &dave, TxOptions::new())
        .await
        .unwrap();
    assert_eq!(first.extrinsic().nonce, 0);
    assert_eq!(second.extrinsic().nonce, 1);

    node.produce_block().await;
    let first = first.wait_for_in_block().await.unwrap();
    let second = second.wait_for_in_block().await.unwrap();
    assert_eq!(first.extrinsic_index, Some(1));
    assert_eq!(second.extrinsic_index, Some(2));
}

#[tokio::test]
async fn test_dropped_extrinsic() {
    let node = MockNode::start_with(MANUAL).await;
    let submitter = ExtrinsicSubmitter::new(connect(&node).await);
    let eve = DevAccount::Eve.sr25519().unwrap();

    let progress = submitter
        .submit(&Call::remark(b"doomed".to_vec()), &eve, TxOptions::new())
        .await
        .unwrap();
    let hash = progress.hash();

    node.drop_pool().await;
    match progress.wait_for_finalized().await {
        Err(TxError::Dropped(dropped)) => assert_eq!(dropped, hash),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(extrinsic) => panic!("dropped extrinsic finalized in state {}", extrinsic.state),
    }
}

// =============================================================================
// EVENT WAITS
// =============================================================================

#[tokio::test]
async fn test_event_wait_not_observed() {
    let node = MockNode::start().await;
    let waiter = EventWaiter::new(connect(&node).await, fast_events());

    let err = waiter
        .wait_for(&AwaitSpec::new("Balances", "Endowed"), Duration::from_millis(300))
        .await
        .unwrap_err();
    assert!(err.is_not_observed());
    assert!(err.to_string().contains("Balances.Endowed"));
}

#[tokio::test]
async fn test_event_wait_retries_failed_polls() {
    let node = MockNode::start().await;
    let connection = connect(&node).await;
    let waiter = EventWaiter::new(Arc::clone(&connection), fast_events());

    node.fail_storage_reads(3).await;
    let record = waiter.wait_for_next_session(Duration::from_secs(10)).await.unwrap();
    assert!(record.is("Session", "NewSession"));
    assert_eq!(node.failing_reads().await, 0);

    // A lost connection is not retried
    connection.close();
    let started = Instant::now();
    let err = waiter
        .wait_for(&AwaitSpec::new("Balances", "Endowed"), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(!err.is_not_observed(), "{}", err);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_wait_for_next_session() {
    let node = MockNode::start().await;
    let waiter = EventWaiter::new(connect(&node).await, fast_events());

    let record = waiter.wait_for_next_session(Duration::from_secs(10)).await.unwrap();
    assert!(record.is("session", "NewSession"));
    assert!(record.has_key("session_index"));
}

#[tokio::test]
async fn test_event_wait_with_payload_predicate() {
    let node = MockNode::start().await;
    let connection = connect(&node).await;
    let waiter = EventWaiter::new(Arc::clone(&connection), fast_events());

    let spec = AwaitSpec::new("Balances", "Transfer")
        .with_predicate(|record| record.field("amount").and_then(value_as_u128) == Some(3 * UNIT));
    let wait = tokio::spawn(async move { waiter.wait_for(&spec, Duration::from_secs(10)).await });

    // Let the waiter record its starting block first
    tokio::time::sleep(Duration::from_millis(100)).await;

    let submitter = ExtrinsicSubmitter::new(connection);
    let charlie = DevAccount::Charlie.sr25519().unwrap();
    let ferdie = DevAccount::Ferdie.account_id().unwrap();
    for amount in [UNIT, 3 * UNIT] {
        submitter
            .submit(&Call::transfer_keep_alive(ferdie, amount), &charlie, TxOptions::new())
            .await
            .unwrap()
            .wait_for_in_block()
            .await
            .unwrap();
    }

    let record = wait.await.unwrap().unwrap();
    assert_eq!(record.field("amount").and_then(value_as_u128), Some(3 * UNIT));
}

// =============================================================================
// BLOCK WAITS
// =============================================================================

#[tokio::test]
async fn test_wait_for_blocks_bounded_by_timeout() {
    let node = MockNode::start_with(MANUAL).await;
    let waiter = BlockWaiter::new(connect(&node).await);

    let outcome = waiter.wait_for_blocks(2, Duration::from_millis(200)).await.unwrap();
    assert!(!outcome.reached);
    assert_eq!(outcome.observed, 0);
    assert_eq!(outcome.last, None);
}

#[tokio::test]
async fn test_block_waits_keep_their_deadline_on_a_stalled_node() {
    let node = MockNode::start_with(MANUAL).await;
    let waiter = BlockWaiter::new(connect(&node).await);

    node.stall(Duration::from_secs(3)).await;
    let started = Instant::now();
    let outcome = waiter.wait_for_blocks(2, Duration::from_millis(200)).await.unwrap();
    assert!(started.elapsed() <= Duration::from_millis(500), "took {:?}", started.elapsed());
    assert!(!outcome.reached);
    assert_eq!(outcome.observed, 0);

    let started = Instant::now();
    let err = waiter
        .wait_for_block_number(5, Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(started.elapsed() <= Duration::from_millis(500), "took {:?}", started.elapsed());
    assert!(matches!(err, WaitError::BlockNotReached { target: 5, .. }), "{}", err);
}

#[tokio::test]
async fn test_wait_for_blocks_counts_new_heads() {
    let node = MockNode::start().await;
    let waiter = BlockWaiter::new(connect(&node).await);

    let outcome = waiter.wait_for_blocks(3, Duration::from_secs(10)).await.unwrap();
    assert!(outcome.reached);
    assert_eq!(outcome.observed, 3);

    let finalized = waiter.wait_for_finalized_blocks(1, Duration::from_secs(10)).await.unwrap();
    assert!(finalized.reached);

    let zero = waiter.wait_for_blocks(0, Duration::from_millis(1)).await.unwrap();
    assert!(zero.reached);
}

#[tokio::test]
async fn test_wait_for_block_number() {
    let node = MockNode::start().await;
    let waiter = BlockWaiter::new(connect(&node).await);

    let target = node.best_number().await + 3;
    let reached = waiter.wait_for_block_number(target, Duration::from_secs(10)).await.unwrap();
    assert!(reached >= target);
}

#[tokio::test]
async fn test_fast_forward() {
    let node = MockNode::start_with(MANUAL).await;
    let connection = connect(&node).await;
    let waiter = BlockWaiter::new(Arc::clone(&connection));

    let hashes = waiter.fast_forward(3).await.unwrap();
    assert_eq!(hashes.len(), 3);
    assert_eq!(node.best_number().await, 3);
    assert_eq!(connection.best_block().await.unwrap(), (3, hashes[2]));

    let err = waiter
        .wait_for_block_number(10, Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("#10"));
}

// =============================================================================
// ETHEREUM RPC
// =============================================================================

#[tokio::test]
async fn test_eth_state_queries() {
    let node = MockNode::start_with(MANUAL).await;
    let connection = connect(&node).await;
    let client = connection.client();
    let genesis = H160::from_hex(EVM_GENESIS_ACCOUNT).unwrap();

    assert_eq!(client.eth_chain_id().await.unwrap(), EVM_CHAIN_ID);
    assert_eq!(client.eth_gas_price().await.unwrap(), EVM_GAS_PRICE);
    assert_eq!(client.eth_get_balance(genesis, EthBlock::Latest).await.unwrap(), EVM_GENESIS_BALANCE);
    assert_eq!(client.eth_get_balance(H160::from_bytes([9u8; 20]), EthBlock::Latest).await.unwrap(), 0);
    assert_eq!(client.eth_get_transaction_count(genesis, EthBlock::Number(0)).await.unwrap(), 0);

    node.produce_block().await;
    assert_eq!(client.eth_block_number().await.unwrap(), 1);
}

#[tokio::test]
async fn test_eth_transaction_receipt() {
    let node = MockNode::start().await;
    let connection = connect(&node).await;
    let client = connection.client();
    let waiter = ReceiptWaiter::new(Arc::clone(&connection), Duration::from_millis(20));
    let genesis = H160::from_hex(EVM_GENESIS_ACCOUNT).unwrap();

    let raw = b"signed legacy transfer".to_vec();
    let hash = client.eth_send_raw_transaction(&raw).await.unwrap();
    let receipt = waiter.wait_for_receipt(hash, Duration::from_secs(10)).await.unwrap();
    assert_eq!(receipt.transaction_hash, hash);
    assert_eq!(receipt.from, genesis);
    assert!(receipt.succeeded());
    assert!(receipt.block_number().unwrap() >= 1);
    assert_eq!(client.eth_get_transaction_count(genesis, EthBlock::Latest).await.unwrap(), 1);

    let err = client.eth_send_raw_transaction(&raw).await.unwrap_err();
    assert!(err.call_error().is_some(), "{}", err);

    let err = waiter
        .wait_for_receipt(H256::from_bytes([7u8; 32]), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, WaitError::ReceiptNotFound { .. }), "{}", err);
}

// =============================================================================
// CONTEXT
// =============================================================================

#[tokio::test]
async fn test_context_attach_and_teardown() {
    let node = MockNode::start().await;
    let config = HarnessConfig::default()
        .with_endpoint(&node.url())
        .with_poll_interval(Duration::from_millis(20));

    let context = TestContext::attach(config).await.unwrap();
    assert_eq!(context.endpoint(), node.url());
    assert!(context.nodes().is_empty());

    let connection = context.connection().await.unwrap();
    assert_eq!(connection.client().system_chain().await.unwrap(), CHAIN_NAME);
    assert_eq!(connection.runtime_version().await.spec_version, super::test_runtime::SPEC_VERSION);

    let alice = DevAccount::Alice.sr25519().unwrap();
    let bob = DevAccount::Bob.account_id().unwrap();
    context
        .submitter()
        .await
        .unwrap()
        .submit(&Call::transfer_keep_alive(bob, UNIT), &alice, TxOptions::new())
        .await
        .unwrap()
        .wait_for_success()
        .await
        .unwrap();
    assert_eq!(node.free_balance(&bob).await, GENESIS_FREE + UNIT);

    let waiter = context.event_waiter().await.unwrap();
    assert_eq!(waiter.settings().poll_interval, Duration::from_millis(20));
    waiter.wait_for_next_session(Duration::from_secs(10)).await.unwrap();

    let report = context.teardown().await.unwrap();
    assert!(report.stopped.is_empty());
}

#[tokio::test]
async fn test_context_attach_unreachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut config = HarnessConfig::default().with_endpoint(&format!("ws://127.0.0.1:{}", port));
    config.rpc.connect_timeout_secs = 1;
    assert!(TestContext::attach(config).await.is_err());
}
