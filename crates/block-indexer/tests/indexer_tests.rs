//! Integration tests for the block indexer against an in-memory node and store

use async_trait::async_trait;
use block_indexer::{
    BlockIndexer, BlockIndexerError, IndexerConfig, IndexerEvent, IndexerService,
};
use ledger_store::{
    BalanceTotals, DatabaseConfig, DatabaseConnection, HistoryPage, HistoryRow, LedgerEntry,
    LedgerStore, SqlLedgerStore, StoreError,
};
use node_rpc::mock::{coinbase, output, spend, MockNode};
use node_rpc::{Block, NodeRpc, Transaction};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

fn coins(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn test_config() -> IndexerConfig {
    IndexerConfig {
        retry_delay_ms: 1,
        ..IndexerConfig::default()
    }
}

async fn create_test_store() -> Arc<SqlLedgerStore> {
    let conn = DatabaseConnection::new(DatabaseConfig::in_memory()).await.unwrap();
    Arc::new(SqlLedgerStore::new(conn).await.unwrap())
}

async fn create_test_indexer(
    config: IndexerConfig,
) -> (Arc<MockNode>, Arc<SqlLedgerStore>, BlockIndexer) {
    let node = Arc::new(MockNode::new());
    let store = create_test_store().await;
    let indexer = BlockIndexer::new(node.clone(), store.clone(), config)
        .await
        .unwrap();
    (node, store, indexer)
}

/// Block 1 pays Alice, block 2 moves part of it to Carol.
async fn mine_payment_chain(node: &MockNode) {
    node.mine_block(vec![coinbase("cb1", vec![output(coins("50"), &["NAlice"])])])
        .await;
    node.mine_block(vec![
        coinbase("cb2", vec![output(coins("50.01"), &["NBob"])]),
        spend(
            "pay",
            &[("cb1", 0)],
            vec![output(coins("30"), &["NCarol"]), output(coins("19.99"), &["NAlice"])],
        ),
    ])
    .await;
}

#[tokio::test]
async fn test_cycle_writes_credits_and_debits() {
    let (node, store, indexer) = create_test_indexer(test_config()).await;
    mine_payment_chain(&node).await;

    let report = indexer.run_cycle().await.unwrap();
    assert_eq!(report.start_height, 0);
    assert_eq!(report.end_height, 2);
    assert_eq!(report.tip_height, 2);
    assert_eq!(report.blocks_indexed, 2);
    assert_eq!(report.entries_written, 5);
    assert_eq!(report.rewound_to, None);

    assert_eq!(store.watermark().await.unwrap(), 2);
    assert_eq!(indexer.last_indexed_height().await, 2);
    assert_eq!(indexer.last_cycle().await, Some(report));

    let alice = store.query_balance("NAlice").await.unwrap();
    assert_eq!(alice.received, coins("69.99"));
    assert_eq!(alice.sent, coins("50"));
    assert_eq!(alice.balance(), coins("19.99"));
    assert_eq!(store.query_balance("NCarol").await.unwrap().balance(), coins("30"));
    assert_eq!(store.query_balance("NBob").await.unwrap().balance(), coins("50.01"));

    // Genesis is never credited.
    assert_eq!(store.query_balance("NGenesis").await.unwrap().received, Decimal::ZERO);
}

#[tokio::test]
async fn test_spends_within_one_block_are_resolved() {
    let (node, store, indexer) = create_test_indexer(test_config()).await;
    mine_payment_chain(&node).await;
    node.mine_block(vec![
        coinbase("cb3", vec![output(coins("50"), &["NMiner"])]),
        spend("hop1", &[("pay", 0)], vec![output(coins("29.9"), &["NDave"])]),
        spend("hop2", &[("hop1", 0)], vec![output(coins("29.8"), &["NErin"])]),
    ])
    .await;

    indexer.run_cycle().await.unwrap();

    assert_eq!(store.query_balance("NCarol").await.unwrap().balance(), Decimal::ZERO);
    let dave = store.query_balance("NDave").await.unwrap();
    assert_eq!(dave.received, coins("29.9"));
    assert_eq!(dave.sent, coins("29.9"));
    assert_eq!(store.query_balance("NErin").await.unwrap().balance(), coins("29.8"));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let (node, store, indexer) = create_test_indexer(test_config()).await;
    mine_payment_chain(&node).await;

    indexer.run_cycle().await.unwrap();
    let before = store.entries_at_height(2).await.unwrap();

    let report = indexer.run_cycle().await.unwrap();
    assert_eq!(report.blocks_indexed, 0);
    assert_eq!(report.end_height, 2);
    assert_eq!(store.watermark().await.unwrap(), 2);
    assert_eq!(store.entries_at_height(2).await.unwrap(), before);
}

#[tokio::test]
async fn test_cycle_stops_at_tip_captured_at_start() {
    let (node, store, indexer) = create_test_indexer(test_config()).await;
    node.mine_block(vec![coinbase("cb1", vec![output(coins("50"), &["NAlice"])])])
        .await;

    indexer.run_cycle().await.unwrap();
    node.mine_block(vec![coinbase("cb2", vec![output(coins("50"), &["NAlice"])])])
        .await;
    assert_eq!(store.watermark().await.unwrap(), 1);

    let report = indexer.run_cycle().await.unwrap();
    assert_eq!(report.start_height, 1);
    assert_eq!(report.end_height, 2);
    assert_eq!(report.blocks_indexed, 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let (node, store, indexer) = create_test_indexer(test_config()).await;
    mine_payment_chain(&node).await;

    node.fail_next_calls(2).await;
    let report = indexer.run_cycle().await.unwrap();

    assert_eq!(report.end_height, 2);
    assert_eq!(store.watermark().await.unwrap(), 2);
    assert_eq!(node.reconnect_count().await, 0);
}

#[tokio::test]
async fn test_exhausted_retries_reconnect_and_abandon_cycle() {
    let (node, store, indexer) = create_test_indexer(test_config()).await;
    mine_payment_chain(&node).await;

    node.fail_next_calls(3).await;
    let err = indexer.run_cycle().await.unwrap_err();

    assert!(err.is_retries_exhausted());
    assert_eq!(node.reconnect_count().await, 1);
    assert_eq!(store.watermark().await.unwrap(), 0);
    assert_eq!(indexer.last_cycle().await, None);

    // The next cycle resumes from the unchanged watermark.
    let report = indexer.run_cycle().await.unwrap();
    assert_eq!(report.start_height, 0);
    assert_eq!(report.end_height, 2);
}

#[tokio::test]
async fn test_unresolvable_input_skips_only_its_debit() {
    let (node, store, indexer) = create_test_indexer(test_config()).await;
    node.mine_block(vec![
        coinbase("cb1", vec![output(coins("50"), &["NMiner"])]),
        spend(
            "orphan-spend",
            &[("missing-parent", 0)],
            vec![output(coins("5"), &["NAlice"]), output(coins("1"), &[])],
        ),
    ])
    .await;

    let report = indexer.run_cycle().await.unwrap();
    assert_eq!(report.entries_written, 2);

    let alice = store.query_balance("NAlice").await.unwrap();
    assert_eq!(alice.received, coins("5"));
    assert_eq!(alice.sent, Decimal::ZERO);
}

/// Store wrapper whose commit fails at a chosen height.
struct FailingStore {
    inner: Arc<SqlLedgerStore>,
    fail_at: Mutex<Option<u64>>,
}

#[async_trait]
impl LedgerStore for FailingStore {
    async fn watermark(&self) -> ledger_store::Result<u64> {
        self.inner.watermark().await
    }

    async fn indexed_block_hash(&self, height: u64) -> ledger_store::Result<Option<String>> {
        self.inner.indexed_block_hash(height).await
    }

    async fn commit_block(
        &self,
        height: u64,
        block_hash: &str,
        entries: &[LedgerEntry],
    ) -> ledger_store::Result<()> {
        if *self.fail_at.lock().await == Some(height) {
            return Err(StoreError::Corrupt("disk full".to_string()));
        }
        self.inner.commit_block(height, block_hash, entries).await
    }

    async fn rewind_to(&self, height: u64) -> ledger_store::Result<u64> {
        self.inner.rewind_to(height).await
    }

    async fn query_balance(&self, address: &str) -> ledger_store::Result<BalanceTotals> {
        self.inner.query_balance(address).await
    }

    async fn query_history(
        &self,
        address: &str,
        offset: u64,
        limit: u64,
    ) -> ledger_store::Result<Vec<HistoryRow>> {
        self.inner.query_history(address, offset, limit).await
    }

    async fn count_distinct_txids(&self, address: &str) -> ledger_store::Result<u64> {
        self.inner.count_distinct_txids(address).await
    }

    async fn query_history_page(
        &self,
        address: &str,
        offset: u64,
        limit: u64,
    ) -> ledger_store::Result<HistoryPage> {
        self.inner.query_history_page(address, offset, limit).await
    }

    async fn entries_at_height(&self, height: u64) -> ledger_store::Result<Vec<LedgerEntry>> {
        self.inner.entries_at_height(height).await
    }
}

#[tokio::test]
async fn test_store_failure_keeps_watermark() {
    let node = Arc::new(MockNode::new());
    let inner = create_test_store().await;
    let store = Arc::new(FailingStore {
        inner: inner.clone(),
        fail_at: Mutex::new(Some(2)),
    });
    let indexer = BlockIndexer::new(node.clone(), store.clone(), test_config())
        .await
        .unwrap();
    mine_payment_chain(&node).await;

    let err = indexer.run_cycle().await.unwrap_err();
    assert!(matches!(err, BlockIndexerError::Store(_)));
    assert_eq!(node.reconnect_count().await, 0);

    // Block 1 was committed before the failure, block 2 left no trace.
    assert_eq!(inner.watermark().await.unwrap(), 1);
    assert!(inner.entries_at_height(2).await.unwrap().is_empty());
    assert_eq!(indexer.last_indexed_height().await, 1);

    *store.fail_at.lock().await = None;
    let report = indexer.run_cycle().await.unwrap();
    assert_eq!(report.start_height, 1);
    assert_eq!(inner.watermark().await.unwrap(), 2);
}

#[tokio::test]
async fn test_reorg_rewinds_to_fork_point() {
    let (node, store, indexer) = create_test_indexer(test_config()).await;
    let mut events = indexer.subscribe_events();

    node.mine_block(vec![coinbase("cb1", vec![output(coins("50"), &["NAlice"])])])
        .await;
    node.mine_block(vec![coinbase("cb2", vec![output(coins("50"), &["NBob"])])])
        .await;
    node.mine_block(vec![coinbase("cb3", vec![output(coins("50"), &["NBob"])])])
        .await;
    indexer.run_cycle().await.unwrap();
    assert_eq!(store.query_balance("NBob").await.unwrap().balance(), coins("100"));

    // The competing chain is one block shorter than what was indexed.
    node.reorg_from(2).await;
    node.mine_block(vec![coinbase("cb2b", vec![output(coins("50"), &["NCarol"])])])
        .await;

    let report = indexer.run_cycle().await.unwrap();
    assert_eq!(report.start_height, 3);
    assert_eq!(report.rewound_to, Some(1));
    assert_eq!(report.end_height, 2);

    assert_eq!(store.query_balance("NBob").await.unwrap().received, Decimal::ZERO);
    assert_eq!(store.query_balance("NCarol").await.unwrap().balance(), coins("50"));
    assert_eq!(store.query_balance("NAlice").await.unwrap().balance(), coins("50"));
    assert_eq!(
        store.indexed_block_hash(2).await.unwrap(),
        Some(node.get_block_hash(2).await.unwrap())
    );

    let mut rewound = None;
    while let Some(event) = events.try_recv().unwrap() {
        if let IndexerEvent::ChainRewound(e) = event {
            rewound = Some(e);
        }
    }
    let rewound = rewound.expect("chain rewound event");
    assert_eq!(rewound.from_height, 3);
    assert_eq!(rewound.to_height, 1);
    assert_eq!(rewound.entries_removed, 2);
}

#[tokio::test]
async fn test_reorg_deeper_than_limit_is_refused() {
    let config = IndexerConfig {
        max_reorg_depth: 1,
        ..test_config()
    };
    let (node, store, indexer) = create_test_indexer(config).await;
    mine_payment_chain(&node).await;
    indexer.run_cycle().await.unwrap();

    node.reorg_from(1).await;
    node.mine_block(vec![coinbase("cb1b", vec![])]).await;
    node.mine_block(vec![coinbase("cb2b", vec![])]).await;

    let err = indexer.run_cycle().await.unwrap_err();
    assert!(matches!(
        err,
        BlockIndexerError::ReorgTooDeep { height: 2, max_depth: 1 }
    ));
    assert_eq!(store.watermark().await.unwrap(), 2);
}

#[tokio::test]
async fn test_block_indexed_events() {
    let (node, _store, indexer) = create_test_indexer(test_config()).await;
    let mut events = indexer.subscribe_events();
    mine_payment_chain(&node).await;

    indexer.run_cycle().await.unwrap();

    match events.recv().await.unwrap() {
        IndexerEvent::BlockIndexed(e) => {
            assert_eq!(e.height, 1);
            assert_eq!(e.entries, 1);
            assert_eq!(e.addresses, vec!["NAlice".to_string()]);
        }
        other => panic!("Unexpected event type: {:?}", other),
    }
    match events.recv().await.unwrap() {
        IndexerEvent::BlockIndexed(e) => {
            assert_eq!(e.height, 2);
            assert_eq!(e.entries, 4);
            assert_eq!(
                e.addresses,
                vec!["NAlice".to_string(), "NBob".to_string(), "NCarol".to_string()]
            );
        }
        other => panic!("Unexpected event type: {:?}", other),
    }
}

#[tokio::test]
async fn test_service_polls_and_shuts_down() {
    let (node, store, indexer) = create_test_indexer(test_config()).await;
    let indexer = Arc::new(indexer);
    let handle = IndexerService::spawn(indexer.clone(), Duration::from_millis(10));

    mine_payment_chain(&node).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while indexer.last_indexed_height().await < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("indexer caught up");

    assert!(!handle.is_finished());
    handle.shutdown().await.unwrap();

    // Nothing is indexed once the service has stopped.
    node.mine_block(vec![]).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(store.watermark().await.unwrap(), 2);
}

#[tokio::test]
async fn test_service_with_zero_interval_keeps_running() {
    let config = IndexerConfig {
        poll_interval_seconds: 0,
        ..test_config()
    };
    let (node, store, indexer) = create_test_indexer(config.clone()).await;
    mine_payment_chain(&node).await;
    let handle = IndexerService::spawn(Arc::new(indexer), config.poll_interval());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());
    handle.shutdown().await.unwrap();
    assert_eq!(store.watermark().await.unwrap(), 2);

    let (_node, _store, indexer) = create_test_indexer(test_config()).await;
    let handle = IndexerService::spawn(Arc::new(indexer), Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handle.is_finished());
    handle.shutdown().await.unwrap();
}

/// Node wrapper whose `get_transaction` never answers for one txid.
struct StallingNode {
    inner: Arc<MockNode>,
    stall_txid: String,
    stalled: Notify,
}

#[async_trait]
impl NodeRpc for StallingNode {
    async fn get_chain_tip_height(&self) -> node_rpc::Result<u64> {
        self.inner.get_chain_tip_height().await
    }

    async fn get_block_hash(&self, height: u64) -> node_rpc::Result<String> {
        self.inner.get_block_hash(height).await
    }

    async fn get_block(&self, hash: &str) -> node_rpc::Result<Block> {
        self.inner.get_block(hash).await
    }

    async fn get_transaction(&self, txid: &str) -> node_rpc::Result<Transaction> {
        if txid == self.stall_txid {
            self.stalled.notify_one();
            std::future::pending::<()>().await;
        }
        self.inner.get_transaction(txid).await
    }

    async fn get_mempool_txids(&self) -> node_rpc::Result<Vec<String>> {
        self.inner.get_mempool_txids().await
    }

    async fn reconnect(&self) -> node_rpc::Result<()> {
        self.inner.reconnect().await
    }
}

#[tokio::test]
async fn test_shutdown_during_cycle_leaves_ledger_consistent() {
    let mock = Arc::new(MockNode::new());
    mine_payment_chain(&mock).await;
    let node = Arc::new(StallingNode {
        inner: mock,
        stall_txid: "pay".to_string(),
        stalled: Notify::new(),
    });
    let store = create_test_store().await;
    let indexer = BlockIndexer::new(node.clone(), store.clone(), test_config())
        .await
        .unwrap();
    let handle = IndexerService::spawn(Arc::new(indexer), Duration::from_secs(60));

    // Block 1 is committed, block 2 is waiting on its second transaction.
    tokio::time::timeout(Duration::from_secs(5), node.stalled.notified())
        .await
        .expect("cycle reached block 2");

    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .expect("shutdown does not wait for the stalled cycle")
        .unwrap();

    assert_eq!(store.watermark().await.unwrap(), 1);
    assert_eq!(store.indexed_block_hash(2).await.unwrap(), None);
    assert!(store.entries_at_height(2).await.unwrap().is_empty());
    assert_eq!(store.query_balance("NCarol").await.unwrap().received, Decimal::ZERO);
    assert_eq!(store.query_balance("NAlice").await.unwrap().balance(), coins("50"));
}
