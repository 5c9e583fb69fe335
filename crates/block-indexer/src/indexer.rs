//! Main block indexer implementation

use crate::calculator::{ledger_entries_for_transaction, resolve_input, ResolvedInput};
use crate::config::IndexerConfig;
use crate::error::{BlockIndexerError, Result};
use crate::events::{BlockIndexedEvent, ChainRewoundEvent, EventEmitter, EventSubscriber};
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use ledger_store::LedgerStore;
use node_rpc::{NodeRpc, Transaction, TxInput};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Replays node blocks into the ledger store, one block per commit.
pub struct BlockIndexer {
    node: Arc<dyn NodeRpc>,
    store: Arc<dyn LedgerStore>,
    config: IndexerConfig,
    retry: RetryPolicy,
    event_emitter: EventEmitter,
    state: Arc<RwLock<IndexerState>>,
    cycle_lock: Mutex<()>,
}

#[derive(Default)]
struct IndexerState {
    last_indexed_height: u64,
    last_cycle: Option<CycleReport>,
}

/// Outcome of one successful indexing cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    /// Watermark when the cycle started.
    pub start_height: u64,
    /// Watermark when the cycle finished.
    pub end_height: u64,
    /// Node tip captured at the start of the cycle.
    pub tip_height: u64,
    pub blocks_indexed: u64,
    pub entries_written: u64,
    /// Set when a reorganization forced a rewind to this height.
    pub rewound_to: Option<u64>,
    pub finished_at: DateTime<Utc>,
}

impl BlockIndexer {
    /// Create an indexer resuming from the store's current watermark.
    pub async fn new(
        node: Arc<dyn NodeRpc>,
        store: Arc<dyn LedgerStore>,
        config: IndexerConfig,
    ) -> Result<Self> {
        let retry = RetryPolicy::new(config.max_fetch_attempts, config.retry_delay());
        let indexer = Self {
            node,
            store,
            event_emitter: EventEmitter::new(config.event_capacity),
            retry,
            config,
            state: Arc::new(RwLock::new(IndexerState::default())),
            cycle_lock: Mutex::new(()),
        };

        indexer.load_state().await?;

        Ok(indexer)
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Get a reference to the event emitter
    pub fn event_emitter(&self) -> &EventEmitter {
        &self.event_emitter
    }

    /// Subscribe to events
    pub fn subscribe_events(&self) -> EventSubscriber {
        EventSubscriber::new(&self.event_emitter)
    }

    async fn load_state(&self) -> Result<()> {
        let watermark = self.store.watermark().await?;
        self.state.write().await.last_indexed_height = watermark;
        info!("Block indexer resuming after height {}", watermark);
        Ok(())
    }

    /// Highest height this indexer has seen committed.
    pub async fn last_indexed_height(&self) -> u64 {
        self.state.read().await.last_indexed_height
    }

    pub async fn last_cycle(&self) -> Option<CycleReport> {
        self.state.read().await.last_cycle.clone()
    }

    /// Advance the watermark to the node tip captured at the start of the cycle.
    ///
    /// A failure aborts the cycle; blocks committed before it stay committed.
    /// When a node call runs out of retries the node session is recreated
    /// before the error is returned.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let _guard = self.cycle_lock.lock().await;

        match self.cycle().await {
            Ok(report) => {
                self.state.write().await.last_cycle = Some(report.clone());
                Ok(report)
            }
            Err(e) => {
                if e.is_retries_exhausted() {
                    warn!("Node unreachable, recreating the RPC session");
                    if let Err(reconnect_err) = self.node.reconnect().await {
                        error!("Failed to reconnect to node: {}", reconnect_err);
                    }
                }
                error!("Indexing cycle aborted: {}", e);
                Err(e)
            }
        }
    }

    async fn cycle(&self) -> Result<CycleReport> {
        let start_height = self.store.watermark().await?;
        let mut watermark = start_height;
        let mut rewound_to = None;

        if self.config.detect_reorgs && watermark > 0 {
            if let Some(fork_height) = self.find_fork_point(watermark).await? {
                let removed = self.store.rewind_to(fork_height).await?;
                warn!(
                    "Chain reorganization: rewound from {} to {} ({} ledger entries removed)",
                    watermark, fork_height, removed
                );
                self.state.write().await.last_indexed_height = fork_height;
                self.event_emitter.emit_chain_rewound(ChainRewoundEvent {
                    from_height: watermark,
                    to_height: fork_height,
                    entries_removed: removed,
                });
                watermark = fork_height;
                rewound_to = Some(fork_height);
            }
        }

        let tip_height = self
            .retry
            .run("getblockcount", || self.node.get_chain_tip_height())
            .await?;

        let mut report = CycleReport {
            start_height,
            end_height: watermark,
            tip_height,
            blocks_indexed: 0,
            entries_written: 0,
            rewound_to,
            finished_at: Utc::now(),
        };

        if watermark >= tip_height {
            debug!("Nothing to index: watermark {} tip {}", watermark, tip_height);
            return Ok(report);
        }

        info!("Indexing blocks {}..={}", watermark + 1, tip_height);
        for height in (watermark + 1)..=tip_height {
            let entries = self.index_block(height).await?;
            report.end_height = height;
            report.blocks_indexed += 1;
            report.entries_written += entries as u64;
        }

        report.finished_at = Utc::now();
        info!(
            "Indexing cycle complete: {} blocks, {} entries, watermark {}",
            report.blocks_indexed, report.entries_written, report.end_height
        );
        Ok(report)
    }

    /// Highest height at or below `watermark` whose stored hash still matches the node.
    ///
    /// Returns `None` when the block at the watermark is still canonical.
    async fn find_fork_point(&self, watermark: u64) -> Result<Option<u64>> {
        let mut height = watermark;
        while height > 0 {
            let Some(stored) = self.store.indexed_block_hash(height).await? else {
                break;
            };
            if self.node_hash_at(height).await?.as_deref() == Some(stored.as_str()) {
                break;
            }
            if watermark - height >= self.config.max_reorg_depth {
                return Err(BlockIndexerError::ReorgTooDeep {
                    height: watermark,
                    max_depth: self.config.max_reorg_depth,
                });
            }
            height -= 1;
        }
        Ok((height < watermark).then_some(height))
    }

    /// The node's hash at `height`, or `None` if its chain is now shorter.
    async fn node_hash_at(&self, height: u64) -> Result<Option<String>> {
        match self
            .retry
            .run("getblockhash", || self.node.get_block_hash(height))
            .await
        {
            Ok(hash) => Ok(Some(hash)),
            Err(BlockIndexerError::Rpc(e)) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetch, derive and commit one block; returns the number of entries written.
    async fn index_block(&self, height: u64) -> Result<usize> {
        let hash = self
            .retry
            .run("getblockhash", || self.node.get_block_hash(height))
            .await?;
        let block = self
            .retry
            .run("getblock", || self.node.get_block(&hash))
            .await?;

        // Transactions fetched for this block, including spent ones.
        let mut cache: HashMap<String, Transaction> = HashMap::new();
        let mut entries = Vec::new();

        for txid in &block.txids {
            let tx = self
                .retry
                .run("getrawtransaction", || self.node.get_transaction(txid))
                .await?;
            let inputs = self.resolve_inputs(&tx, &mut cache).await?;
            entries.extend(ledger_entries_for_transaction(&tx, &inputs, height));
            cache.insert(tx.txid.clone(), tx);
        }

        self.store.commit_block(height, &block.hash, &entries).await?;

        let addresses: BTreeSet<&str> = entries.iter().map(|e| e.address.as_str()).collect();
        info!(
            "Indexed block {} ({}) with {} ledger entries",
            height,
            block.hash,
            entries.len()
        );

        self.state.write().await.last_indexed_height = height;
        self.event_emitter.emit_block_indexed(BlockIndexedEvent {
            height,
            hash: block.hash.clone(),
            entries: entries.len(),
            addresses: addresses.into_iter().map(str::to_string).collect(),
            indexed_at: Utc::now(),
        });

        Ok(entries.len())
    }

    async fn resolve_inputs(
        &self,
        tx: &Transaction,
        cache: &mut HashMap<String, Transaction>,
    ) -> Result<Vec<ResolvedInput>> {
        for (prev_txid, _) in tx.spent_outpoints() {
            if cache.contains_key(prev_txid) {
                continue;
            }
            match self
                .retry
                .run("getrawtransaction", || self.node.get_transaction(prev_txid))
                .await
            {
                Ok(prev) => {
                    cache.insert(prev_txid.to_string(), prev);
                }
                Err(BlockIndexerError::Rpc(e)) if e.is_not_found() => {
                    debug!("Previous transaction {} not found: {}", prev_txid, e);
                }
                Err(e) => return Err(e),
            }
        }

        let resolved = tx
            .vin
            .iter()
            .map(|input| {
                let previous = match input {
                    TxInput::Regular { txid, .. } => cache.get(txid),
                    TxInput::Coinbase { .. } => None,
                };
                let resolved = resolve_input(input, previous);
                if let ResolvedInput::Unresolved { prev_txid, vout } = &resolved {
                    warn!(
                        "Skipping debit for {}: previous output {}:{} cannot be resolved",
                        tx.txid, prev_txid, vout
                    );
                }
                resolved
            })
            .collect();

        Ok(resolved)
    }
}
