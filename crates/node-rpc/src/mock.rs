//! In-memory node with scripted chain growth, reorgs and failures

use crate::client::NodeRpc;
use crate::error::{Result, RpcError};
use crate::types::{Block, OutputDestination, Transaction, TxInput, TxOutput};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;

const GENESIS_TIME: i64 = 1_386_325_540;
const BLOCK_SPACING: i64 = 60;

pub struct MockNode {
    chain: Mutex<MockChain>,
}

#[derive(Default)]
struct MockChain {
    blocks: Vec<Block>,
    transactions: HashMap<String, (Transaction, Option<u64>)>,
    mempool: Vec<String>,
    hash_counter: u64,
    pending_failures: usize,
    reconnects: usize,
    calls: usize,
}

impl MockChain {
    fn tip(&self) -> u64 {
        self.blocks.len().saturating_sub(1) as u64
    }

    fn push_block(&mut self, transactions: Vec<Transaction>, time: i64) -> Block {
        let height = self.blocks.len() as u64;
        self.hash_counter += 1;
        let hash = format!("{:064x}", self.hash_counter);

        let previous_hash = self.blocks.last_mut().map(|prev| {
            prev.next_hash = Some(hash.clone());
            prev.hash.clone()
        });

        let txids = transactions.iter().map(|tx| tx.txid.clone()).collect();
        for mut tx in transactions {
            tx.block_hash = Some(hash.clone());
            tx.time = Some(time);
            self.mempool.retain(|txid| txid != &tx.txid);
            self.transactions.insert(tx.txid.clone(), (tx, Some(height)));
        }

        let block = Block {
            hash,
            height,
            confirmations: 1,
            time,
            difficulty: 1.0,
            size: 285,
            merkle_root: format!("{:064x}", self.hash_counter.wrapping_mul(31)),
            previous_hash,
            next_hash: None,
            txids,
        };
        self.blocks.push(block.clone());
        block
    }
}

impl MockNode {
    /// A chain holding only a genesis block whose coinbase pays `NGenesis`.
    pub fn new() -> Self {
        let mut chain = MockChain::default();
        let genesis = coinbase("genesis-coinbase", vec![output(Decimal::from(50), &["NGenesis"])]);
        chain.push_block(vec![genesis], GENESIS_TIME);
        Self {
            chain: Mutex::new(chain),
        }
    }

    /// Append a block one spacing after the current tip.
    pub async fn mine_block(&self, transactions: Vec<Transaction>) -> Block {
        let mut chain = self.chain.lock().await;
        let time = chain.blocks.last().map_or(GENESIS_TIME, |b| b.time + BLOCK_SPACING);
        chain.push_block(transactions, time)
    }

    pub async fn mine_block_at(&self, transactions: Vec<Transaction>, time: i64) -> Block {
        self.chain.lock().await.push_block(transactions, time)
    }

    /// Discard every block at or above `height`, as a competing chain would.
    pub async fn reorg_from(&self, height: u64) {
        let mut chain = self.chain.lock().await;
        let keep = height as usize;
        if keep >= chain.blocks.len() {
            return;
        }
        chain.blocks.truncate(keep);
        if let Some(last) = chain.blocks.last_mut() {
            last.next_hash = None;
        }
        chain
            .transactions
            .retain(|_, (_, block_height)| block_height.map_or(true, |h| h < height));
    }

    pub async fn add_mempool_transaction(&self, tx: Transaction) {
        let mut chain = self.chain.lock().await;
        chain.mempool.push(tx.txid.clone());
        chain.transactions.insert(tx.txid.clone(), (tx, None));
    }

    /// Make the next `count` calls fail with a transient error.
    pub async fn fail_next_calls(&self, count: usize) {
        self.chain.lock().await.pending_failures = count;
    }

    pub async fn reconnect_count(&self) -> usize {
        self.chain.lock().await.reconnects
    }

    pub async fn call_count(&self) -> usize {
        self.chain.lock().await.calls
    }

    pub async fn tip_height(&self) -> u64 {
        self.chain.lock().await.tip()
    }

    async fn enter(&self) -> Result<tokio::sync::MutexGuard<'_, MockChain>> {
        let mut chain = self.chain.lock().await;
        chain.calls += 1;
        if chain.pending_failures > 0 {
            chain.pending_failures -= 1;
            return Err(RpcError::Transient("injected connection reset".to_string()));
        }
        Ok(chain)
    }
}

impl Default for MockNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeRpc for MockNode {
    async fn get_chain_tip_height(&self) -> Result<u64> {
        Ok(self.enter().await?.tip())
    }

    async fn get_block_hash(&self, height: u64) -> Result<String> {
        let chain = self.enter().await?;
        chain
            .blocks
            .get(height as usize)
            .map(|block| block.hash.clone())
            .ok_or_else(|| RpcError::NotFound(format!("Block height {} out of range", height)))
    }

    async fn get_block(&self, hash: &str) -> Result<Block> {
        let chain = self.enter().await?;
        let tip = chain.tip();
        chain
            .blocks
            .iter()
            .find(|block| block.hash == hash)
            .map(|block| Block {
                confirmations: (tip - block.height + 1) as i64,
                ..block.clone()
            })
            .ok_or_else(|| RpcError::NotFound(format!("Block {} not found", hash)))
    }

    async fn get_transaction(&self, txid: &str) -> Result<Transaction> {
        let chain = self.enter().await?;
        let tip = chain.tip();
        let (tx, height) = chain
            .transactions
            .get(txid)
            .ok_or_else(|| RpcError::NotFound(format!("No such transaction {}", txid)))?;

        Ok(Transaction {
            confirmations: height.map(|h| tip - h + 1),
            ..tx.clone()
        })
    }

    async fn get_mempool_txids(&self) -> Result<Vec<String>> {
        Ok(self.enter().await?.mempool.clone())
    }

    async fn reconnect(&self) -> Result<()> {
        self.chain.lock().await.reconnects += 1;
        Ok(())
    }
}

/// An output paying `value` to every address given; none means no address.
pub fn output(value: Decimal, addresses: &[&str]) -> TxOutput {
    let destination = if addresses.is_empty() {
        OutputDestination::NoAddress
    } else {
        OutputDestination::Addresses(addresses.iter().map(|a| a.to_string()).collect())
    };
    TxOutput {
        value,
        n: 0,
        destination,
    }
}

pub fn coinbase(txid: &str, outputs: Vec<TxOutput>) -> Transaction {
    transaction(
        txid,
        vec![TxInput::Coinbase {
            coinbase: "04ffff001d0104".to_string(),
        }],
        outputs,
        120,
    )
}

pub fn spend(txid: &str, inputs: &[(&str, u32)], outputs: Vec<TxOutput>) -> Transaction {
    let vin = inputs
        .iter()
        .map(|(prev, vout)| TxInput::Regular {
            txid: prev.to_string(),
            vout: *vout,
        })
        .collect();
    transaction(txid, vin, outputs, 250)
}

fn transaction(txid: &str, vin: Vec<TxInput>, outputs: Vec<TxOutput>, size: u64) -> Transaction {
    let vout = outputs
        .into_iter()
        .enumerate()
        .map(|(n, out)| TxOutput { n: n as u32, ..out })
        .collect();
    Transaction {
        txid: txid.to_string(),
        vin,
        vout,
        size,
        time: None,
        confirmations: None,
        block_hash: None,
    }
}
