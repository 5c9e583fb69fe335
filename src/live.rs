//! On-demand block and transaction views computed straight from the node
//!
//! Nothing here reads the ledger. Every figure is recomputed per request by
//! walking a block's transactions and the transactions their inputs spend.

use crate::config::ExplorerSettings;
use crate::error::{ExplorerError, Result};
use block_indexer::{
    attribute_fees_to_coinbase, fee_per_byte, resolve_input, resolved_input_values, time_to_mine,
    total_output_value, transaction_fee, ResolvedInput, TransactionFeeSummary,
};
use chrono::{DateTime, TimeZone, Utc};
use node_rpc::{Block, NodeRpc, RpcError, Transaction, TxInput};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Decimal places shown for fee-per-byte in listings.
const FEE_RATE_SCALE: u32 = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockDetail {
    pub height: u64,
    pub hash: String,
    pub confirmations: i64,
    pub time: DateTime<Utc>,
    pub time_to_mine: i64,
    pub difficulty: f64,
    pub size: u64,
    pub merkle_root: String,
    pub previous_hash: Option<String>,
    pub next_hash: Option<String>,
    pub total_value: Decimal,
    pub transactions: Vec<TransactionFeeSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputDetail {
    pub is_coinbase: bool,
    pub prev_txid: Option<String>,
    pub vout: Option<u32>,
    /// Spent value; for a coinbase input, the block reward.
    pub value: Option<Decimal>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputDetail {
    pub n: u32,
    pub value: Decimal,
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionDetail {
    pub txid: String,
    /// `None` while the transaction is unconfirmed.
    pub block_height: Option<u64>,
    pub block_hash: Option<String>,
    pub confirmations: Option<u64>,
    pub time: Option<DateTime<Utc>>,
    pub size: u64,
    pub is_coinbase: bool,
    pub inputs: Vec<InputDetail>,
    pub outputs: Vec<OutputDetail>,
    /// `None` if any spent output could not be resolved.
    pub total_input: Option<Decimal>,
    pub total_output: Decimal,
    pub fee: Option<Decimal>,
    pub fee_per_byte: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockSummary {
    pub height: u64,
    pub hash: String,
    pub time: DateTime<Utc>,
    pub time_to_mine: i64,
    pub difficulty: f64,
    pub transaction_count: usize,
    pub size: u64,
    pub total_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockPage {
    pub page: u64,
    pub tip_height: u64,
    pub blocks: Vec<BlockSummary>,
    pub prev_page: Option<u64>,
    pub next_page: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionSummary {
    pub txid: String,
    pub time: Option<DateTime<Utc>>,
    pub total_output: Decimal,
    pub size: u64,
    pub confirmations: Option<u64>,
    pub input_count: usize,
    pub output_count: usize,
    /// Rounded to eight places; `None` if an input could not be resolved.
    pub fee_per_byte: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MempoolTransaction {
    pub txid: String,
    pub size: u64,
    pub total_output: Decimal,
    pub fee_per_byte: Option<Decimal>,
}

pub struct LiveExplorer {
    node: Arc<dyn NodeRpc>,
    settings: ExplorerSettings,
}

impl LiveExplorer {
    pub fn new(node: Arc<dyn NodeRpc>, settings: ExplorerSettings) -> Self {
        Self { node, settings }
    }

    pub async fn block_detail(&self, height: u64) -> Result<BlockDetail> {
        let block = self.node.get_block_by_height(height).await?;
        let time_to_mine = self.time_to_mine(&block).await?;

        let mut spent = HashMap::new();
        let mut transactions = Vec::with_capacity(block.txids.len());
        let mut total_value = Decimal::ZERO;

        for txid in &block.txids {
            let tx = self.node.get_transaction(txid).await?;
            let inputs = self.resolve_inputs(&tx, &mut spent).await?;
            let total_output = total_output_value(&tx);
            total_value += total_output;

            let (fee, reward) = if tx.is_coinbase() {
                let fee = transaction_fee(&tx, &[]);
                (Some(fee.fee), fee.reward)
            } else {
                let fee = resolved_input_values(&inputs).map(|values| transaction_fee(&tx, &values).fee);
                (fee, Decimal::ZERO)
            };

            transactions.push(TransactionFeeSummary {
                txid: tx.txid.clone(),
                is_coinbase: tx.is_coinbase(),
                total_output,
                fee,
                reward,
            });
            spent.insert(tx.txid.clone(), tx);
        }

        attribute_fees_to_coinbase(&mut transactions);

        Ok(BlockDetail {
            height: block.height,
            time: utc(block.time)?,
            hash: block.hash,
            confirmations: block.confirmations,
            time_to_mine,
            difficulty: block.difficulty,
            size: block.size,
            merkle_root: block.merkle_root,
            previous_hash: block.previous_hash,
            next_hash: block.next_hash,
            total_value,
            transactions,
        })
    }

    pub async fn transaction_detail(&self, txid: &str) -> Result<TransactionDetail> {
        let tx = self.node.get_transaction(txid).await?;
        let block_height = match &tx.block_hash {
            Some(hash) => Some(self.node.get_block(hash).await?.height),
            None => None,
        };

        let resolved = self.resolve_inputs(&tx, &mut HashMap::new()).await?;
        let reward = tx.vout.first().map(|output| output.value);
        let inputs = resolved
            .iter()
            .map(|input| match input {
                ResolvedInput::Coinbase => InputDetail {
                    is_coinbase: true,
                    prev_txid: None,
                    vout: None,
                    value: reward,
                    address: None,
                },
                ResolvedInput::Spent { prev_txid, vout, value, .. } => InputDetail {
                    is_coinbase: false,
                    prev_txid: Some(prev_txid.clone()),
                    vout: Some(*vout),
                    value: Some(*value),
                    address: input.first_address().map(str::to_string),
                },
                ResolvedInput::Unresolved { prev_txid, vout } => InputDetail {
                    is_coinbase: false,
                    prev_txid: Some(prev_txid.clone()),
                    vout: Some(*vout),
                    value: None,
                    address: None,
                },
            })
            .collect();

        let outputs = tx
            .vout
            .iter()
            .map(|output| OutputDetail {
                n: output.n,
                value: output.value,
                addresses: output.addresses().into_iter().flatten().cloned().collect(),
            })
            .collect();

        let total_output = total_output_value(&tx);
        let (total_input, fee) = if tx.is_coinbase() {
            (None, Some(Decimal::ZERO))
        } else {
            match resolved_input_values(&resolved) {
                Some(values) => {
                    let fee = transaction_fee(&tx, &values).fee;
                    (Some(values.iter().sum()), Some(fee))
                }
                None => (None, None),
            }
        };

        Ok(TransactionDetail {
            block_height,
            block_hash: tx.block_hash.clone(),
            confirmations: tx.confirmations,
            time: tx.time.map(utc).transpose()?,
            size: tx.size,
            is_coinbase: tx.is_coinbase(),
            inputs,
            outputs,
            total_input,
            total_output,
            fee_per_byte: fee.map(|fee| fee_per_byte(fee, tx.size)),
            fee,
            txid: tx.txid,
        })
    }

    /// Blocks from the tip downward, `blocks_per_page` per page, page 1 first.
    pub async fn latest_blocks(&self, page: u64) -> Result<BlockPage> {
        if page == 0 {
            return Err(ExplorerError::InvalidArgument("page starts at 1".to_string()));
        }
        let per_page = self.settings.blocks_per_page.max(1);
        let tip_height = self.node.get_chain_tip_height().await?;

        let skipped = (page - 1).saturating_mul(per_page);
        let mut blocks = Vec::new();
        let mut lowest = None;

        if skipped <= tip_height {
            let start = tip_height - skipped;
            let end = start.saturating_sub(per_page - 1);
            for height in (end..=start).rev() {
                let block = self.node.get_block_by_height(height).await?;
                blocks.push(self.summarize(block).await?);
            }
            lowest = Some(end);
        }

        Ok(BlockPage {
            page,
            tip_height,
            blocks,
            prev_page: (page > 1).then(|| page - 1),
            next_page: lowest.filter(|&end| end > 0).map(|_| page + 1),
        })
    }

    /// Every transaction in the last `recent_block_count` blocks, newest first.
    pub async fn recent_transactions(&self) -> Result<Vec<TransactionSummary>> {
        let tip_height = self.node.get_chain_tip_height().await?;
        let lowest = (tip_height + 1).saturating_sub(self.settings.recent_block_count);

        let mut summaries = Vec::new();
        for height in (lowest..=tip_height).rev() {
            let block = self.node.get_block_by_height(height).await?;
            for txid in &block.txids {
                let tx = self.node.get_transaction(txid).await?;
                let fee = self.fee_of(&tx).await?;
                summaries.push(TransactionSummary {
                    time: tx.time.map(utc).transpose()?,
                    total_output: total_output_value(&tx),
                    size: tx.size,
                    confirmations: tx.confirmations,
                    input_count: tx.vin.len(),
                    output_count: tx.vout.len(),
                    fee_per_byte: fee.map(|fee| fee_per_byte(fee, tx.size).round_dp(FEE_RATE_SCALE)),
                    txid: tx.txid,
                });
            }
        }
        Ok(summaries)
    }

    /// The first `mempool_limit` transactions the node reports as unconfirmed.
    pub async fn mempool_transactions(&self) -> Result<Vec<MempoolTransaction>> {
        let txids = self.node.get_mempool_txids().await?;

        let mut transactions = Vec::new();
        for txid in txids.iter().take(self.settings.mempool_limit) {
            let tx = match self.node.get_transaction(txid).await {
                Ok(tx) => tx,
                Err(e) if e.is_not_found() => {
                    // Mined or evicted since the mempool listing.
                    warn!("Mempool transaction {} disappeared: {}", txid, e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let fee = self.fee_of(&tx).await?;
            transactions.push(MempoolTransaction {
                size: tx.size,
                total_output: total_output_value(&tx),
                fee_per_byte: fee.map(|fee| fee_per_byte(fee, tx.size).round_dp(FEE_RATE_SCALE)),
                txid: tx.txid,
            });
        }
        Ok(transactions)
    }

    async fn summarize(&self, block: Block) -> Result<BlockSummary> {
        let time_to_mine = self.time_to_mine(&block).await?;
        let mut total_value = Decimal::ZERO;
        for txid in &block.txids {
            total_value += total_output_value(&self.node.get_transaction(txid).await?);
        }

        Ok(BlockSummary {
            height: block.height,
            time: utc(block.time)?,
            hash: block.hash,
            time_to_mine,
            difficulty: block.difficulty,
            transaction_count: block.txids.len(),
            size: block.size,
            total_value,
        })
    }

    async fn time_to_mine(&self, block: &Block) -> Result<i64> {
        let previous = match &block.previous_hash {
            Some(hash) => Some(self.node.get_block(hash).await?),
            None => None,
        };
        Ok(time_to_mine(block, previous.as_ref()))
    }

    /// Fee of `tx`, zero for a coinbase and `None` when an input is unresolvable.
    async fn fee_of(&self, tx: &Transaction) -> Result<Option<Decimal>> {
        if tx.is_coinbase() {
            return Ok(Some(Decimal::ZERO));
        }
        let inputs = self.resolve_inputs(tx, &mut HashMap::new()).await?;
        Ok(resolved_input_values(&inputs).map(|values| transaction_fee(tx, &values).fee))
    }

    /// Resolve every input of `tx`, fetching spent transactions not yet in `spent`.
    async fn resolve_inputs(
        &self,
        tx: &Transaction,
        spent: &mut HashMap<String, Transaction>,
    ) -> Result<Vec<ResolvedInput>> {
        for (prev_txid, _) in tx.spent_outpoints() {
            if spent.contains_key(prev_txid) {
                continue;
            }
            match self.node.get_transaction(prev_txid).await {
                Ok(prev) => {
                    spent.insert(prev_txid.to_string(), prev);
                }
                Err(e) if e.is_not_found() => {
                    warn!("Previous transaction {} of {} not found", prev_txid, tx.txid);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(tx
            .vin
            .iter()
            .map(|input| {
                let previous = match input {
                    TxInput::Regular { txid, .. } => spent.get(txid),
                    TxInput::Coinbase { .. } => None,
                };
                resolve_input(input, previous)
            })
            .collect())
    }
}

fn utc(timestamp: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(timestamp, 0).single().ok_or_else(|| {
        ExplorerError::Rpc(RpcError::Decode(format!("timestamp {} out of range", timestamp)))
    })
}
