//! Read side: balances and histories from the ledger, search classification from the node

use crate::config::ExplorerSettings;
use crate::error::{ExplorerError, Result};
use ledger_store::{HistoryRow, LedgerStore};
use node_rpc::{NodeRpc, RpcError};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressBalance {
    pub address: String,
    pub received: Decimal,
    pub sent: Decimal,
    pub balance: Decimal,
}

/// One page of an address's history, newest block first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressHistory {
    pub address: String,
    pub entries: Vec<HistoryRow>,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub has_prev: bool,
    pub has_next: bool,
}

/// What a free-text search resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchResult {
    Block { height: u64 },
    Transaction { txid: String },
    Address { address: String },
    NotFound,
}

pub struct QueryService {
    node: Arc<dyn NodeRpc>,
    store: Arc<dyn LedgerStore>,
    settings: ExplorerSettings,
}

impl QueryService {
    pub fn new(node: Arc<dyn NodeRpc>, store: Arc<dyn LedgerStore>, settings: ExplorerSettings) -> Self {
        Self { node, store, settings }
    }

    pub fn settings(&self) -> &ExplorerSettings {
        &self.settings
    }

    pub async fn balance(&self, address: &str) -> Result<AddressBalance> {
        let totals = self.store.query_balance(address).await?;
        Ok(AddressBalance {
            address: address.to_string(),
            received: totals.received,
            sent: totals.sent,
            balance: totals.balance(),
        })
    }

    /// Page `page` (1-based) of `address`'s history, `page_size` rows per page.
    pub async fn history(&self, address: &str, page: u64, page_size: u64) -> Result<AddressHistory> {
        if page == 0 {
            return Err(ExplorerError::InvalidArgument("page starts at 1".to_string()));
        }
        if page_size == 0 {
            return Err(ExplorerError::InvalidArgument("page size must be positive".to_string()));
        }
        let offset = (page - 1)
            .checked_mul(page_size)
            .ok_or_else(|| ExplorerError::InvalidArgument(format!("page {} is out of range", page)))?;

        let history = self.store.query_history_page(address, offset, page_size).await?;
        let total_pages = history.total_txids.div_ceil(page_size);

        Ok(AddressHistory {
            address: address.to_string(),
            entries: history.rows,
            page,
            page_size,
            total_pages,
            has_prev: page > 1,
            has_next: page < total_pages,
        })
    }

    /// History page using the configured page size.
    pub async fn history_page(&self, address: &str, page: u64) -> Result<AddressHistory> {
        self.history(address, page, self.settings.history_page_size).await
    }

    /// Resolve `query` as a block hash, then a txid, then an address prefix.
    ///
    /// Lookups go to the node, not the ledger. A node that cannot be reached
    /// fails the search instead of reporting `NotFound`.
    pub async fn classify(&self, query: &str) -> Result<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchResult::NotFound);
        }

        match self.node.get_block(query).await {
            Ok(block) => return Ok(SearchResult::Block { height: block.height }),
            Err(e) if lookup_missed(&e) => debug!("'{}' is not a block hash: {}", query, e),
            Err(e) => return Err(e.into()),
        }

        match self.node.get_transaction(query).await {
            Ok(tx) => return Ok(SearchResult::Transaction { txid: tx.txid }),
            Err(e) if lookup_missed(&e) => debug!("'{}' is not a txid: {}", query, e),
            Err(e) => return Err(e.into()),
        }

        if self.settings.looks_like_address(query) {
            return Ok(SearchResult::Address {
                address: query.to_string(),
            });
        }

        Ok(SearchResult::NotFound)
    }
}

/// The node answered, but not with a match.
fn lookup_missed(e: &RpcError) -> bool {
    e.is_not_found() || matches!(e, RpcError::Node { .. })
}
