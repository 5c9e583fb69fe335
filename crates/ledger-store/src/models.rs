//! Data models for the ledger store

use crate::error::{Result, StoreError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decimal places stored per coin.
pub const BASE_UNIT_SCALE: u32 = 8;

const BASE_UNITS_PER_COIN: i64 = 100_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Received,
    Sent,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Received => "received",
            Direction::Sent => "sent",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "received" => Ok(Direction::Received),
            "sent" => Ok(Direction::Sent),
            other => Err(StoreError::Corrupt(format!("unknown direction '{}'", other))),
        }
    }
}

/// One directional money movement tied to an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub address: String,
    pub txid: String,
    pub value: Decimal,
    pub direction: Direction,
    pub block_height: u64,
}

impl LedgerEntry {
    pub fn received(address: impl Into<String>, txid: impl Into<String>, value: Decimal, block_height: u64) -> Self {
        Self {
            address: address.into(),
            txid: txid.into(),
            value,
            direction: Direction::Received,
            block_height,
        }
    }

    pub fn sent(address: impl Into<String>, txid: impl Into<String>, value: Decimal, block_height: u64) -> Self {
        Self {
            address: address.into(),
            txid: txid.into(),
            value,
            direction: Direction::Sent,
            block_height,
        }
    }
}

/// Aggregate sums for one address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceTotals {
    pub received: Decimal,
    pub sent: Decimal,
}

impl BalanceTotals {
    pub fn balance(&self) -> Decimal {
        self.received - self.sent
    }
}

/// Movements of one direction within one transaction, summed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub txid: String,
    pub direction: Direction,
    pub value: Decimal,
    pub block_height: u64,
}

/// A page of [`HistoryRow`]s with the address's distinct-transaction count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub rows: Vec<HistoryRow>,
    pub total_txids: u64,
}

/// Convert a coin amount to integer base units, rounding past the eighth place.
pub fn to_base_units(value: Decimal) -> Result<i64> {
    value
        .checked_mul(Decimal::from(BASE_UNITS_PER_COIN))
        .and_then(|units| units.round().to_i64())
        .ok_or(StoreError::ValueOutOfRange(value))
}

pub fn from_base_units(units: i64) -> Decimal {
    Decimal::new(units, BASE_UNIT_SCALE)
}
