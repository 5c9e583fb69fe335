//! Derived metrics: pure functions over node blocks and transactions
//!
//! Nothing here talks to the node or the store. Callers fetch the data,
//! resolve previous outputs, and hand the results in.

use ledger_store::LedgerEntry;
use node_rpc::{Block, OutputDestination, Transaction, TxInput};
use rust_decimal::Decimal;
use serde::Serialize;

/// Seconds between `previous` and `block`; 0 for genesis.
///
/// Node timestamps are not monotonic, so the result may be negative.
pub fn time_to_mine(block: &Block, previous: Option<&Block>) -> i64 {
    previous.map_or(0, |prev| block.time - prev.time)
}

pub fn total_output_value(tx: &Transaction) -> Decimal {
    tx.vout.iter().map(|output| output.value).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TxFee {
    pub fee: Decimal,
    /// Newly minted value; non-zero only for coinbase transactions.
    pub reward: Decimal,
}

/// Fee for `tx` given the values of the outputs its inputs spend.
pub fn transaction_fee(tx: &Transaction, resolved_input_values: &[Decimal]) -> TxFee {
    let outputs = total_output_value(tx);
    if tx.is_coinbase() {
        TxFee {
            fee: Decimal::ZERO,
            reward: outputs,
        }
    } else {
        let inputs: Decimal = resolved_input_values.iter().sum();
        TxFee {
            fee: inputs - outputs,
            reward: Decimal::ZERO,
        }
    }
}

pub fn fee_per_byte(fee: Decimal, size: u64) -> Decimal {
    if size == 0 {
        Decimal::ZERO
    } else {
        fee / Decimal::from(size)
    }
}

/// An input joined with the previous output it spends.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedInput {
    Coinbase,
    Spent {
        prev_txid: String,
        vout: u32,
        value: Decimal,
        destination: OutputDestination,
    },
    /// The previous transaction or output index could not be found.
    Unresolved { prev_txid: String, vout: u32 },
}

impl ResolvedInput {
    pub fn value(&self) -> Option<Decimal> {
        match self {
            ResolvedInput::Spent { value, .. } => Some(*value),
            ResolvedInput::Coinbase | ResolvedInput::Unresolved { .. } => None,
        }
    }

    /// First address of the spent output, if it has one.
    pub fn first_address(&self) -> Option<&str> {
        match self {
            ResolvedInput::Spent {
                destination: OutputDestination::Addresses(addresses),
                ..
            } => addresses.iter().next().map(String::as_str),
            _ => None,
        }
    }
}

/// Look up the output `input` spends inside `previous`, its funding transaction.
pub fn resolve_input(input: &TxInput, previous: Option<&Transaction>) -> ResolvedInput {
    match input {
        TxInput::Coinbase { .. } => ResolvedInput::Coinbase,
        TxInput::Regular { txid, vout } => {
            match previous.and_then(|prev| prev.vout.get(*vout as usize)) {
                Some(output) => ResolvedInput::Spent {
                    prev_txid: txid.clone(),
                    vout: *vout,
                    value: output.value,
                    destination: output.destination.clone(),
                },
                None => ResolvedInput::Unresolved {
                    prev_txid: txid.clone(),
                    vout: *vout,
                },
            }
        }
    }
}

/// Values of every spent output, or `None` if any input is unresolved.
///
/// Coinbase inputs contribute nothing.
pub fn resolved_input_values(inputs: &[ResolvedInput]) -> Option<Vec<Decimal>> {
    inputs
        .iter()
        .filter(|input| !matches!(input, ResolvedInput::Coinbase))
        .map(ResolvedInput::value)
        .collect()
}

/// Credits for every addressed output and debits for every resolved input.
///
/// Outputs without addresses and unresolved inputs yield no entry.
pub fn ledger_entries_for_transaction(
    tx: &Transaction,
    inputs: &[ResolvedInput],
    block_height: u64,
) -> Vec<LedgerEntry> {
    let mut entries = Vec::new();

    for output in &tx.vout {
        for address in output.addresses().into_iter().flatten() {
            entries.push(LedgerEntry::received(address, &tx.txid, output.value, block_height));
        }
    }

    for input in inputs {
        if let ResolvedInput::Spent {
            value,
            destination: OutputDestination::Addresses(addresses),
            ..
        } = input
        {
            for address in addresses {
                entries.push(LedgerEntry::sent(address, &tx.txid, *value, block_height));
            }
        }
    }

    entries
}

/// Fee figures for one transaction of a block, as displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionFeeSummary {
    pub txid: String,
    pub is_coinbase: bool,
    pub total_output: Decimal,
    /// `None` when an input could not be resolved.
    pub fee: Option<Decimal>,
    pub reward: Decimal,
}

/// Show the block's total non-coinbase fees as the coinbase's fee.
///
/// Display only: the coinbase's ledger entries are unaffected. If any fee in
/// the block is unknown, so is the total.
pub fn attribute_fees_to_coinbase(rows: &mut [TransactionFeeSummary]) {
    let total: Option<Decimal> = rows
        .iter()
        .filter(|row| !row.is_coinbase)
        .map(|row| row.fee)
        .sum();

    for row in rows.iter_mut().filter(|row| row.is_coinbase) {
        row.fee = total;
    }
}
