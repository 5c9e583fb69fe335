//! Typed views of the node's verbose block and transaction payloads

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A block as returned by `getblock <hash>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub hash: String,
    pub height: u64,
    #[serde(default)]
    pub confirmations: i64,
    pub time: i64,
    pub difficulty: f64,
    pub size: u64,
    #[serde(rename = "merkleroot")]
    pub merkle_root: String,
    #[serde(rename = "previousblockhash", default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    #[serde(rename = "nextblockhash", default, skip_serializing_if = "Option::is_none")]
    pub next_hash: Option<String>,
    #[serde(rename = "tx")]
    pub txids: Vec<String>,
}

/// A transaction as returned by `getrawtransaction <txid> 1`.
///
/// Mempool transactions carry no `time`, `confirmations` or `blockhash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    pub vin: Vec<TxInput>,
    pub vout: Vec<TxOutput>,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
    #[serde(rename = "blockhash", default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
}

impl Transaction {
    /// A coinbase transaction has a single input that mints new value.
    pub fn is_coinbase(&self) -> bool {
        matches!(self.vin.first(), Some(TxInput::Coinbase { .. }))
    }

    /// Inputs that spend a previous output.
    pub fn spent_outpoints(&self) -> impl Iterator<Item = (&str, u32)> {
        self.vin.iter().filter_map(|input| match input {
            TxInput::Regular { txid, vout } => Some((txid.as_str(), *vout)),
            TxInput::Coinbase { .. } => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TxInput {
    Coinbase { coinbase: String },
    Regular { txid: String, vout: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTxOutput", into = "RawTxOutput")]
pub struct TxOutput {
    pub value: Decimal,
    pub n: u32,
    pub destination: OutputDestination,
}

impl TxOutput {
    pub fn addresses(&self) -> Option<&BTreeSet<String>> {
        match &self.destination {
            OutputDestination::Addresses(addresses) => Some(addresses),
            OutputDestination::NoAddress => None,
        }
    }
}

/// Where an output's value goes, as far as the node can decode it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDestination {
    Addresses(BTreeSet<String>),
    /// Nonstandard, data-carrier or bare-multisig scripts.
    NoAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawTxOutput {
    value: Decimal,
    #[serde(default)]
    n: u32,
    #[serde(rename = "scriptPubKey", default)]
    script_pub_key: RawScriptPubKey,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawScriptPubKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    addresses: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    address: Option<String>,
}

impl From<RawTxOutput> for TxOutput {
    fn from(raw: RawTxOutput) -> Self {
        // Newer nodes report a single `address`, older ones an `addresses` list.
        let addresses: BTreeSet<String> = raw
            .script_pub_key
            .addresses
            .into_iter()
            .flatten()
            .chain(raw.script_pub_key.address)
            .filter(|address| !address.is_empty())
            .collect();

        let destination = if addresses.is_empty() {
            OutputDestination::NoAddress
        } else {
            OutputDestination::Addresses(addresses)
        };

        Self {
            value: raw.value,
            n: raw.n,
            destination,
        }
    }
}

impl From<TxOutput> for RawTxOutput {
    fn from(output: TxOutput) -> Self {
        let addresses = match output.destination {
            OutputDestination::Addresses(addresses) => Some(addresses.into_iter().collect()),
            OutputDestination::NoAddress => None,
        };
        Self {
            value: output.value,
            n: output.n,
            script_pub_key: RawScriptPubKey {
                addresses,
                address: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_deserialize() {
        let block: Block = serde_json::from_value(json!({
            "hash": "00000000a1",
            "confirmations": 3,
            "size": 215,
            "height": 12,
            "version": 1,
            "merkleroot": "4a5e1e",
            "tx": ["c0ffee"],
            "time": 1386325540,
            "nonce": 99943,
            "bits": "1e0ffff0",
            "difficulty": 0.000244140625,
            "previousblockhash": "00000000a0"
        }))
        .unwrap();

        assert_eq!(block.height, 12);
        assert_eq!(block.merkle_root, "4a5e1e");
        assert_eq!(block.previous_hash.as_deref(), Some("00000000a0"));
        assert_eq!(block.next_hash, None);
        assert_eq!(block.txids, vec!["c0ffee".to_string()]);
    }

    #[test]
    fn test_transaction_inputs_and_outputs() {
        let tx: Transaction = serde_json::from_value(json!({
            "txid": "bb",
            "size": 225,
            "vin": [
                {"txid": "aa", "vout": 1, "scriptSig": {"asm": "", "hex": ""}, "sequence": 4294967295u64}
            ],
            "vout": [
                {"value": 12.5, "n": 0, "scriptPubKey": {"type": "pubkeyhash", "addresses": ["NAddrOne"]}},
                {"value": 0.25, "n": 1, "scriptPubKey": {"type": "pubkeyhash", "address": "NAddrTwo"}},
                {"value": 0, "n": 2, "scriptPubKey": {"type": "nulldata"}}
            ],
            "blockhash": "00000000a1",
            "confirmations": 4,
            "time": 1386325540
        }))
        .unwrap();

        assert!(!tx.is_coinbase());
        assert_eq!(tx.spent_outpoints().collect::<Vec<_>>(), vec![("aa", 1)]);
        assert_eq!(tx.vout[0].value, Decimal::new(125, 1));
        assert!(tx.vout[0].addresses().unwrap().contains("NAddrOne"));
        assert!(tx.vout[1].addresses().unwrap().contains("NAddrTwo"));
        assert_eq!(tx.vout[2].destination, OutputDestination::NoAddress);
    }

    #[test]
    fn test_coinbase_and_mempool_shape() {
        let tx: Transaction = serde_json::from_value(json!({
            "txid": "cb",
            "size": 120,
            "vin": [{"coinbase": "04ffff001d0104", "sequence": 4294967295u64}],
            "vout": [{"value": 50.0, "n": 0, "scriptPubKey": {"addresses": ["NMiner"]}}]
        }))
        .unwrap();

        assert!(tx.is_coinbase());
        assert_eq!(tx.spent_outpoints().count(), 0);
        assert_eq!(tx.time, None);
        assert_eq!(tx.confirmations, None);
        assert_eq!(tx.block_hash, None);
    }
}
