//! Validator bootstrap from genesis transactions.
//!
//! A genesis file is a stream of newline-delimited JSON ledger blocks.
//! Node-registration blocks contribute one validator each; every other
//! transaction type is skipped. A handful of corrupt lines must not
//! prevent bootstrapping from the remaining valid ones, so malformed
//! entries are logged and dropped instead of failing the load.

use std::io::BufRead;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Transaction type tag of a node registration.
const NODE_TXN: &str = "0";

/// A validator identity from the genesis ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    pub alias: String,
    /// Base58-encoded Ed25519 verification key.
    pub verkey: String,
    /// Client-facing `host:port` endpoint.
    pub address: String,
}

/// Errors reading a genesis stream.
///
/// Malformed entries are not errors — only the underlying reader failing is.
#[derive(Debug, Error)]
pub enum GenesisError {
    #[error("Failed to read genesis stream: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct Block {
    txn: Txn,
}

#[derive(Debug, Deserialize)]
struct Txn {
    data: TxnData,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct TxnData {
    data: Value,
    dest: String,
}

#[derive(Debug, Deserialize)]
struct NodeRecord {
    alias: String,
    client_ip: String,
    client_port: Port,
}

/// Port field as found in the wild: sometimes a number, sometimes a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Port {
    Number(u16),
    Text(String),
}

impl Port {
    fn to_u16(&self) -> Option<u16> {
        match self {
            Port::Number(n) => Some(*n),
            Port::Text(s) => s.parse().ok(),
        }
    }
}

/// Load the validator list from a genesis transaction stream.
///
/// Reads until end-of-input. An empty stream yields an empty list; the
/// caller decides whether that is acceptable.
pub fn load(reader: impl BufRead) -> Result<Vec<Validator>, GenesisError> {
    let mut validators = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let block: Block = match serde_json::from_str(&line) {
            Ok(block) => block,
            Err(error) => {
                warn!(line = line_no + 1, %error, "Skipping malformed genesis entry");
                continue;
            }
        };

        if block.txn.kind != NODE_TXN {
            continue;
        }

        let node: NodeRecord = match serde_json::from_value(block.txn.data.data) {
            Ok(node) => node,
            Err(error) => {
                warn!(line = line_no + 1, %error, "Skipping malformed node record");
                continue;
            }
        };

        let Some(port) = node.client_port.to_u16() else {
            warn!(line = line_no + 1, alias = %node.alias, "Skipping node record with unusable client_port");
            continue;
        };

        validators.push(Validator {
            alias: node.alias,
            verkey: block.txn.data.dest,
            address: format!("{}:{}", node.client_ip, port),
        });
    }

    Ok(validators)
}
