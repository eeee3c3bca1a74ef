//! Wire protocol types for the validator read protocol.
//!
//! Requests and replies are JSON objects, one per sealed transport frame.
//! Every request carries a process-unique correlation id issued by
//! [`RequestIdSource`]; the validator answers with two frames, an
//! acknowledgement (`op = "REQACK"`) and a terminal reply.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Identifier sent in lieu of a signing identity (reads are unsigned).
pub const CLIENT_IDENTIFIER: &str = "Ru5tLedgerC1ient111111";

/// Protocol version spoken by this client.
pub const PROTOCOL_VERSION: u32 = 2;

/// Operation type tag for a transaction lookup.
pub const GET_TXN: &str = "3";

/// Acknowledgement tag expected in the first reply frame.
pub const OP_REQACK: &str = "REQACK";

/// Tag carried by a terminal reply with a result.
pub const OP_REPLY: &str = "REPLY";

/// A broken request/reply invariant.
///
/// Always fatal for the connection that produced it: once the reply
/// sequence is off, the framing state cannot be trusted for further
/// requests.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Reply answers another request: expected reqId {expected}, got {got}")]
    CorrelationMismatch { expected: u32, got: u32 },
    #[error("Unexpected reply op: {0}")]
    UnexpectedOp(String),
    #[error("Malformed reply: {0}")]
    MalformedReply(#[from] serde_json::Error),
}

// ============================================================================
// Ledgers
// ============================================================================

/// Integer id of one of the validator-replicated ledgers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(pub i32);

impl LedgerId {
    /// The pool ledger (validator membership).
    pub const POOL: LedgerId = LedgerId(0);
    /// The domain ledger (application transactions).
    pub const DOMAIN: LedgerId = LedgerId(1);
    /// The config ledger.
    pub const CONFIG: LedgerId = LedgerId(2);
}

// ============================================================================
// Request
// ============================================================================

/// A `getTxn` read request: look up one transaction by sequence number.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTxnRequest {
    pub identifier: &'static str,
    pub operation: GetTxnOperation,
    pub protocol_version: u32,
    pub req_id: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTxnOperation {
    /// Requested transaction sequence number.
    pub data: u64,
    pub ledger_id: i32,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl GetTxnRequest {
    pub fn new(req_id: u32, ledger: LedgerId, seq_no: u64) -> Self {
        Self {
            identifier: CLIENT_IDENTIFIER,
            operation: GetTxnOperation {
                data: seq_no,
                ledger_id: ledger.0,
                kind: GET_TXN,
            },
            protocol_version: PROTOCOL_VERSION,
            req_id,
        }
    }
}

// ============================================================================
// Reply
// ============================================================================

/// One reply frame from a validator.
///
/// Both the acknowledgement and the terminal reply deserialize into this
/// shape; the acknowledgement typically carries no `result`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(default)]
    pub identifier: Option<String>,
    pub op: String,
    pub req_id: u32,
    #[serde(default)]
    pub result: Option<Value>,
}

impl Reply {
    /// The transaction payload of a terminal reply, if one exists.
    ///
    /// Returns `None` when `result.data` is absent or JSON null, which is
    /// how the ledger reports a sequence number past its end.
    pub fn transaction_data(&self) -> Option<&Value> {
        self.result
            .as_ref()?
            .get("data")
            .filter(|data| !data.is_null())
    }
}

// ============================================================================
// Correlation ids
// ============================================================================

/// Issues process-unique, strictly increasing correlation ids.
///
/// Shared by every caller of a [`Pool`](crate::Pool); ids are never reused
/// within a process lifetime. Wraparound past `u32::MAX` is not handled —
/// unreachable at any realistic request volume.
#[derive(Debug)]
pub struct RequestIdSource {
    next: AtomicU32,
}

impl RequestIdSource {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Start the sequence at an arbitrary value (deterministic tests).
    pub fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
        }
    }

    /// Take the next id.
    pub fn next_id(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for RequestIdSource {
    fn default() -> Self {
        Self::new()
    }
}
