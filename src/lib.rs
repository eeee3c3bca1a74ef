//! teller — Async read client for permissioned validator-pool ledgers.
//!
//! Connects to one validator from a genesis-defined pool over an
//! encrypted, message-framed channel and reads ledger transactions with
//! the network's two-phase acknowledgement protocol.
//!
//! # Quick start
//!
//! 1. Load the validator set from a genesis file and build a [`Pool`]
//!    with [`Pool::from_genesis`].
//! 2. Call [`Pool::get_transaction`] with a ledger id and a transaction
//!    sequence number.
//! 3. Stop iterating when [`Reply::transaction_data`] returns `None` —
//!    the ledger has no transaction at that sequence number.

pub mod config;
pub mod did;
pub mod genesis;
pub mod keys;
pub mod protocol;
pub mod transport;

pub use config::PoolConfig;
pub use did::{Did, DidParseError};
pub use genesis::{GenesisError, Validator};
pub use keys::KeyConversionError;
pub use protocol::{LedgerId, ProtocolError, Reply, RequestIdSource};
pub use transport::{EncryptedStream, TransportError};

use std::io::BufRead;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::protocol::{GetTxnRequest, OP_REQACK};

// ============================================================================
// Errors
// ============================================================================

/// Errors returned by pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Genesis contains no validators")]
    NoValidators,
    #[error("Failed to read genesis: {0}")]
    Genesis(#[from] GenesisError),
    #[error("All {attempts} connection attempts failed, last error: {last}")]
    ConnectFailed {
        attempts: usize,
        #[source]
        last: ConnectError,
    },
    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Connection error: {0}")]
    Transport(#[from] TransportError),
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Why a single connection attempt against one validator failed.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Verification key is not valid base58")]
    VerKeyEncoding,
    #[error("Key conversion failed: {0}")]
    Key(#[from] KeyConversionError),
    #[error("{0}")]
    Transport(#[from] TransportError),
}

// ============================================================================
// Pool
// ============================================================================

/// A client for a pool of equally-trusted validators.
///
/// Holds at most one live encrypted connection, established lazily on the
/// first request and reused afterwards. Connection failures rotate through
/// the validator list in genesis order, up to the configured attempt
/// budget. Requests are serialized: the two-frame reply sequence must be
/// consumed in full before the connection serves the next request, so the
/// connection state lives behind a mutex held across the whole exchange.
pub struct Pool {
    config: PoolConfig,
    conn: Mutex<ConnState>,
    req_ids: RequestIdSource,
    validators: Vec<Validator>,
}

struct ConnState {
    active: Option<EncryptedStream>,
    next_validator: usize,
}

impl Pool {
    /// Create a pool from an already-loaded validator list.
    pub fn new(validators: Vec<Validator>, config: PoolConfig) -> Result<Self, PoolError> {
        if validators.is_empty() {
            return Err(PoolError::NoValidators);
        }
        Ok(Self {
            config,
            conn: Mutex::new(ConnState {
                active: None,
                next_validator: 0,
            }),
            req_ids: RequestIdSource::new(),
            validators,
        })
    }

    /// Create a pool from a genesis transaction stream.
    pub fn from_genesis(reader: impl BufRead, config: PoolConfig) -> Result<Self, PoolError> {
        let validators = genesis::load(reader)?;
        Self::new(validators, config)
    }

    /// The validator set, in genesis (= failover rotation) order.
    pub fn validators(&self) -> &[Validator] {
        &self.validators
    }

    /// Read one transaction from `ledger` by sequence number.
    ///
    /// Sends a `getTxn` request and consumes the mandated two-frame reply
    /// sequence: an acknowledgement correlated to this request, then the
    /// terminal reply, which is returned as-is. A terminal reply whose
    /// `result.data` is null is a successful call — the ledger simply has
    /// no transaction at `seq_no`; use [`Reply::transaction_data`].
    ///
    /// Any transport or protocol failure mid-exchange discards the cached
    /// connection and is fatal for this call; the next call starts the
    /// failover loop over with a fresh connection.
    pub async fn get_transaction(&self, ledger: LedgerId, seq_no: u64) -> Result<Reply, PoolError> {
        let request = GetTxnRequest::new(self.req_ids.next_id(), ledger, seq_no);
        let payload = serde_json::to_vec(&request).map_err(PoolError::Encode)?;

        let mut conn = self.conn.lock().await;
        self.ensure_connection(&mut conn).await?;
        let stream = conn
            .active
            .as_mut()
            .expect("ensure_connection leaves an active stream");

        match exchange(stream, request.req_id, &payload).await {
            Ok(reply) => Ok(reply),
            Err(error) => {
                // The framing state is no longer trustworthy.
                conn.active = None;
                Err(error)
            }
        }
    }

    /// Return early if a connection is already live; otherwise run the
    /// failover loop until one is established or the budget is spent.
    async fn ensure_connection(&self, conn: &mut ConnState) -> Result<(), PoolError> {
        if conn.active.is_some() {
            return Ok(());
        }

        let timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let attempts = self.config.max_connect_attempts.max(1);
        let mut last = None;

        for attempt in 1..=attempts {
            let validator = &self.validators[conn.next_validator];
            conn.next_validator = (conn.next_validator + 1) % self.validators.len();

            match open_connection(validator, timeout).await {
                Ok(stream) => {
                    debug!(validator = %validator.alias, attempt, "Connected to validator");
                    conn.active = Some(stream);
                    return Ok(());
                }
                Err(error) => {
                    warn!(validator = %validator.alias, attempt, %error, "Connection attempt failed");
                    last = Some(error);
                }
            }
        }

        warn!(attempts, "Failed to connect to any validator");
        Err(PoolError::ConnectFailed {
            attempts,
            last: last.expect("the loop ran at least once"),
        })
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("validators", &self.validators.len())
            .finish()
    }
}

/// One connection attempt: derive the validator's transport key from its
/// published verification key and run the encrypted handshake.
async fn open_connection(
    validator: &Validator,
    timeout: Duration,
) -> Result<EncryptedStream, ConnectError> {
    let verkey = bs58::decode(&validator.verkey)
        .into_vec()
        .map_err(|_| ConnectError::VerKeyEncoding)?;
    let transport_key = keys::verification_to_agreement(&verkey)?;

    Ok(EncryptedStream::connect(&validator.address, transport_key, timeout).await?)
}

/// Send one request and consume its two-frame reply sequence.
async fn exchange(
    stream: &mut EncryptedStream,
    req_id: u32,
    payload: &[u8],
) -> Result<Reply, PoolError> {
    stream.send(payload).await?;

    let frame = stream.recv().await?;
    let ack: Reply = serde_json::from_slice(&frame).map_err(ProtocolError::MalformedReply)?;
    if ack.req_id != req_id {
        return Err(ProtocolError::CorrelationMismatch {
            expected: req_id,
            got: ack.req_id,
        }
        .into());
    }
    if ack.op != OP_REQACK {
        return Err(ProtocolError::UnexpectedOp(ack.op).into());
    }

    let frame = stream.recv().await?;
    let reply: Reply = serde_json::from_slice(&frame).map_err(ProtocolError::MalformedReply)?;
    Ok(reply)
}
