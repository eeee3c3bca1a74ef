//! Shared test helpers for teller integration tests.
//!
//! Provides mock validators that speak the real encrypted transport and
//! the two-frame reply protocol over localhost TCP.

// Each test binary compiles this module independently and only uses a subset
// of exports, so unused items are expected.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ed25519_dalek::SigningKey;
use rand_core::OsRng;
use serde_json::{json, Value};
use sha2::{Digest, Sha512};
use teller::{EncryptedStream, Validator};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use x25519_dalek::StaticSecret;

// ============================================================================
// Validator identity
// ============================================================================

/// A validator keypair: the published Ed25519 identity plus the x25519
/// secret that matches what clients derive from the verification key.
pub struct ValidatorKeys {
    pub verkey: String,
    pub agreement_secret: StaticSecret,
}

impl ValidatorKeys {
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let verkey = bs58::encode(signing.verifying_key().as_bytes()).into_string();

        // The x25519 counterpart of an Ed25519 secret is the (clamped)
        // lower half of the SHA-512 digest of the seed.
        let digest = Sha512::digest(signing.to_bytes());
        let mut scalar = [0u8; 32];
        scalar.copy_from_slice(&digest[..32]);

        Self {
            verkey,
            agreement_secret: StaticSecret::from(scalar),
        }
    }
}

// ============================================================================
// Scripts — how a mock validator answers each request
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// REQACK then REPLY, echoing the request's correlation id.
    Normal,
    /// The REQACK carries a wrong correlation id.
    WrongAckId,
    /// The first frame is a REPLY instead of a REQACK.
    ReplyFirst,
    /// Well-formed exchange whose terminal `result.data` is null.
    NullData,
    /// Transactions exist up to the given sequence number; reads past it
    /// answer with a null `data`.
    EndAfter(u64),
}

// ============================================================================
// Mock validator
// ============================================================================

/// A mock validator listening on localhost.
pub struct MockValidator {
    pub validator: Validator,
    connections: Arc<AtomicUsize>,
    _handle: JoinHandle<()>,
}

impl MockValidator {
    /// How many TCP connections this validator has accepted.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Spawn a mock validator answering every request per `script`.
pub async fn spawn_validator(alias: &str, script: Script) -> MockValidator {
    let keys = ValidatorKeys::generate();
    spawn_validator_with_keys(alias, keys, script).await
}

pub async fn spawn_validator_with_keys(
    alias: &str,
    keys: ValidatorKeys,
    script: Script,
) -> MockValidator {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let validator = Validator {
        alias: alias.to_string(),
        verkey: keys.verkey.clone(),
        address: format!("127.0.0.1:{}", addr.port()),
    };

    let connections = Arc::new(AtomicUsize::new(0));
    let accepted = Arc::clone(&connections);

    let secret = keys.agreement_secret;
    let handle = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            accepted.fetch_add(1, Ordering::SeqCst);
            let secret = secret.clone();
            tokio::spawn(async move {
                let _ = serve_connection(stream, &secret, script).await;
            });
        }
    });

    MockValidator {
        validator,
        connections,
        _handle: handle,
    }
}

async fn serve_connection(
    stream: TcpStream,
    secret: &StaticSecret,
    script: Script,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut channel = EncryptedStream::accept(stream, secret).await?;

    loop {
        let frame = channel.recv().await?;
        let request: Value = serde_json::from_slice(&frame)?;
        let req_id = request["reqId"].as_u64().unwrap_or(0);
        let seq_no = request["operation"]["data"].as_u64().unwrap_or(0);
        let identifier = request["identifier"].as_str().unwrap_or("").to_string();

        let (ack_id, ack_op) = match script {
            Script::WrongAckId => (req_id + 1, "REQACK"),
            Script::ReplyFirst => (req_id, "REPLY"),
            _ => (req_id, "REQACK"),
        };
        let ack = json!({ "op": ack_op, "reqId": ack_id, "identifier": identifier });
        channel.send(ack.to_string().as_bytes()).await?;

        let data = match script {
            Script::NullData => Value::Null,
            Script::EndAfter(last) if seq_no > last => Value::Null,
            _ => json!({ "txn": { "type": "1" }, "seqNo": seq_no }),
        };
        let reply = json!({
            "op": "REPLY",
            "reqId": req_id,
            "identifier": identifier,
            "result": {
                "identifier": identifier,
                "reqId": req_id,
                "type": "3",
                "data": data,
                "seqNo": seq_no,
            },
        });
        channel.send(reply.to_string().as_bytes()).await?;
    }
}

// ============================================================================
// Port allocation
// ============================================================================

/// Bind to port 0 and return the OS-assigned port.
///
/// The listener is dropped immediately so nothing answers on the port.
/// There's a small race window, but it's fine for tests.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// A validator identity whose address nothing is listening on.
pub fn dead_validator(alias: &str) -> Validator {
    let keys = ValidatorKeys::generate();
    Validator {
        alias: alias.to_string(),
        verkey: keys.verkey,
        address: format!("127.0.0.1:{}", free_port()),
    }
}
