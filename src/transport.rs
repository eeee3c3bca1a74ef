//! Encrypted message transport to a single validator.
//!
//! Frames are length-delimited over TCP. The first frame a client sends
//! carries its ephemeral x25519 public key; both sides derive a pair of
//! per-direction AES-256-GCM keys from the Diffie-Hellman shared secret
//! and seal every subsequent frame, using a per-direction message counter
//! as the nonce. Only the holder of the validator's key-agreement secret
//! can read the client's traffic or produce frames the client accepts.

use std::time::Duration;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use futures_util::{SinkExt, StreamExt};
use hkdf::Hkdf;
use rand_core::OsRng;
use sha2::Sha256;
use tokio::net::TcpStream;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

const MAX_FRAME: usize = 8 * 1024 * 1024;

const KEY_LABEL_C2S: &[u8] = b"teller.session.c2s";
const KEY_LABEL_S2C: &[u8] = b"teller.session.s2c";

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(std::io::Error),
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("Handshake failed: {0}")]
    Handshake(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection closed by peer")]
    Closed,
    #[error("Frame failed authentication")]
    Crypto,
}

/// An established encrypted channel.
///
/// Send and receive are sequenced by the caller; the per-direction nonce
/// counters assume frames are produced and consumed in order by one task
/// at a time.
pub struct EncryptedStream {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
    seal: Aes256Gcm,
    seal_counter: u64,
    open: Aes256Gcm,
    open_counter: u64,
}

impl EncryptedStream {
    /// Connect to a validator and complete the client half of the
    /// handshake, all within `timeout`.
    ///
    /// `validator_key` is the validator's x25519 public key, derived from
    /// its published verification key. A fresh ephemeral keypair is
    /// generated per connection and never reused.
    pub async fn connect(
        addr: &str,
        validator_key: [u8; 32],
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        tokio::time::timeout(timeout, Self::connect_inner(addr, validator_key))
            .await
            .map_err(|_| TransportError::ConnectTimeout(timeout))?
    }

    async fn connect_inner(addr: &str, validator_key: [u8; 32]) -> Result<Self, TransportError> {
        debug!(validator = %addr, "Connecting to validator");
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::Connect)?;
        stream.set_nodelay(true).map_err(TransportError::Connect)?;
        let mut framed = Framed::new(stream, codec());

        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        framed
            .send(Bytes::copy_from_slice(public.as_bytes()))
            .await?;

        let server_key = PublicKey::from(validator_key);
        let shared = secret.diffie_hellman(&server_key);
        if !shared.was_contributory() {
            return Err(TransportError::Handshake("degenerate shared secret"));
        }

        let (c2s, s2c) = derive_keys(shared.as_bytes(), public.as_bytes(), server_key.as_bytes());
        Ok(Self {
            framed,
            seal: c2s,
            seal_counter: 0,
            open: s2c,
            open_counter: 0,
        })
    }

    /// Complete the validator half of the handshake on an accepted socket.
    ///
    /// `secret` is the x25519 secret matching the key clients derive from
    /// this validator's published verification key.
    pub async fn accept(stream: TcpStream, secret: &StaticSecret) -> Result<Self, TransportError> {
        stream.set_nodelay(true)?;
        let mut framed = Framed::new(stream, codec());

        let frame = framed.next().await.ok_or(TransportError::Closed)??;
        let client_key: [u8; 32] = frame
            .as_ref()
            .try_into()
            .map_err(|_| TransportError::Handshake("ephemeral key frame must be 32 bytes"))?;
        let client_key = PublicKey::from(client_key);

        let shared = secret.diffie_hellman(&client_key);
        if !shared.was_contributory() {
            return Err(TransportError::Handshake("degenerate shared secret"));
        }

        let server_key = PublicKey::from(secret);
        let (c2s, s2c) = derive_keys(
            shared.as_bytes(),
            client_key.as_bytes(),
            server_key.as_bytes(),
        );
        Ok(Self {
            framed,
            seal: s2c,
            seal_counter: 0,
            open: c2s,
            open_counter: 0,
        })
    }

    /// Seal and send one message.
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let nonce = counter_nonce(self.seal_counter);
        self.seal_counter += 1;

        let sealed = self
            .seal
            .encrypt(Nonce::from_slice(&nonce), payload)
            .map_err(|_| TransportError::Crypto)?;
        self.framed.send(Bytes::from(sealed)).await?;
        Ok(())
    }

    /// Receive and open one message, blocking until a frame arrives.
    pub async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        let frame = self.framed.next().await.ok_or(TransportError::Closed)??;

        let nonce = counter_nonce(self.open_counter);
        self.open_counter += 1;

        self.open
            .decrypt(Nonce::from_slice(&nonce), frame.as_ref())
            .map_err(|_| TransportError::Crypto)
    }
}

impl std::fmt::Debug for EncryptedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedStream").finish()
    }
}

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME)
        .new_codec()
}

/// Expand the shared secret into (client→server, server→client) keys.
///
/// Salted with both public keys, so sessions against different validators
/// derive distinct keys even from related secrets.
fn derive_keys(
    shared: &[u8],
    client_public: &[u8; 32],
    server_public: &[u8; 32],
) -> (Aes256Gcm, Aes256Gcm) {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(client_public);
    salt[32..].copy_from_slice(server_public);

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut c2s = [0u8; 32];
    let mut s2c = [0u8; 32];
    hk.expand(KEY_LABEL_C2S, &mut c2s)
        .expect("32 bytes is a valid hkdf-sha256 output length");
    hk.expand(KEY_LABEL_S2C, &mut s2c)
        .expect("32 bytes is a valid hkdf-sha256 output length");

    (Aes256Gcm::new(&c2s.into()), Aes256Gcm::new(&s2c.into()))
}

fn counter_nonce(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..8].copy_from_slice(&counter.to_le_bytes());
    nonce
}
