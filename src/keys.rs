//! Conversion from ledger signing keys to transport key-agreement keys.
//!
//! Validators publish an Ed25519 verification key. The encrypted transport
//! speaks x25519, so the verification key is mapped to its Curve25519
//! counterpart through the birational map `u = (1 + y) / (1 - y)` between
//! the two forms of the same curve.

use curve25519_dalek::edwards::CompressedEdwardsY;
use thiserror::Error;

/// Errors converting a verification key to a key-agreement key.
#[derive(Debug, Error)]
pub enum KeyConversionError {
    #[error("Verification key must be 32 bytes, got {0}")]
    Length(usize),
    #[error("Verification key is not a valid curve point")]
    NotOnCurve,
}

/// Convert an Ed25519 verification key to the x25519 public key usable for
/// the transport handshake.
///
/// The input is the standard Ed25519 encoding: the little-endian
/// y-coordinate with the sign of x in the top bit. The output is the
/// 32-byte little-endian Montgomery u-coordinate of the same point.
///
/// Inputs that are not 32 bytes or do not decode to a curve point are
/// rejected. A wrong key here would only ever surface as an opaque
/// handshake failure against the validator, so this never falls back to a
/// zero or unconverted key.
pub fn verification_to_agreement(verkey: &[u8]) -> Result<[u8; 32], KeyConversionError> {
    let bytes: [u8; 32] = verkey
        .try_into()
        .map_err(|_| KeyConversionError::Length(verkey.len()))?;

    let point = CompressedEdwardsY(bytes)
        .decompress()
        .ok_or(KeyConversionError::NotOnCurve)?;

    Ok(point.to_montgomery().to_bytes())
}
