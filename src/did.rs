//! Ledger DID strings.
//!
//! Format: `did:sov:<base58-id>`. Only the `sov` method is recognized.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A parsed decentralized identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Did {
    method: String,
    id: String,
}

impl Did {
    /// The DID method (always `sov` for now).
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The method-specific id (base58).
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "did:{}:{}", self.method, self.id)
    }
}

impl FromStr for Did {
    type Err = DidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("did:")
            .ok_or_else(|| DidParseError::NotADid(s.to_string()))?;

        let (method, id) = rest
            .split_once(':')
            .ok_or_else(|| DidParseError::MissingId(s.to_string()))?;

        if method != "sov" {
            return Err(DidParseError::UnsupportedMethod(method.to_string()));
        }
        if id.is_empty() {
            return Err(DidParseError::MissingId(s.to_string()));
        }
        if bs58::decode(id).into_vec().is_err() {
            return Err(DidParseError::InvalidId(id.to_string()));
        }

        Ok(Self {
            method: method.to_string(),
            id: id.to_string(),
        })
    }
}

/// Error parsing a DID string.
#[derive(Debug, Clone, Error)]
pub enum DidParseError {
    #[error("Not a DID: {0}")]
    NotADid(String),
    #[error("DID method is not supported: {0}")]
    UnsupportedMethod(String),
    #[error("DID has no id part: {0}")]
    MissingId(String),
    #[error("DID id is not valid base58: {0}")]
    InvalidId(String),
}
