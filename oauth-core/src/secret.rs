//! Hashed credentials for client secrets and resource owner passwords

use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("Unsupported secret encoding: {0}")]
    UnsupportedEncoding(String),
    #[error("Invalid sha256 digest: {0}")]
    InvalidDigest(String),
}

/// SHA-256 digest of a secret.
///
/// Configuration accepts `{noop}plain`, `{sha256}<hex digest>` or a bare plain value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretHash([u8; 32]);

impl SecretHash {
    pub fn from_plain(plain: &str) -> Self {
        Self(Sha256::digest(plain.as_bytes()).into())
    }

    /// Constant-time comparison of `candidate` against the stored digest
    pub fn verify(&self, candidate: &str) -> bool {
        let digest: [u8; 32] = Sha256::digest(candidate.as_bytes()).into();
        self.0[..].ct_eq(&digest[..]).into()
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretHash(**redacted**)")
    }
}

impl FromStr for SecretHash {
    type Err = SecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(plain) = s.strip_prefix("{noop}") {
            return Ok(Self::from_plain(plain));
        }
        if let Some(hex) = s.strip_prefix("{sha256}") {
            return parse_hex_digest(hex).map(Self);
        }
        if s.starts_with('{') {
            let end = s.find('}').map(|i| i + 1).unwrap_or(s.len());
            return Err(SecretError::UnsupportedEncoding(s[..end].to_string()));
        }
        Ok(Self::from_plain(s))
    }
}

fn parse_hex_digest(hex: &str) -> Result<[u8; 32], SecretError> {
    if hex.len() != 64 || !hex.is_ascii() {
        return Err(SecretError::InvalidDigest(format!(
            "expected 64 hex characters, got {}",
            hex.len()
        )));
    }
    let mut digest = [0u8; 32];
    for (i, byte) in digest.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|e| SecretError::InvalidDigest(e.to_string()))?;
    }
    Ok(digest)
}
