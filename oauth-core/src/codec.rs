//! Compact signed access tokens.
//!
//! Tokens are JWTs signed with Ed25519 (`EdDSA`) or HMAC-SHA256 (`HS256`). The signature
//! always covers the raw `header.claims` text and is checked with the configured key and
//! algorithm before any segment is decoded, so the `alg` header cannot steer verification.

use crate::random;
use crate::scope::ScopeSet;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken as jwt;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Minimum HS256 secret length in bytes
pub const MIN_HMAC_SECRET_LEN: usize = 32;

/// PKCS#8 v1 prefix for an Ed25519 private key; the 32-byte seed follows
const ED25519_PKCS8_PREFIX: [u8; 16] = [
    0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04, 0x20,
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Malformed token: {0}")]
    MalformedToken(String),
    #[error("Token signature is invalid")]
    SignatureInvalid,
    #[error("Token expired at {expired_at}")]
    Expired { expired_at: i64 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid Ed25519 seed: {0}")]
    InvalidSeed(String),
    #[error("Invalid Ed25519 public key: {0}")]
    InvalidPublicKey(String),
    #[error("HS256 secret must be at least {MIN_HMAC_SECRET_LEN} bytes, got {0}")]
    WeakSecret(usize),
    #[error("Key material for {0} is not published")]
    NotPublished(Algorithm),
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Failed to encode token: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "EdDSA")]
    EdDsa,
    #[serde(rename = "HS256")]
    Hs256,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EdDsa => "EdDSA",
            Self::Hs256 => "HS256",
        }
    }

    fn jwt(self) -> jwt::Algorithm {
        match self {
            Self::EdDsa => jwt::Algorithm::EdDSA,
            Self::Hs256 => jwt::Algorithm::HS256,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EDDSA" | "ED25519" => Ok(Self::EdDsa),
            "HS256" => Ok(Self::Hs256),
            _ => Err(KeyError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    /// Username of the resource owner
    pub sub: String,
    pub client_id: String,
    pub scope: ScopeSet,
    #[serde(default)]
    pub authorities: BTreeSet<String>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl AccessTokenClaims {
    /// Claims for a token issued at `iat` that lives for `ttl_seconds`
    pub fn new(
        issuer: impl Into<String>,
        subject: impl Into<String>,
        client_id: impl Into<String>,
        scope: ScopeSet,
        authorities: BTreeSet<String>,
        iat: i64,
        ttl_seconds: i64,
    ) -> Self {
        Self {
            iss: issuer.into(),
            sub: subject.into(),
            client_id: client_id.into(),
            scope,
            authorities,
            iat,
            exp: iat + ttl_seconds,
            jti: random::short_id(),
        }
    }

    pub fn has_scopes(&self, required: &ScopeSet) -> bool {
        required.is_subset(&self.scope)
    }
}

/// Public verification material served by the authorization server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenKey {
    pub alg: Algorithm,
    pub kid: String,
    /// base64url Ed25519 public key; absent for HS256
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Verifies tokens locally, without calling the authorization server
#[derive(Clone)]
pub struct TokenVerifier {
    alg: Algorithm,
    kid: String,
    key: DecodingKey,
    leeway: i64,
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("alg", &self.alg)
            .field("kid", &self.kid)
            .field("leeway", &self.leeway)
            .finish()
    }
}

impl TokenVerifier {
    pub fn ed25519(public_key: &[u8], kid: impl Into<String>) -> Result<Self, KeyError> {
        if public_key.len() != 32 {
            return Err(KeyError::InvalidPublicKey(format!(
                "expected 32 bytes, got {}",
                public_key.len()
            )));
        }
        Ok(Self {
            alg: Algorithm::EdDsa,
            kid: kid.into(),
            // jsonwebtoken hands these bytes to ring as a raw Ed25519 public key
            key: DecodingKey::from_ed_der(public_key),
            leeway: 0,
        })
    }

    pub fn hs256(secret: &[u8], kid: impl Into<String>) -> Result<Self, KeyError> {
        if secret.len() < MIN_HMAC_SECRET_LEN {
            return Err(KeyError::WeakSecret(secret.len()));
        }
        Ok(Self {
            alg: Algorithm::Hs256,
            kid: kid.into(),
            key: DecodingKey::from_secret(secret),
            leeway: 0,
        })
    }

    /// Build a verifier from key material fetched from the authorization server
    pub fn from_token_key(key: &TokenKey) -> Result<Self, KeyError> {
        match (key.alg, key.value.as_deref()) {
            (Algorithm::EdDsa, Some(value)) => {
                let public_key = URL_SAFE_NO_PAD
                    .decode(value)
                    .map_err(|e| KeyError::InvalidPublicKey(e.to_string()))?;
                Self::ed25519(&public_key, key.kid.clone())
            }
            (alg, _) => Err(KeyError::NotPublished(alg)),
        }
    }

    /// Accept tokens up to `seconds` past their expiry to absorb clock skew
    pub fn with_leeway(mut self, seconds: i64) -> Self {
        self.leeway = seconds.max(0);
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.alg
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, VerificationError> {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }

    /// Verify against an explicit clock, in unix seconds
    pub fn verify_at(&self, token: &str, now: i64) -> Result<AccessTokenClaims, VerificationError> {
        let mut segments = token.split('.');
        let (header, payload, signature) = match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() && !s.is_empty() => {
                (h, p, s)
            }
            _ => {
                return Err(VerificationError::MalformedToken(
                    "expected three non-empty segments".to_string(),
                ))
            }
        };

        let signing_input = &token[..header.len() + 1 + payload.len()];
        match jwt::crypto::verify(signature, signing_input.as_bytes(), &self.key, self.alg.jwt()) {
            Ok(true) => {}
            Ok(false) | Err(_) => return Err(VerificationError::SignatureInvalid),
        }

        let decoded = jwt::decode::<AccessTokenClaims>(token, &self.key, &self.decode_only())
            .map_err(|e| VerificationError::MalformedToken(e.to_string()))?;
        if decoded.header.alg != self.alg.jwt() {
            return Err(VerificationError::MalformedToken(format!(
                "token names algorithm {:?}, key is {}",
                decoded.header.alg, self.alg
            )));
        }
        if let Some(kid) = decoded.header.kid.as_deref() {
            if kid != self.kid {
                debug!("Token kid '{}' differs from verifier kid '{}'", kid, self.kid);
            }
        }

        let claims = decoded.claims;
        if now > claims.exp + self.leeway {
            return Err(VerificationError::Expired {
                expired_at: claims.exp,
            });
        }
        Ok(claims)
    }

    /// Decoding rules once the signature has been checked; expiry is checked against our clock
    fn decode_only(&self) -> Validation {
        let mut validation = Validation::new(self.alg.jwt());
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation
    }
}

/// Issues tokens and verifies the ones it issued
pub struct TokenCodec {
    signing_key: EncodingKey,
    public_key: Option<Vec<u8>>,
    verifier: TokenVerifier,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("verifier", &self.verifier)
            .finish()
    }
}

impl TokenCodec {
    /// Ed25519 signer from a 32-byte seed
    pub fn ed25519(seed: &[u8], kid: impl Into<String>) -> Result<Self, KeyError> {
        let key_pair = Ed25519KeyPair::from_seed_unchecked(seed)
            .map_err(|e| KeyError::InvalidSeed(e.to_string()))?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        let verifier = TokenVerifier::ed25519(&public_key, kid)?;

        let mut pkcs8 = Vec::with_capacity(ED25519_PKCS8_PREFIX.len() + seed.len());
        pkcs8.extend_from_slice(&ED25519_PKCS8_PREFIX);
        pkcs8.extend_from_slice(seed);
        Ok(Self {
            signing_key: EncodingKey::from_ed_der(&pkcs8),
            public_key: Some(public_key),
            verifier,
        })
    }

    /// Ed25519 signer with a fresh random key
    pub fn generate_ed25519(kid: impl Into<String>) -> Result<Self, KeyError> {
        let mut seed = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut seed);
        Self::ed25519(&seed, kid)
    }

    pub fn hs256(secret: &[u8], kid: impl Into<String>) -> Result<Self, KeyError> {
        let verifier = TokenVerifier::hs256(secret, kid)?;
        Ok(Self {
            signing_key: EncodingKey::from_secret(secret),
            public_key: None,
            verifier,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.verifier.alg
    }

    pub fn issue(&self, claims: &AccessTokenClaims) -> Result<String, KeyError> {
        let mut header = Header::new(self.verifier.alg.jwt());
        header.kid = Some(self.verifier.kid.clone());
        jwt::encode(&header, claims, &self.signing_key).map_err(|e| KeyError::Encoding(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<AccessTokenClaims, VerificationError> {
        self.verifier.verify(token)
    }

    pub fn verify_at(&self, token: &str, now: i64) -> Result<AccessTokenClaims, VerificationError> {
        self.verifier.verify_at(token, now)
    }

    pub fn verifier(&self) -> TokenVerifier {
        self.verifier.clone()
    }

    /// Verification material that is safe to publish
    pub fn token_key(&self) -> TokenKey {
        TokenKey {
            alg: self.verifier.alg,
            kid: self.verifier.kid.clone(),
            value: self.public_key.as_ref().map(|key| URL_SAFE_NO_PAD.encode(key)),
        }
    }
}
