//! Stateless token codec.
//!
//! A token is `base64url(nonce || AES-256-GCM(zstd(json)))`, where the JSON is
//! the ordered tuple
//! `[id, owner_type, owner_id, token_type, created_at, expires_at|null, payload|null]`
//! with timestamps as epoch seconds. Without the key a token can be neither
//! read nor forged.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload as AeadPayload},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::models::token::{OwnerId, Payload};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const COMPRESSION_LEVEL: i32 = 3;

/// Binds ciphertexts to this format so they cannot be replayed into other
/// AES-GCM consumers sharing the key.
const ASSOCIATED_DATA: &[u8] = b"entity-tokens/v1";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("no token key configured")]
    KeyUnavailable,

    #[error("invalid token key: {0}")]
    InvalidKey(String),

    #[error("malformed token")]
    Malformed,

    #[error("token authentication failed")]
    Unauthenticated,

    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("token body is not valid: {0}")]
    Body(#[from] serde_json::Error),
}

/// The decoded contents of a stateless token.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    pub id: String,
    pub owner_type: String,
    pub owner_id: OwnerId,
    pub token_type: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub payload: Payload,
}

#[derive(Serialize, Deserialize)]
struct Envelope(
    String,
    String,
    OwnerId,
    String,
    i64,
    Option<i64>,
    Option<Payload>,
);

/// Encrypts and decrypts stateless tokens with one process-wide key.
/// Cheap to clone and safe to share across tasks.
#[derive(Clone)]
pub struct TokenCodec {
    key: Option<Zeroizing<[u8; 32]>>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl TokenCodec {
    pub fn new(key: &str) -> Result<Self, CodecError> {
        Ok(Self {
            key: Some(parse_key(key)?),
        })
    }

    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self {
            key: Some(Zeroizing::new(key)),
        }
    }

    /// A codec with no key: every encode fails and every decode is rejected.
    pub fn disabled() -> Self {
        Self { key: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, CodecError> {
        let cipher = self.cipher()?;

        let envelope = Envelope(
            claims.id.clone(),
            claims.owner_type.clone(),
            claims.owner_id.clone(),
            claims.token_type.clone(),
            claims.created_at.timestamp(),
            claims.expires_at.map(|at| at.timestamp()),
            if claims.payload.is_empty() {
                None
            } else {
                Some(claims.payload.clone())
            },
        );
        let json = serde_json::to_vec(&envelope)?;
        let compressed = zstd::encode_all(json.as_slice(), COMPRESSION_LEVEL)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                AeadPayload {
                    msg: &compressed,
                    aad: ASSOCIATED_DATA,
                },
            )
            .map_err(|_| CodecError::Unauthenticated)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(blob))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, CodecError> {
        let cipher = self.cipher()?;

        let blob = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| CodecError::Malformed)?;
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(CodecError::Malformed);
        }

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let compressed = cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                AeadPayload {
                    msg: ciphertext,
                    aad: ASSOCIATED_DATA,
                },
            )
            .map_err(|_| CodecError::Unauthenticated)?;
        let json = zstd::decode_all(compressed.as_slice())?;

        let Envelope(id, owner_type, owner_id, token_type, created_at, expires_at, payload) =
            serde_json::from_slice(&json)?;

        let created_at = DateTime::from_timestamp(created_at, 0).ok_or(CodecError::Malformed)?;
        let expires_at = match expires_at {
            Some(secs) => Some(DateTime::from_timestamp(secs, 0).ok_or(CodecError::Malformed)?),
            None => None,
        };

        Ok(Claims {
            id,
            owner_type,
            owner_id,
            token_type,
            created_at,
            expires_at,
            payload: payload.unwrap_or_default(),
        })
    }

    fn cipher(&self) -> Result<Aes256Gcm, CodecError> {
        let key = self.key.as_ref().ok_or(CodecError::KeyUnavailable)?;
        Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| CodecError::InvalidKey(format!("{:?}", e)))
    }
}

/// Accepts 64 hex chars, or `base64:` followed by 32 base64-encoded bytes.
pub fn parse_key(raw: &str) -> Result<Zeroizing<[u8; 32]>, CodecError> {
    let raw = raw.trim();
    let bytes = if let Some(encoded) = raw.strip_prefix("base64:") {
        Zeroizing::new(
            STANDARD
                .decode(encoded)
                .map_err(|e| CodecError::InvalidKey(e.to_string()))?,
        )
    } else {
        if raw.len() != 64 {
            return Err(CodecError::InvalidKey(format!(
                "expected 64 hex chars (32 bytes), got {} chars",
                raw.len()
            )));
        }
        Zeroizing::new(hex::decode(raw).map_err(|e| CodecError::InvalidKey(e.to_string()))?)
    };

    if bytes.len() != 32 {
        return Err(CodecError::InvalidKey(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&bytes);
    Ok(key)
}
