//! Authenticated cookie tokens.
//!
//! A token carries an issue timestamp and a payload, authenticated with a
//! keyed BLAKE3 MAC over the cookie name and, when a block key is configured,
//! encrypted with AES-256-GCM. Tokens are bound to the cookie name they were
//! issued under and stop decoding once older than the codec's max-age.
//!
//! Several codecs can be configured at once for key rotation: the first one
//! encodes, every one of them is tried on decode.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

use super::aes::{self, SecureKey, KEY_SIZE, NONCE_SIZE};

/// The default token lifetime, in seconds (30 days).
pub const DEFAULT_MAX_AGE: i64 = 86400 * 30;
/// The longest encoded token accepted or produced.
pub const MAX_TOKEN_LENGTH: usize = 4096;

const TIMESTAMP_SIZE: usize = 8;
const MAC_SIZE: usize = 32;
/// How far in the future an issue timestamp may lie before it is rejected.
const CLOCK_SKEW_SECS: i64 = 60;

/// Errors produced while encoding or decoding a token.
#[derive(Error, Debug)]
pub enum CodecError {
    /// No codec was configured.
    #[error("no codecs configured")]
    NoCodecs,

    /// The encoded value exceeds `MAX_TOKEN_LENGTH`.
    #[error("the value is too long")]
    ValueTooLong,

    /// The token is not valid base64.
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The MAC did not verify.
    #[error("the value is not valid")]
    MacInvalid,

    /// The token is too short or its timestamp is out of range.
    #[error("invalid timestamp")]
    Timestamp,

    /// The token is older than the codec's max-age.
    #[error("expired timestamp")]
    Expired,

    /// The ciphertext could not be decrypted.
    #[error("the value could not be decrypted")]
    Decryption,

    /// The payload could not be encrypted.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// The value could not be serialized or deserialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A key had the wrong size.
    #[error("key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Every configured codec rejected the value.
    #[error("all codecs failed: {}", join_errors(.0))]
    Multi(Vec<CodecError>),
}

fn join_errors(errors: &[CodecError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A codec that turns payload bytes into a cookie-safe token and back.
pub trait Codec: Send + Sync {
    /// Encodes `payload` for the cookie `name`.
    fn encode(&self, name: &str, payload: &[u8]) -> Result<String, CodecError>;

    /// Verifies and decodes a token produced by `encode` for the same `name`.
    fn decode(&self, name: &str, value: &str) -> Result<Vec<u8>, CodecError>;

    /// Sets the token lifetime in seconds. Zero or less disables the age check.
    fn set_max_age(&mut self, age: i64);

    /// Returns the token lifetime in seconds.
    fn max_age(&self) -> i64;
}

/// Hash and optional block key material for one codec.
#[derive(Clone)]
pub struct KeyPair {
    /// MAC key, 32 bytes.
    pub hash_key: Zeroizing<Vec<u8>>,
    /// Encryption key, 32 bytes. Tokens are signed only when absent.
    pub block_key: Option<Zeroizing<Vec<u8>>>,
}

impl KeyPair {
    /// Creates a key pair from raw key bytes.
    pub fn new(hash_key: Vec<u8>, block_key: Option<Vec<u8>>) -> Self {
        Self {
            hash_key: Zeroizing::new(hash_key),
            block_key: block_key.map(Zeroizing::new),
        }
    }

    /// Generates a fresh pair with both keys drawn from the OS RNG.
    pub fn generate() -> Self {
        Self::new(
            generate_random_key(KEY_SIZE),
            Some(generate_random_key(KEY_SIZE)),
        )
    }
}

/// Signs and optionally encrypts cookie tokens.
#[derive(Clone)]
pub struct SecureCookie {
    hash_key: SecureKey,
    block_key: Option<SecureKey>,
    max_age: i64,
}

impl SecureCookie {
    /// Creates a codec from a 32-byte hash key and an optional 32-byte block key.
    pub fn new(hash_key: &[u8], block_key: Option<&[u8]>) -> Result<Self, CodecError> {
        Ok(Self {
            hash_key: SecureKey::from_slice(hash_key)?,
            block_key: block_key.map(SecureKey::from_slice).transpose()?,
            max_age: DEFAULT_MAX_AGE,
        })
    }

    /// Encodes `payload` as if it had been issued at `issued_at`.
    pub fn encode_at(
        &self,
        name: &str,
        payload: &[u8],
        issued_at: DateTime<Utc>,
    ) -> Result<String, CodecError> {
        let timestamp = issued_at.timestamp().to_be_bytes();

        let body = match &self.block_key {
            Some(key) => {
                let (ciphertext, nonce) = aes::encrypt(key, payload, name.as_bytes())?;
                let mut body = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
                body.extend_from_slice(&nonce);
                body.extend_from_slice(&ciphertext);
                body
            }
            None => payload.to_vec(),
        };

        let mac = self.mac(name, &timestamp, &body);

        let mut token = Vec::with_capacity(TIMESTAMP_SIZE + body.len() + MAC_SIZE);
        token.extend_from_slice(&timestamp);
        token.extend_from_slice(&body);
        token.extend_from_slice(mac.as_bytes());

        let encoded = general_purpose::URL_SAFE_NO_PAD.encode(token);
        if encoded.len() > MAX_TOKEN_LENGTH {
            return Err(CodecError::ValueTooLong);
        }
        Ok(encoded)
    }

    fn mac(&self, name: &str, timestamp: &[u8], body: &[u8]) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(self.hash_key.as_bytes());
        hasher.update(name.as_bytes());
        hasher.update(b"|");
        hasher.update(timestamp);
        hasher.update(body);
        hasher.finalize()
    }
}

impl Codec for SecureCookie {
    fn encode(&self, name: &str, payload: &[u8]) -> Result<String, CodecError> {
        self.encode_at(name, payload, Utc::now())
    }

    fn decode(&self, name: &str, value: &str) -> Result<Vec<u8>, CodecError> {
        if value.len() > MAX_TOKEN_LENGTH {
            return Err(CodecError::ValueTooLong);
        }

        let token = general_purpose::URL_SAFE_NO_PAD.decode(value)?;
        if token.len() < TIMESTAMP_SIZE + MAC_SIZE {
            return Err(CodecError::MacInvalid);
        }

        let (signed, mac) = token.split_at(token.len() - MAC_SIZE);
        let (timestamp, body) = signed.split_at(TIMESTAMP_SIZE);

        let expected = self.mac(name, timestamp, body);
        if !bool::from(expected.as_bytes().as_slice().ct_eq(mac)) {
            return Err(CodecError::MacInvalid);
        }

        let timestamp: [u8; TIMESTAMP_SIZE] =
            timestamp.try_into().map_err(|_| CodecError::Timestamp)?;
        let issued_at = i64::from_be_bytes(timestamp);
        let now = Utc::now().timestamp();
        if issued_at > now.saturating_add(CLOCK_SKEW_SECS) {
            return Err(CodecError::Timestamp);
        }
        if self.max_age > 0 && issued_at < now.saturating_sub(self.max_age) {
            return Err(CodecError::Expired);
        }

        match &self.block_key {
            Some(key) => {
                if body.len() < NONCE_SIZE {
                    return Err(CodecError::Decryption);
                }
                let (nonce, ciphertext) = body.split_at(NONCE_SIZE);
                let nonce: [u8; NONCE_SIZE] =
                    nonce.try_into().map_err(|_| CodecError::Decryption)?;
                aes::decrypt(key, ciphertext, &nonce, name.as_bytes())
            }
            None => Ok(body.to_vec()),
        }
    }

    fn set_max_age(&mut self, age: i64) {
        self.max_age = age;
    }

    fn max_age(&self) -> i64 {
        self.max_age
    }
}

/// Returns `len` bytes from the OS RNG.
pub fn generate_random_key(len: usize) -> Vec<u8> {
    use rand::{rngs::OsRng, RngCore};

    let mut key = vec![0u8; len];
    OsRng.fill_bytes(&mut key);
    key
}

/// Builds one `SecureCookie` per key pair, in order.
pub fn codecs_from_pairs(pairs: &[KeyPair]) -> Result<Vec<Box<dyn Codec>>, CodecError> {
    pairs
        .iter()
        .map(|pair| {
            let block_key = pair.block_key.as_deref().map(Vec::as_slice);
            let codec = SecureCookie::new(&pair.hash_key, block_key)?;
            Ok(Box::new(codec) as Box<dyn Codec>)
        })
        .collect()
}

/// Serializes `value` and encodes it with the first codec.
pub fn encode_multi<T>(name: &str, value: &T, codecs: &[Box<dyn Codec>]) -> Result<String, CodecError>
where
    T: Serialize + ?Sized,
{
    let codec = codecs.first().ok_or(CodecError::NoCodecs)?;
    let payload =
        sonic_rs::to_vec(value).map_err(|e| CodecError::Serialization(e.to_string()))?;
    codec.encode(name, &payload)
}

/// Decodes `value` with each codec in turn and deserializes the first success.
pub fn decode_multi<T>(name: &str, value: &str, codecs: &[Box<dyn Codec>]) -> Result<T, CodecError>
where
    T: DeserializeOwned,
{
    if codecs.is_empty() {
        return Err(CodecError::NoCodecs);
    }

    let mut errors = Vec::with_capacity(codecs.len());
    for codec in codecs {
        match codec.decode(name, value) {
            Ok(payload) => {
                return sonic_rs::from_slice(&payload)
                    .map_err(|e| CodecError::Serialization(e.to_string()));
            }
            Err(e) => errors.push(e),
        }
    }
    Err(CodecError::Multi(errors))
}
