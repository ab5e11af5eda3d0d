use std::env;
use std::net::SocketAddr;
use anyhow::{Context, Result};
use zeroize::Zeroize;

use crate::crypto::codec::{KeyPair, DEFAULT_MAX_AGE};

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The maximum number of pooled database connections.
    pub database_pool_size: usize,
    /// The session cookie name.
    pub cookie_name: String,
    /// The session cookie path.
    pub cookie_path: String,
    /// The session lifetime in seconds.
    pub max_age: i64,
    /// Whether cookies carry the `Secure` flag.
    pub secure_cookies: bool,
    /// Seconds between cleanup passes over expired records. Zero disables them.
    pub cleanup_interval_secs: u64,
    /// The address the demo server listens on.
    pub bind_addr: SocketAddr,
    /// Codec key pairs. The first pair encodes, all pairs decode.
    pub key_pairs: Vec<KeyPair>,
}

/// Parses one `hashhex[:blockhex]` entry of `SESSION_KEYS`.
fn parse_key_pair(entry: &str) -> Result<KeyPair> {
    let mut parts = entry.trim().splitn(2, ':');

    let mut hash_hex = parts.next().unwrap_or_default().to_string();
    let hash_key = hex::decode(&hash_hex).context("SESSION_KEYS hash key must be valid hexadecimal")?;
    hash_hex.zeroize();
    if hash_key.len() != 32 {
        anyhow::bail!("SESSION_KEYS hash key must be exactly 32 bytes (64 hex characters)");
    }

    let block_key = match parts.next() {
        Some(block_hex) if !block_hex.is_empty() => {
            let mut block_hex = block_hex.to_string();
            let block_key = hex::decode(&block_hex)
                .context("SESSION_KEYS block key must be valid hexadecimal")?;
            block_hex.zeroize();
            if block_key.len() != 32 {
                anyhow::bail!("SESSION_KEYS block key must be exactly 32 bytes (64 hex characters)");
            }
            Some(block_key)
        }
        _ => None,
    };

    Ok(KeyPair::new(hash_key, block_key))
}

/// Parses the comma-separated key pairs of `SESSION_KEYS`.
pub fn parse_key_pairs(value: &str) -> Result<Vec<KeyPair>> {
    let pairs = value
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(parse_key_pair)
        .collect::<Result<Vec<_>>>()?;

    if pairs.is_empty() {
        anyhow::bail!("SESSION_KEYS must contain at least one key pair");
    }
    Ok(pairs)
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let mut keys = env::var("SESSION_KEYS")
            .context("SESSION_KEYS must be set (generate with: openssl rand -hex 32)")?;
        let key_pairs = parse_key_pairs(&keys);
        keys.zeroize();

        let is_production = env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string()) == "production";

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            database_pool_size: env::var("DATABASE_POOL_SIZE")
                .unwrap_or_else(|_| "16".to_string())
                .parse()
                .context("Invalid DATABASE_POOL_SIZE")?,
            cookie_name: env::var("SESSION_COOKIE_NAME")
                .unwrap_or_else(|_| "session".to_string()),
            cookie_path: env::var("SESSION_PATH")
                .unwrap_or_else(|_| "/".to_string()),
            max_age: env::var("SESSION_MAX_AGE")
                .unwrap_or_else(|_| DEFAULT_MAX_AGE.to_string())
                .parse()
                .context("Invalid SESSION_MAX_AGE")?,
            secure_cookies: is_production,
            cleanup_interval_secs: env::var("SESSION_CLEANUP_INTERVAL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .context("Invalid SESSION_CLEANUP_INTERVAL_SECS")?,
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            key_pairs: key_pairs?,
        })
    }
}
