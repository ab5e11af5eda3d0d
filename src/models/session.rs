use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sonic_rs::Value;
use tower_cookies::cookie::SameSite;

use crate::crypto::codec::DEFAULT_MAX_AGE;
use crate::error::{Result, SessionError};

/// Cookie options for a session.
///
/// The store keeps one default copy; every session gets its own clone so a
/// single session can change `max_age` (for example to -1 to delete itself)
/// without touching the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// The cookie path.
    pub path: String,
    /// The cookie domain, host-only when `None`.
    pub domain: Option<String>,
    /// Lifetime in seconds. Zero means a browser-session cookie, negative
    /// means delete now.
    pub max_age: i64,
    /// Whether the cookie is only sent over HTTPS.
    pub secure: bool,
    /// Whether the cookie is hidden from scripts.
    pub http_only: bool,
    /// The SameSite policy.
    pub same_site: SameSite,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            max_age: DEFAULT_MAX_AGE,
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }
}

/// The values stored in a session.
///
/// `expires_on` is the reserved expiry entry. When set, the store keeps it as
/// the record's expiry as long as it is not earlier than now + max-age.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionValues {
    #[serde(default)]
    entries: BTreeMap<String, Value>,
    /// Requested expiry for the stored record.
    #[serde(default)]
    pub expires_on: Option<DateTime<Utc>>,
}

impl SessionValues {
    /// Creates an empty set of values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`, converted to `T`.
    ///
    /// Returns `None` when the key is absent or the value has another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.entries
            .get(key)
            .and_then(|value| sonic_rs::from_value(value).ok())
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert<T: Serialize + ?Sized>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        let value = sonic_rs::to_value(value)
            .map_err(|e| SessionError::Encoding(format!("Session value encoding failed: {}", e)))?;
        self.entries.insert(key.into(), value);
        Ok(())
    }

    /// Removes the value stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Removes every value, including `expires_on`.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.expires_on = None;
    }

    /// Returns the number of stored values, not counting `expires_on`.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no values and no `expires_on` are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.expires_on.is_none()
    }
}

/// A named session as seen by a request handler.
#[derive(Debug, Clone)]
pub struct Session {
    name: String,
    /// The session key, empty until the first save.
    pub id: String,
    /// The session values.
    pub values: SessionValues,
    /// Cookie options for this session.
    pub options: Options,
    /// Whether the session has not been stored yet.
    pub is_new: bool,
}

impl Session {
    /// Creates a new, empty session named `name`.
    pub fn new(name: impl Into<String>, options: Options) -> Self {
        Self {
            name: name.into(),
            id: String::new(),
            values: SessionValues::new(),
            options,
            is_new: true,
        }
    }

    /// Returns the session (and cookie) name.
    pub fn name(&self) -> &str {
        &self.name
    }
}
