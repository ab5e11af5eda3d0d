use chrono::{DateTime, Utc};

/// One row of the `sessions` table.
///
/// `data` holds the codec-encoded session values; the store never looks
/// inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The session key. Immutable once assigned.
    pub key: String,
    /// The encoded session values.
    pub data: Vec<u8>,
    /// The timestamp when the row was inserted.
    pub created_on: DateTime<Utc>,
    /// The timestamp of the last write.
    pub updated_on: DateTime<Utc>,
    /// The timestamp after which the session should no longer be used.
    pub expires_on: DateTime<Utc>,
}

impl Record {
    /// Creates a record for writing. `created_on` and `updated_on` are set to
    /// now here and by the database on insert.
    pub fn new(key: impl Into<String>, data: Vec<u8>, expires_on: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            data,
            created_on: now,
            updated_on: now,
            expires_on,
        }
    }
}
