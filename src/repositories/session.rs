use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::Row;

use crate::{
    error::{Result, SessionError},
    models::record::Record,
};

/// Persistent storage for session records.
///
/// Every write runs in its own transaction: either the whole statement
/// commits or nothing does.
#[async_trait]
pub trait Records: Send + Sync + 'static {
    /// Inserts a new record. `created_on` and `updated_on` are set to now.
    async fn create(&self, record: &Record) -> Result<()>;

    /// Loads the record for `key`, or `SessionError::NotFound`.
    async fn find_by_key(&self, key: &str) -> Result<Record>;

    /// Replaces `data` and `expires_on` for the record's key and sets
    /// `updated_on` to now.
    async fn update(&self, record: &Record) -> Result<()>;

    /// Deletes the record for `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Deletes every record whose `expires_on` is in the past.
    ///
    /// # Returns
    ///
    /// The number of records removed.
    async fn delete_expired(&self) -> Result<u64>;
}

/// A helper function to map a `tokio_postgres::Row` to a `Record`.
fn row_to_record(row: &Row) -> Result<Record> {
    Ok(Record {
        key: row.try_get("key").map_err(|_| SessionError::MissingData("key".to_string()))?,
        data: row.try_get("data").map_err(|_| SessionError::MissingData("data".to_string()))?,
        created_on: row.try_get("created_on").map_err(|_| SessionError::MissingData("created_on".to_string()))?,
        updated_on: row.try_get("updated_on").map_err(|_| SessionError::MissingData("updated_on".to_string()))?,
        expires_on: row.try_get("expires_on").map_err(|_| SessionError::MissingData("expires_on".to_string()))?,
    })
}

/// Session records in the PostgreSQL `sessions` table.
#[derive(Clone)]
pub struct PgRecords {
    pool: Pool,
}

impl PgRecords {
    /// Creates a new `PgRecords` over `pool`.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl Records for PgRecords {
    async fn create(&self, record: &Record) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        tx.execute(
            r#"
            INSERT INTO sessions (key, data, created_on, updated_on, expires_on)
            VALUES ($1, $2, NOW(), NOW(), $3)
            "#,
            &[&record.key, &record.data, &record.expires_on],
        )
        .await?;
        tx.commit().await?;
        tracing::debug!("Session record created");
        Ok(())
    }

    async fn find_by_key(&self, key: &str) -> Result<Record> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                r#"
                SELECT key, data, created_on, updated_on, expires_on
                FROM sessions
                WHERE key = $1
                LIMIT 1
                "#,
                &[&key],
            )
            .await?
            .ok_or(SessionError::NotFound)?;
        row_to_record(&row)
    }

    async fn update(&self, record: &Record) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        tx.execute(
            r#"
            UPDATE sessions
            SET
                data = $2,
                updated_on = NOW(),
                expires_on = $3
            WHERE key = $1
            "#,
            &[&record.key, &record.data, &record.expires_on],
        )
        .await?;
        tx.commit().await?;
        tracing::debug!("Session record updated");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        tx.execute(
            r#"
            DELETE FROM sessions
            WHERE key = $1
            "#,
            &[&key],
        )
        .await?;
        tx.commit().await?;
        tracing::debug!("Session record deleted");
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let removed = tx
            .execute(
                r#"
                DELETE FROM sessions
                WHERE expires_on < NOW()
                "#,
                &[],
            )
            .await?;
        tx.commit().await?;
        Ok(removed)
    }
}
