use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use prep_core::model::{UserId, UserProgress};

use crate::cache::{CacheEntry, ProgressCache};
use crate::repository::StorageError;

use super::SqliteCache;

const PROGRESS_KIND: &str = "progress";

#[async_trait]
impl ProgressCache for SqliteCache {
    async fn get_cached(
        &self,
        user: &UserId,
    ) -> Result<Option<CacheEntry<UserProgress>>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT body, fetched_at
            FROM cached_documents
            WHERE user_id = ?1 AND kind = ?2
            ",
        )
        .bind(user.as_str())
        .bind(PROGRESS_KIND)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let body: String = row
            .try_get("body")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let fetched_at: DateTime<Utc> = row
            .try_get("fetched_at")
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        let doc: UserProgress = serde_json::from_str(&body)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        Ok(Some(CacheEntry::new(doc, fetched_at)))
    }

    async fn put_cached(
        &self,
        user: &UserId,
        progress: &UserProgress,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let body = serde_json::to_string(progress)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO cached_documents (user_id, kind, body, fetched_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, kind) DO UPDATE SET
                body = excluded.body,
                fetched_at = excluded.fetched_at
            ",
        )
        .bind(user.as_str())
        .bind(PROGRESS_KIND)
        .bind(body)
        .bind(fetched_at)
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(())
    }

    async fn clear_cached(&self, user: &UserId) -> Result<(), StorageError> {
        sqlx::query(
            r"
            DELETE FROM cached_documents
            WHERE user_id = ?1 AND kind = ?2
            ",
        )
        .bind(user.as_str())
        .bind(PROGRESS_KIND)
        .execute(&self.pool)
        .await
        .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(())
    }
}
