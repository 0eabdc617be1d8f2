//! # Whitelist Repository
//!
//! Hardware identities an operator has cleared for activation.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use doorplate_core::WhitelistEntry;

/// Repository for the hardware whitelist.
#[derive(Debug, Clone)]
pub struct WhitelistRepository {
    pool: SqlitePool,
}

impl WhitelistRepository {
    /// Creates a new WhitelistRepository.
    pub fn new(pool: SqlitePool) -> Self {
        WhitelistRepository { pool }
    }

    /// Adds a hardware id.
    ///
    /// ## Errors
    /// `UniqueViolation` when the id is already whitelisted.
    pub async fn insert(&self, hardware_id: &str) -> DbResult<WhitelistEntry> {
        let entry = WhitelistEntry {
            hardware_id: hardware_id.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO hardware_whitelist (hardware_id, created_at) VALUES (?1, ?2)")
            .bind(&entry.hardware_id)
            .bind(entry.created_at)
            .execute(&self.pool)
            .await?;

        debug!(hardware_id = %hardware_id, "Whitelist entry added");
        Ok(entry)
    }

    /// Removes a hardware id.
    ///
    /// ## Errors
    /// `NotFound` when the id was not whitelisted.
    pub async fn delete(&self, hardware_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM hardware_whitelist WHERE hardware_id = ?1")
            .bind(hardware_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("WhitelistEntry", hardware_id));
        }

        debug!(hardware_id = %hardware_id, "Whitelist entry removed");
        Ok(())
    }

    pub async fn exists(&self, hardware_id: &str) -> DbResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM hardware_whitelist WHERE hardware_id = ?1")
                .bind(hardware_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count > 0)
    }

    /// Lists every entry, oldest first.
    pub async fn list(&self) -> DbResult<Vec<WhitelistEntry>> {
        let entries = sqlx::query_as::<_, WhitelistEntry>(
            "SELECT hardware_id, created_at FROM hardware_whitelist ORDER BY created_at, hardware_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use crate::repository::test_support::db;
    use crate::DbError;

    #[tokio::test]
    async fn test_insert_exists_delete() {
        let db = db().await;
        let repo = db.whitelist();

        assert!(!repo.exists("ABC123").await.unwrap());
        repo.insert("ABC123").await.unwrap();
        assert!(repo.exists("ABC123").await.unwrap());

        repo.delete("ABC123").await.unwrap();
        assert!(!repo.exists("ABC123").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_unique_violation() {
        let db = db().await;
        let repo = db.whitelist();

        repo.insert("ABC123").await.unwrap();
        let err = repo.insert("ABC123").await.unwrap_err();
        assert!(
            matches!(err, DbError::UniqueViolation { ref field } if field == "hardware_whitelist.hardware_id"),
            "got {:?}",
            err
        );
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let db = db().await;
        let err = db.whitelist().delete("nope").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list() {
        let db = db().await;
        let repo = db.whitelist();
        repo.insert("A1").await.unwrap();
        repo.insert("B2").await.unwrap();

        let ids: Vec<String> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.hardware_id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"A1".to_string()));
        assert!(ids.contains(&"B2".to_string()));
    }
}
