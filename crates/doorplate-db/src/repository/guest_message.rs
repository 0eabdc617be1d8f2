//! # Guest Message Repository
//!
//! Append-only log of delivered guest messages. The throttle reads it
//! through three trailing-window counts.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  count_by_ip_since(ip, since)               WHERE source_ip = ?         │
//! │  count_by_device_since(device_id, since)    WHERE device_id = ?         │
//! │  count_by_composite_since(key, since)       WHERE composite_key = ?     │
//! │                                             AND created_at > since      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use doorplate_core::GuestMessageLogEntry;

/// Repository for the guest message log.
#[derive(Debug, Clone)]
pub struct GuestMessageRepository {
    pool: SqlitePool,
}

impl GuestMessageRepository {
    /// Creates a new GuestMessageRepository.
    pub fn new(pool: SqlitePool) -> Self {
        GuestMessageRepository { pool }
    }

    pub async fn append(&self, entry: &GuestMessageLogEntry) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO guest_message_logs (
                id, device_id, user_id, token, source_ip, message, composite_key, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.device_id)
        .bind(&entry.user_id)
        .bind(&entry.token)
        .bind(&entry.source_ip)
        .bind(&entry.message)
        .bind(&entry.composite_key)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        debug!(device_id = %entry.device_id, "Guest message logged");
        Ok(())
    }

    pub async fn count_by_ip_since(&self, source_ip: &str, since: DateTime<Utc>) -> DbResult<u32> {
        self.count_since("source_ip", source_ip, since).await
    }

    pub async fn count_by_device_since(&self, device_id: &str, since: DateTime<Utc>) -> DbResult<u32> {
        self.count_since("device_id", device_id, since).await
    }

    pub async fn count_by_composite_since(
        &self,
        composite_key: &str,
        since: DateTime<Utc>,
    ) -> DbResult<u32> {
        self.count_since("composite_key", composite_key, since).await
    }

    async fn count_since(&self, column: &'static str, value: &str, since: DateTime<Utc>) -> DbResult<u32> {
        let sql = format!(
            "SELECT COUNT(*) FROM guest_message_logs WHERE {} = ?1 AND created_at > ?2",
            column
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(value)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use uuid::Uuid;

    use crate::repository::test_support::db;
    use doorplate_core::GuestMessageLogEntry;

    fn entry(ip: &str, device_id: &str, at: DateTime<Utc>) -> GuestMessageLogEntry {
        GuestMessageLogEntry {
            id: Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            user_id: "u1".to_string(),
            token: "token".to_string(),
            source_ip: ip.to_string(),
            message: "hello".to_string(),
            composite_key: GuestMessageLogEntry::composite_key(ip, device_id),
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_window_counts() {
        let db = db().await;
        let repo = db.guest_messages();
        let now = Utc::now();

        repo.append(&entry("10.0.0.1", "dev-1", now - Duration::minutes(90))).await.unwrap();
        repo.append(&entry("10.0.0.1", "dev-1", now - Duration::minutes(30))).await.unwrap();
        repo.append(&entry("10.0.0.1", "dev-2", now - Duration::minutes(10))).await.unwrap();
        repo.append(&entry("10.0.0.2", "dev-1", now - Duration::minutes(5))).await.unwrap();

        let since = now - Duration::hours(1);
        assert_eq!(repo.count_by_ip_since("10.0.0.1", since).await.unwrap(), 2);
        assert_eq!(repo.count_by_device_since("dev-1", since).await.unwrap(), 2);
        assert_eq!(
            repo.count_by_composite_since("10.0.0.1_dev-1", since).await.unwrap(),
            1
        );
        assert_eq!(repo.count_by_ip_since("10.9.9.9", since).await.unwrap(), 0);
    }
}
