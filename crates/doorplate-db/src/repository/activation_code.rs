//! # Activation Code Repository
//!
//! Issued codes, keyed by the code itself and looked up per hardware id.
//! Generation races can leave several rows for one hardware id; callers pick
//! the newest through [`ActivationCodeRepository::list_by_hardware_id`].

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use doorplate_core::ActivationCode;

/// Repository for activation codes.
#[derive(Debug, Clone)]
pub struct ActivationCodeRepository {
    pool: SqlitePool,
}

impl ActivationCodeRepository {
    /// Creates a new ActivationCodeRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ActivationCodeRepository { pool }
    }

    pub async fn insert(&self, code: &ActivationCode) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO activation_codes (code, hardware_id, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&code.code)
        .bind(&code.hardware_id)
        .bind(code.created_at)
        .bind(code.expires_at)
        .execute(&self.pool)
        .await?;

        debug!(hardware_id = %code.hardware_id, "Activation code stored");
        Ok(())
    }

    pub async fn find_by_code(&self, code: &str) -> DbResult<Option<ActivationCode>> {
        let row = sqlx::query_as::<_, ActivationCode>(
            r#"
            SELECT code, hardware_id, created_at, expires_at
            FROM activation_codes
            WHERE code = ?1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// All codes for a hardware id, newest first. Ties break on the code
    /// string so the order is stable.
    pub async fn list_by_hardware_id(&self, hardware_id: &str) -> DbResult<Vec<ActivationCode>> {
        let rows = sqlx::query_as::<_, ActivationCode>(
            r#"
            SELECT code, hardware_id, created_at, expires_at
            FROM activation_codes
            WHERE hardware_id = ?1
            ORDER BY created_at DESC, code DESC
            "#,
        )
        .bind(hardware_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Consumes `code` together with every sibling code for `hardware_id`.
    ///
    /// One statement, so among concurrent redemptions for the same hardware
    /// id only the first removes anything. Returns the number of rows removed;
    /// zero means the code was already gone.
    pub async fn redeem(&self, code: &str, hardware_id: &str) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM activation_codes
            WHERE hardware_id = ?2
              AND EXISTS (
                  SELECT 1 FROM activation_codes
                  WHERE code = ?1 AND hardware_id = ?2
              )
            "#,
        )
        .bind(code)
        .bind(hardware_id)
        .execute(&self.pool)
        .await?;

        debug!(
            hardware_id = %hardware_id,
            removed = result.rows_affected(),
            "Activation code redeemed"
        );
        Ok(result.rows_affected())
    }

    /// Deletes every code for a hardware id. Returns how many were removed.
    pub async fn delete_all_for_hardware_id(&self, hardware_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM activation_codes WHERE hardware_id = ?1")
            .bind(hardware_id)
            .execute(&self.pool)
            .await?;

        debug!(
            hardware_id = %hardware_id,
            removed = result.rows_affected(),
            "Activation codes cleared"
        );
        Ok(result.rows_affected())
    }
}
