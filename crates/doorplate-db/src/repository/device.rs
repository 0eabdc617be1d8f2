//! # Device Repository
//!
//! Device records and the narrow bookkeeping writes the poller issues on
//! every device poll.
//!
//! ## Write Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Operator commands (bind / update / unbind / assign template)           │
//! │       └── save()              full row, last writer wins                │
//! │                                                                         │
//! │  Device polls                                                           │
//! │       ├── touch()             updated_at, last_refresh_interval         │
//! │       ├── clear_needs_update() after content was handed out             │
//! │       └── set_guest_token()   first poll of a legacy record             │
//! │                                                                         │
//! │  Narrow writes never clobber flags an operator changed in between.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use doorplate_core::Device;

const DEVICE_COLUMNS: &str = r#"
    device_id, hardware_id, user_id, device_name, is_activated, is_unbound,
    refresh_interval_secs, last_refresh_interval_secs, current_template_id,
    needs_update, force_no_update, guest_token, activation_marker,
    created_at, updated_at
"#;

/// Repository for device records.
#[derive(Debug, Clone)]
pub struct DeviceRepository {
    pool: SqlitePool,
}

impl DeviceRepository {
    /// Creates a new DeviceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DeviceRepository { pool }
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub async fn get_by_device_id(&self, device_id: &str) -> DbResult<Option<Device>> {
        self.fetch_one_where("device_id", device_id).await
    }

    pub async fn get_by_hardware_id(&self, hardware_id: &str) -> DbResult<Option<Device>> {
        self.fetch_one_where("hardware_id", hardware_id).await
    }

    pub async fn get_by_guest_token(&self, token: &str) -> DbResult<Option<Device>> {
        self.fetch_one_where("guest_token", token).await
    }

    async fn fetch_one_where(&self, column: &'static str, value: &str) -> DbResult<Option<Device>> {
        let sql = format!("SELECT {} FROM devices WHERE {} = ?1", DEVICE_COLUMNS, column);
        let device = sqlx::query_as::<_, Device>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(device)
    }

    /// Devices owned by `user_id` that have not been released, oldest first.
    pub async fn list_active_for_user(&self, user_id: &str) -> DbResult<Vec<Device>> {
        let sql = format!(
            "SELECT {} FROM devices WHERE user_id = ?1 AND is_unbound = 0 ORDER BY created_at, device_id",
            DEVICE_COLUMNS
        );
        let devices = sqlx::query_as::<_, Device>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(devices)
    }

    // =========================================================================
    // Full-Row Writes
    // =========================================================================

    /// Inserts a new device.
    ///
    /// ## Errors
    /// `UniqueViolation` when the hardware id or guest token is taken.
    pub async fn insert(&self, device: &Device) -> DbResult<()> {
        let sql = format!(
            "INSERT INTO devices ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            DEVICE_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&device.device_id)
            .bind(&device.hardware_id)
            .bind(&device.user_id)
            .bind(&device.device_name)
            .bind(device.is_activated)
            .bind(device.is_unbound)
            .bind(device.refresh_interval_secs)
            .bind(device.last_refresh_interval_secs)
            .bind(&device.current_template_id)
            .bind(device.needs_update)
            .bind(device.force_no_update)
            .bind(&device.guest_token)
            .bind(&device.activation_marker)
            .bind(device.created_at)
            .bind(device.updated_at)
            .execute(&self.pool)
            .await?;

        debug!(device_id = %device.device_id, hardware_id = %device.hardware_id, "Device inserted");
        Ok(())
    }

    /// Overwrites every mutable column of an existing device.
    pub async fn save(&self, device: &Device) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE devices SET
                user_id = ?2,
                device_name = ?3,
                is_activated = ?4,
                is_unbound = ?5,
                refresh_interval_secs = ?6,
                last_refresh_interval_secs = ?7,
                current_template_id = ?8,
                needs_update = ?9,
                force_no_update = ?10,
                guest_token = ?11,
                activation_marker = ?12,
                updated_at = ?13
            WHERE device_id = ?1
            "#,
        )
        .bind(&device.device_id)
        .bind(&device.user_id)
        .bind(&device.device_name)
        .bind(device.is_activated)
        .bind(device.is_unbound)
        .bind(device.refresh_interval_secs)
        .bind(device.last_refresh_interval_secs)
        .bind(&device.current_template_id)
        .bind(device.needs_update)
        .bind(device.force_no_update)
        .bind(&device.guest_token)
        .bind(&device.activation_marker)
        .bind(device.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Device", &device.device_id));
        }

        debug!(device_id = %device.device_id, "Device saved");
        Ok(())
    }

    // =========================================================================
    // Narrow Bookkeeping Writes
    // =========================================================================

    /// Records that the device called in.
    pub async fn touch(
        &self,
        device_id: &str,
        at: DateTime<Utc>,
        last_refresh_interval_secs: Option<u32>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE devices SET
                updated_at = ?2,
                last_refresh_interval_secs = COALESCE(?3, last_refresh_interval_secs)
            WHERE device_id = ?1
            "#,
        )
        .bind(device_id)
        .bind(at)
        .bind(last_refresh_interval_secs)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Device", device_id));
        }
        Ok(())
    }

    /// Clears the stored update bit after content was delivered.
    pub async fn clear_needs_update(&self, device_id: &str, at: DateTime<Utc>) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE devices SET needs_update = 0, updated_at = ?2 WHERE device_id = ?1")
                .bind(device_id)
                .bind(at)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Device", device_id));
        }
        Ok(())
    }

    /// Stores a guest token if the device does not have one yet.
    ///
    /// Returns the token actually stored, which is the existing one when a
    /// concurrent poll won the race.
    pub async fn set_guest_token(&self, device_id: &str, token: &str) -> DbResult<String> {
        sqlx::query("UPDATE devices SET guest_token = COALESCE(guest_token, ?2) WHERE device_id = ?1")
            .bind(device_id)
            .bind(token)
            .execute(&self.pool)
            .await?;

        let stored: Option<Option<String>> =
            sqlx::query_scalar("SELECT guest_token FROM devices WHERE device_id = ?1")
                .bind(device_id)
                .fetch_optional(&self.pool)
                .await?;

        stored
            .flatten()
            .ok_or_else(|| DbError::not_found("Device", device_id))
    }
}
