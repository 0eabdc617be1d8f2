//! # Database Error Types
//!
//! What the repositories report when SQLite says no.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sqlx::Error                                                            │
//! │    ├── Database(e), e.kind() == UniqueViolation  → UniqueViolation      │
//! │    ├── Database(e), other constraint kinds       → ConstraintViolation  │
//! │    ├── Database(e), anything else                → QueryFailed          │
//! │    ├── PoolTimedOut                              → PoolExhausted        │
//! │    ├── PoolClosed                                → ConnectionFailed     │
//! │    └── everything else                           → Internal             │
//! │                                                                         │
//! │  Repositories add NotFound (zero rows touched) and InvalidData          │
//! │  (a stored layout that no longer decodes).                              │
//! │                                                                         │
//! │  doorplate-fleet wraps all of these in FleetError::Database, except    │
//! │  the few it translates into caller errors (AlreadyExists, ...).        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::error::ErrorKind;
use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// An update or delete matched no row.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Hardware id, activation code or guest token already taken.
    ///
    /// `field` is the `table.column` SQLite names in its error message.
    #[error("Duplicate value for {field}")]
    UniqueViolation { field: String },

    /// CHECK, NOT NULL or foreign key constraint.
    ///
    /// A refresh interval below 300 seconds that slipped past validation
    /// lands here.
    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    /// A stored value could not be decoded into its domain type.
    #[error("Invalid {entity} {id}: {reason}")]
    InvalidData {
        entity: String,
        id: String,
        reason: String,
    },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Every connection stayed busy past the acquire timeout.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.kind() {
                    // SQLite: "UNIQUE constraint failed: devices.hardware_id"
                    ErrorKind::UniqueViolation => DbError::UniqueViolation {
                        field: message
                            .rsplit(": ")
                            .next()
                            .unwrap_or("unknown")
                            .to_string(),
                    },
                    ErrorKind::ForeignKeyViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::CheckViolation => DbError::ConstraintViolation(message),
                    _ => DbError::QueryFailed(message),
                }
            }
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_unique_violation_names_the_column() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let insert = "INSERT INTO hardware_whitelist (hardware_id, created_at) VALUES ('A1', '2026-01-01T00:00:00Z')";
        sqlx::query(insert).execute(db.pool()).await.unwrap();

        let err: DbError = sqlx::query(insert).execute(db.pool()).await.unwrap_err().into();
        match err {
            DbError::UniqueViolation { field } => assert_eq!(field, "hardware_whitelist.hardware_id"),
            other => panic!("expected unique violation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_check_constraint_is_classified() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err: DbError = sqlx::query(
            "INSERT INTO devices (device_id, hardware_id, refresh_interval_secs, created_at, updated_at)
             VALUES ('d1', 'A1', 60, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
        )
        .execute(db.pool())
        .await
        .unwrap_err()
        .into();

        assert!(matches!(err, DbError::ConstraintViolation(_)));
    }

    #[test]
    fn test_pool_errors() {
        assert!(matches!(DbError::from(sqlx::Error::PoolTimedOut), DbError::PoolExhausted));
        assert!(matches!(
            DbError::from(sqlx::Error::PoolClosed),
            DbError::ConnectionFailed(_)
        ));
    }
}
