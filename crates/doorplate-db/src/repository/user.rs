//! # User Repository
//!
//! Accounts are managed by a separate service. The fleet only reads them;
//! `insert` exists for the seed binary and tests.

use sqlx::SqlitePool;

use crate::error::DbResult;
use doorplate_core::User;

const USER_COLUMNS: &str = r#"
    id, username, accept_guest_messages, messaging_user_id,
    welcome_text, hint_text, submit_text, created_at
"#;

/// Repository for user lookups.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Creates a new UserRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn insert(&self, user: &User) -> DbResult<()> {
        let sql = format!(
            "INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            USER_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&user.id)
            .bind(&user.username)
            .bind(user.accept_guest_messages)
            .bind(&user.messaging_user_id)
            .bind(&user.welcome_text)
            .bind(&user.hint_text)
            .bind(&user.submit_text)
            .bind(user.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
