//! # Template Repository
//!
//! Layouts are stored with their element list as a JSON column and decoded
//! into typed [`LayoutElement`]s on the way out. A row whose JSON no longer
//! decodes surfaces as [`DbError::InvalidData`].

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{DbError, DbResult};
use doorplate_core::layout::{parse_layout, LayoutElement};
use doorplate_core::Template;

/// Raw row; `elements` is the JSON text.
#[derive(Debug, sqlx::FromRow)]
struct TemplateRow {
    id: String,
    owner: String,
    name: String,
    elements: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for Template {
    type Error = DbError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        let elements = parse_layout(&row.id, &row.elements).map_err(|e| DbError::InvalidData {
            entity: "Template".to_string(),
            id: row.id.clone(),
            reason: e.to_string(),
        })?;

        Ok(Template {
            id: row.id,
            owner: row.owner,
            name: row.name,
            elements,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for templates.
#[derive(Debug, Clone)]
pub struct TemplateRepository {
    pool: SqlitePool,
}

impl TemplateRepository {
    /// Creates a new TemplateRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TemplateRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Template>> {
        let row = sqlx::query_as::<_, TemplateRow>(
            "SELECT id, owner, name, elements, updated_at FROM templates WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Template::try_from).transpose()
    }

    /// Most recently updated template called `name` owned by `owner`.
    pub async fn find_by_owner_and_name(&self, owner: &str, name: &str) -> DbResult<Option<Template>> {
        let row = sqlx::query_as::<_, TemplateRow>(
            r#"
            SELECT id, owner, name, elements, updated_at
            FROM templates
            WHERE owner = ?1 AND name = ?2
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(owner)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Template::try_from).transpose()
    }

    pub async fn insert(&self, template: &Template) -> DbResult<()> {
        let elements = encode_elements(&template.id, &template.elements)?;

        sqlx::query(
            r#"
            INSERT INTO templates (id, owner, name, elements, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&template.id)
        .bind(&template.owner)
        .bind(&template.name)
        .bind(elements)
        .bind(template.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn encode_elements(template_id: &str, elements: &[LayoutElement]) -> DbResult<String> {
    serde_json::to_string(elements).map_err(|e| DbError::InvalidData {
        entity: "Template".to_string(),
        id: template_id.to_string(),
        reason: e.to_string(),
    })
}
