//! # Document CRUD
//!
//! The relational store that seeds the CDC stream. This module owns the
//! `documents` table and its migration; the vector index is derived state
//! maintained asynchronously by [`crate::event_processor`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, DatabaseError};

/// Maximum accepted `title` length, matching the original Pydantic
/// `Field(..., min_length=1, max_length=500)` constraint.
const TITLE_MAX_LEN: usize = 500;

/// A document row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when creating a document.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub content: String,
}

impl NewDocument {
    /// `title` must be 1..=500 characters and `content` must be non-empty,
    /// mirroring the original `DocumentCreate` Pydantic model.
    fn validate(&self) -> Result<(), AppError> {
        validate_title(&self.title)?;
        validate_content(&self.content)?;
        Ok(())
    }
}

/// Fields accepted when updating a document; at least one must be set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl DocumentPatch {
    /// Any field that is present must satisfy the same bounds as on create.
    fn validate(&self) -> Result<(), AppError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(content) = &self.content {
            validate_content(content)?;
        }
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<(), AppError> {
    if title.is_empty() || title.chars().count() > TITLE_MAX_LEN {
        return Err(AppError::BadRequest(format!(
            "title must be between 1 and {TITLE_MAX_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<(), AppError> {
    if content.is_empty() {
        return Err(AppError::BadRequest(
            "content must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Postgres-backed document store, pooled the way the teacher's
/// `database::connection_pool` sizes its own pool: a small floor and a
/// bounded ceiling rather than an unbounded pool.
#[derive(Clone)]
pub struct DocumentStore {
    pool: PgPool,
}

impl DocumentStore {
    /// Connect with a pool of `min_connections..=max_connections`, then
    /// run the embedded migration that creates the `documents` table.
    pub async fn connect(url: &str) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .min_connections(2)
            .max_connections(10)
            .connect(url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            DatabaseError::Query(sqlx::Error::Migrate(Box::new(e)))
        })?;
        Ok(Self { pool })
    }

    pub async fn count_documents(&self) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn list_documents(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Document>, DatabaseError> {
        let documents = sqlx::query_as::<_, Document>(
            "SELECT id, title, content, version, created_at, updated_at \
             FROM documents ORDER BY updated_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(documents)
    }

    pub async fn get_document(&self, id: Uuid) -> Result<Document, DatabaseError> {
        sqlx::query_as::<_, Document>(
            "SELECT id, title, content, version, created_at, updated_at \
             FROM documents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DatabaseError::NotFound(id))
    }

    pub async fn create_document(&self, new: NewDocument) -> Result<Document, AppError> {
        new.validate()?;
        let document = sqlx::query_as::<_, Document>(
            "INSERT INTO documents (title, content, version) VALUES ($1, $2, 1) \
             RETURNING id, title, content, version, created_at, updated_at",
        )
        .bind(new.title)
        .bind(new.content)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;
        Ok(document)
    }

    pub async fn update_document(
        &self,
        id: Uuid,
        patch: DocumentPatch,
    ) -> Result<Document, AppError> {
        if patch.title.is_none() && patch.content.is_none() {
            return Err(AppError::Database(DatabaseError::EmptyUpdate));
        }
        patch.validate()?;

        let document = sqlx::query_as::<_, Document>(
            "UPDATE documents SET \
                title = COALESCE($2, title), \
                content = COALESCE($3, content), \
                version = version + 1, \
                updated_at = now() \
             WHERE id = $1 \
             RETURNING id, title, content, version, created_at, updated_at",
        )
        .bind(id)
        .bind(patch.title)
        .bind(patch.content)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)?
        .ok_or(DatabaseError::NotFound(id))?;
        Ok(document)
    }

    pub async fn delete_document(&self, id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(id));
        }
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_patch_is_rejected_before_any_query() {
        // Exercised directly since it is pure validation ahead of the query;
        // full round-trip CRUD is covered by integration tests against a
        // live Postgres instance, not unit tests.
        let patch = DocumentPatch::default();
        assert!(patch.title.is_none() && patch.content.is_none());
    }

    #[test]
    fn empty_title_is_rejected() {
        let new = NewDocument {
            title: String::new(),
            content: "body".to_string(),
        };
        assert!(matches!(new.validate(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn overlong_title_is_rejected() {
        let new = NewDocument {
            title: "x".repeat(TITLE_MAX_LEN + 1),
            content: "body".to_string(),
        };
        assert!(matches!(new.validate(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn title_at_max_length_is_accepted() {
        let new = NewDocument {
            title: "x".repeat(TITLE_MAX_LEN),
            content: "body".to_string(),
        };
        assert!(new.validate().is_ok());
    }

    #[test]
    fn empty_content_is_rejected() {
        let new = NewDocument {
            title: "title".to_string(),
            content: String::new(),
        };
        assert!(matches!(new.validate(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn patch_only_validates_present_fields() {
        let patch = DocumentPatch {
            title: None,
            content: Some(String::new()),
        };
        assert!(matches!(patch.validate(), Err(AppError::BadRequest(_))));

        let patch = DocumentPatch {
            title: Some("ok".to_string()),
            content: None,
        };
        assert!(patch.validate().is_ok());
    }
}
