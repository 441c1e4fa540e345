//! Data Access Layer
//!
//! PostgreSQL-backed assessment cache. Each row holds both sets for one
//! lesson/learner/length combination as a JSONB document.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;
use tutor_core::supply::{AssessmentKey, AssessmentStore, StoreError, StoredAssessments};

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// An [`AssessmentStore`] over a `PgPool`.
#[derive(Clone)]
pub struct PgAssessmentStore {
    pool: PgPool,
}

impl PgAssessmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AssessmentStore for PgAssessmentStore {
    async fn get(&self, key: &AssessmentKey) -> Result<Option<StoredAssessments>, StoreError> {
        let row = sqlx::query("SELECT payload FROM assessment_sets WHERE cache_key = $1")
            .bind(key.as_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(row) => {
                let payload: serde_json::Value = row.try_get("payload").map_err(backend)?;
                Ok(Some(serde_json::from_value(payload)?))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &AssessmentKey, value: &StoredAssessments) -> Result<(), StoreError> {
        let payload = serde_json::to_value(value)?;
        sqlx::query(
            r#"
            INSERT INTO assessment_sets (cache_key, lesson_id, learner_id, lesson_revision, payload)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (cache_key) DO UPDATE
            SET lesson_revision = EXCLUDED.lesson_revision,
                payload = EXCLUDED.payload,
                updated_at = now()
            "#,
        )
        .bind(key.as_string())
        .bind(&key.lesson_id)
        .bind(&key.learner_id)
        .bind(&value.lesson_revision)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        debug!(key = %key.as_string(), "Stored assessment sets");
        Ok(())
    }

    async fn clear(&self, key: &AssessmentKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM assessment_sets WHERE cache_key = $1")
            .bind(key.as_string())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
