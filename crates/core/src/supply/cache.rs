//! Assessment Set Generator
//!
//! Generates worksheet and test sets once per lesson and learner, persists
//! them behind an [`AssessmentStore`], and regenerates whenever the cached
//! entry no longer matches the lesson or the configured lengths.

use super::SupplyError;
use super::assessment::{Quotas, build_assessment_set};
use crate::lesson::{Lesson, QuestionItem};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentKind {
    Worksheet,
    Test,
}

impl AssessmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AssessmentKind::Worksheet => "worksheet",
            AssessmentKind::Test => "test",
        }
    }
}

impl fmt::Display for AssessmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key: lesson identity, learner identity and configured target lengths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssessmentKey {
    pub lesson_id: String,
    pub learner_id: String,
    pub worksheet_length: usize,
    pub test_length: usize,
}

impl AssessmentKey {
    pub fn new(
        lesson_id: impl Into<String>,
        learner_id: impl Into<String>,
        worksheet_length: usize,
        test_length: usize,
    ) -> Self {
        Self {
            lesson_id: lesson_id.into(),
            learner_id: learner_id.into(),
            worksheet_length,
            test_length,
        }
    }

    /// Store key. Ids are length-prefixed so no id can run into the next field.
    pub fn as_string(&self) -> String {
        format!(
            "{}:{}|{}:{}|{}|{}",
            self.lesson_id.len(),
            self.lesson_id,
            self.learner_id.len(),
            self.learner_id,
            self.worksheet_length,
            self.test_length
        )
    }
}

/// A persisted pair of assessment sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAssessments {
    /// Lesson revision the sets were generated from.
    pub lesson_revision: String,
    /// [`Lesson::fingerprint`] at generation time.
    #[serde(default)]
    pub lesson_fingerprint: String,
    pub worksheet: Vec<QuestionItem>,
    pub test: Vec<QuestionItem>,
}

impl StoredAssessments {
    pub fn set(&self, kind: AssessmentKind) -> &[QuestionItem] {
        match kind {
            AssessmentKind::Worksheet => &self.worksheet,
            AssessmentKind::Test => &self.test,
        }
    }

    /// Why this entry cannot be reused for `lesson` under `key`, if it can't.
    pub fn mismatch(&self, lesson: &Lesson, key: &AssessmentKey) -> Option<&'static str> {
        if self.lesson_revision != lesson.revision {
            return Some("lesson revision changed");
        }
        if self.lesson_fingerprint != lesson.fingerprint() {
            return Some("lesson questions changed");
        }
        if self.worksheet.len() != key.worksheet_length || self.test.len() != key.test_length {
            return Some("stored lengths differ from configuration");
        }
        let stale = self
            .worksheet
            .iter()
            .chain(&self.test)
            .any(|item| !lesson.contains_prompt(&item.prompt_key()));
        if stale {
            return Some("stored prompt no longer in lesson");
        }
        None
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("assessment store backend error: {0}")]
    Backend(String),
    #[error("failed to (de)serialize stored assessments: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// External cache for generated assessment sets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn get(&self, key: &AssessmentKey) -> Result<Option<StoredAssessments>, StoreError>;
    async fn set(&self, key: &AssessmentKey, value: &StoredAssessments) -> Result<(), StoreError>;
    async fn clear(&self, key: &AssessmentKey) -> Result<(), StoreError>;
}

/// Process-local store, used when no database is configured.
#[derive(Default)]
pub struct InMemoryAssessmentStore {
    entries: RwLock<HashMap<String, StoredAssessments>>,
}

impl InMemoryAssessmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssessmentStore for InMemoryAssessmentStore {
    async fn get(&self, key: &AssessmentKey) -> Result<Option<StoredAssessments>, StoreError> {
        Ok(self.entries.read().await.get(&key.as_string()).cloned())
    }

    async fn set(&self, key: &AssessmentKey, value: &StoredAssessments) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.as_string(), value.clone());
        Ok(())
    }

    async fn clear(&self, key: &AssessmentKey) -> Result<(), StoreError> {
        self.entries.write().await.remove(&key.as_string());
        Ok(())
    }
}

/// Builds assessment sets and keeps the cache consistent with the lesson.
///
/// Store failures never block a session: they are logged and the sets are
/// generated fresh.
#[derive(Clone)]
pub struct AssessmentGenerator {
    store: Arc<dyn AssessmentStore>,
    quotas: Quotas,
}

impl AssessmentGenerator {
    pub fn new(store: Arc<dyn AssessmentStore>, quotas: Quotas) -> Self {
        Self { store, quotas }
    }

    /// Returns the cached sets for `key`, regenerating them when missing or stale.
    pub async fn ensure<R: Rng + Send + ?Sized>(
        &self,
        lesson: &Lesson,
        key: &AssessmentKey,
        rng: &mut R,
    ) -> Result<StoredAssessments, SupplyError> {
        match self.store.get(key).await {
            Ok(Some(stored)) => match stored.mismatch(lesson, key) {
                None => {
                    debug!(key = %key.as_string(), "Reusing cached assessment sets");
                    return Ok(stored);
                }
                Some(reason) => {
                    info!(key = %key.as_string(), reason, "Discarding cached assessment sets");
                    if let Err(e) = self.store.clear(key).await {
                        warn!(error = %e, "Failed to clear stale assessment sets");
                    }
                }
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Assessment store read failed, generating fresh sets"),
        }
        self.generate(lesson, key, rng).await
    }

    /// Discards any cached sets for `key` and generates both sets anew.
    pub async fn refresh<R: Rng + Send + ?Sized>(
        &self,
        lesson: &Lesson,
        key: &AssessmentKey,
        rng: &mut R,
    ) -> Result<StoredAssessments, SupplyError> {
        info!(key = %key.as_string(), "Refreshing assessment sets");
        self.discard(key).await;
        self.generate(lesson, key, rng).await
    }

    /// Drops the cached sets for `key`, e.g. once the lesson is complete.
    pub async fn discard(&self, key: &AssessmentKey) {
        if let Err(e) = self.store.clear(key).await {
            warn!(key = %key.as_string(), error = %e, "Failed to clear assessment sets");
        }
    }

    async fn generate<R: Rng + Send + ?Sized>(
        &self,
        lesson: &Lesson,
        key: &AssessmentKey,
        rng: &mut R,
    ) -> Result<StoredAssessments, SupplyError> {
        let stored = StoredAssessments {
            lesson_revision: lesson.revision.clone(),
            lesson_fingerprint: lesson.fingerprint(),
            worksheet: build_assessment_set(lesson, key.worksheet_length, &self.quotas, rng)?,
            test: build_assessment_set(lesson, key.test_length, &self.quotas, rng)?,
        };
        if let Err(e) = self.store.set(key, &stored).await {
            warn!(key = %key.as_string(), error = %e, "Failed to persist assessment sets");
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lesson::Category;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn lesson(revision: &str) -> Lesson {
        let mut lesson = Lesson::new("fractions", "Fractions");
        lesson.revision = revision.to_string();
        lesson.true_false = (0..6)
            .map(|i| QuestionItem::new(format!("statement {i}"), "true", Category::TrueFalse))
            .collect();
        lesson
    }

    fn key() -> AssessmentKey {
        AssessmentKey::new("fractions", "learner-1", 4, 3)
    }

    #[tokio::test]
    async fn test_ensure_generates_then_reuses() {
        let store = Arc::new(InMemoryAssessmentStore::new());
        let generator = AssessmentGenerator::new(store.clone(), Quotas::default());
        let mut rng = StdRng::seed_from_u64(7);
        let lesson = lesson("r1");

        let first = generator.ensure(&lesson, &key(), &mut rng).await.unwrap();
        assert_eq!(first.worksheet.len(), 4);
        assert_eq!(first.test.len(), 3);

        let second = generator.ensure(&lesson, &key(), &mut rng).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_revision_change_invalidates_cache() {
        let store = Arc::new(InMemoryAssessmentStore::new());
        let generator = AssessmentGenerator::new(store.clone(), Quotas::default());
        let mut rng = StdRng::seed_from_u64(7);

        generator.ensure(&lesson("r1"), &key(), &mut rng).await.unwrap();
        let regenerated = generator.ensure(&lesson("r2"), &key(), &mut rng).await.unwrap();
        assert_eq!(regenerated.lesson_revision, "r2");
        let cached = store.get(&key()).await.unwrap().unwrap();
        assert_eq!(cached.lesson_revision, "r2");
    }

    #[test]
    fn test_mismatch_detects_lengths_and_removed_prompts() {
        let lesson = lesson("r1");
        let stored = StoredAssessments {
            lesson_revision: "r1".into(),
            lesson_fingerprint: lesson.fingerprint(),
            worksheet: lesson.true_false[..4].to_vec(),
            test: lesson.true_false[..3].to_vec(),
        };
        assert_eq!(stored.mismatch(&lesson, &key()), None);

        let longer = AssessmentKey::new("fractions", "learner-1", 5, 3);
        assert!(stored.mismatch(&lesson, &longer).is_some());

        let mut edited = lesson.clone();
        edited.true_false.remove(0);
        assert!(stored.mismatch(&edited, &key()).is_some());
    }

    #[tokio::test]
    async fn test_store_failures_do_not_block_generation() {
        let mut store = MockAssessmentStore::new();
        store
            .expect_get()
            .returning(|_| Err(StoreError::Backend("down".into())));
        store
            .expect_set()
            .times(1)
            .returning(|_, _| Err(StoreError::Backend("down".into())));
        let generator = AssessmentGenerator::new(Arc::new(store), Quotas::default());
        let mut rng = StdRng::seed_from_u64(1);

        let sets = generator.ensure(&lesson("r1"), &key(), &mut rng).await.unwrap();
        assert_eq!(sets.worksheet.len(), 4);
    }

    #[tokio::test]
    async fn test_refresh_clears_before_regenerating() {
        let mut store = MockAssessmentStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_clear()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        store
            .expect_set()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        let generator = AssessmentGenerator::new(Arc::new(store), Quotas::default());
        let mut rng = StdRng::seed_from_u64(1);

        generator.refresh(&lesson("r1"), &key(), &mut rng).await.unwrap();
    }

    #[tokio::test]
    async fn test_edited_answers_invalidate_cache_without_revision() {
        let store = Arc::new(InMemoryAssessmentStore::new());
        let generator = AssessmentGenerator::new(store.clone(), Quotas::default());
        let mut rng = StdRng::seed_from_u64(7);
        let key = AssessmentKey::new("sums", "learner-1", 4, 0);

        let mut lesson = Lesson::new("sums", "Sums");
        lesson.samples = (0..4)
            .map(|i| QuestionItem::new(format!("sum {i}"), "old", Category::Sample))
            .collect();
        let first = generator.ensure(&lesson, &key, &mut rng).await.unwrap();
        assert!(first.worksheet.iter().all(|i| i.answers == ["old"]));

        for item in &mut lesson.samples {
            item.answers = vec!["new".to_string()];
        }
        let second = generator.ensure(&lesson, &key, &mut rng).await.unwrap();
        assert!(second.worksheet.iter().all(|i| i.answers == ["new"]));
    }

    #[tokio::test]
    async fn test_ids_containing_separators_get_distinct_entries() {
        let left = AssessmentKey::new("a:b", "c", 4, 3);
        let right = AssessmentKey::new("a", "b:c", 4, 3);
        assert_ne!(left.as_string(), right.as_string());

        let store = InMemoryAssessmentStore::new();
        let stored = StoredAssessments {
            lesson_revision: String::new(),
            lesson_fingerprint: String::new(),
            worksheet: Vec::new(),
            test: Vec::new(),
        };
        store.set(&left, &stored).await.unwrap();
        assert!(store.get(&right).await.unwrap().is_none());
        assert!(store.get(&left).await.unwrap().is_some());
    }
}
