//! Question Supply Manager
//!
//! Shuffled, non-repeating decks and pools of question items for the
//! comprehension and exercise phases, plus the fixed-size assessment sets used
//! by the worksheet and test phases.

pub mod assessment;
pub mod cache;
pub mod deck;
pub mod pool;

pub use assessment::{Quotas, build_assessment_set};
pub use cache::{
    AssessmentGenerator, AssessmentKey, AssessmentKind, AssessmentStore, InMemoryAssessmentStore,
    StoreError, StoredAssessments,
};
pub use deck::Deck;
pub use pool::{Pool, build_qa_pool};

use crate::lesson::{Category, Lesson, QuestionItem};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SupplyError {
    #[error("the lesson has no questions to draw from")]
    NoContent,
}

/// Per-session question supply. Decks and the pool persist for the session.
pub struct QuestionSupply {
    lesson: Arc<Lesson>,
    rng: StdRng,
    pool: Pool,
    decks: HashMap<Category, Deck>,
}

impl QuestionSupply {
    pub fn new(lesson: Arc<Lesson>) -> Self {
        Self::with_rng(lesson, StdRng::from_os_rng())
    }

    /// Builds the supply with a caller-provided generator, for reproducible shuffles.
    pub fn with_rng(lesson: Arc<Lesson>, mut rng: StdRng) -> Self {
        let pool = Pool::from_items(build_qa_pool(&lesson, &mut rng));
        let mut decks = HashMap::new();
        for category in [Category::WordProblem, Category::Sample] {
            let items = lesson.pool(category).to_vec();
            if !items.is_empty() {
                decks.insert(category, Deck::new(category, items, &mut rng));
            }
        }
        debug!(
            lesson_id = %lesson.id,
            pool = pool.len(),
            decks = decks.len(),
            "Question supply initialised"
        );
        Self {
            lesson,
            rng,
            pool,
            decks,
        }
    }

    pub fn lesson(&self) -> &Lesson {
        &self.lesson
    }

    /// Next comprehension question, rebuilding the pool from the lesson once
    /// it runs dry.
    pub fn next_comprehension(&mut self) -> Result<QuestionItem, SupplyError> {
        if let Some(item) = self.pool.next() {
            return Ok(item);
        }
        info!(lesson_id = %self.lesson.id, "Question pool exhausted, rebuilding");
        self.pool.refill(&self.lesson, &mut self.rng);
        self.pool.next().ok_or(SupplyError::NoContent)
    }

    /// Next exercise question: word problems first, then generic samples, then
    /// the mixed pool.
    pub fn next_exercise(&mut self) -> Result<QuestionItem, SupplyError> {
        for category in [Category::WordProblem, Category::Sample] {
            if let Some(deck) = self.decks.get_mut(&category) {
                if let Some(item) = deck.draw(&mut self.rng) {
                    return Ok(item);
                }
            }
        }
        self.next_comprehension()
    }

    /// Mutable access to the session generator for components sharing it.
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson() -> Arc<Lesson> {
        let mut lesson = Lesson::new("l", "Lesson");
        lesson.true_false = vec![
            QuestionItem::new("tf1", "true", Category::TrueFalse),
            QuestionItem::new("tf2", "false", Category::TrueFalse),
        ];
        lesson.word_problems = vec![QuestionItem::new("wp1", "3", Category::WordProblem)];
        Arc::new(lesson)
    }

    #[test]
    fn test_comprehension_rebuilds_pool_when_exhausted() {
        let mut supply = QuestionSupply::with_rng(lesson(), StdRng::seed_from_u64(4));
        let prompts: Vec<String> = (0..5)
            .map(|_| supply.next_comprehension().unwrap().prompt)
            .collect();
        assert_eq!(prompts.len(), 5);
        assert!(prompts.iter().all(|p| p.starts_with("tf")));
    }

    #[test]
    fn test_exercise_prefers_word_problems() {
        let mut supply = QuestionSupply::with_rng(lesson(), StdRng::seed_from_u64(4));
        assert_eq!(supply.next_exercise().unwrap().prompt, "wp1");
        assert_eq!(supply.next_exercise().unwrap().prompt, "wp1");
    }

    #[test]
    fn test_empty_lesson_reports_no_content() {
        let mut supply = QuestionSupply::with_rng(
            Arc::new(Lesson::new("empty", "Empty")),
            StdRng::seed_from_u64(1),
        );
        assert!(matches!(supply.next_comprehension(), Err(SupplyError::NoContent)));
        assert!(matches!(supply.next_exercise(), Err(SupplyError::NoContent)));
    }
}
