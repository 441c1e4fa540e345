use crate::lesson::{Lesson, QuestionItem};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::VecDeque;

/// Builds the mixed question pool used for comprehension checks.
///
/// The default subject merges generic samples with every category pool.
/// Other subjects use generic samples alone and fall back to true/false,
/// multiple-choice and fill-in-the-blank (never short-answer) when the lesson
/// has no samples.
pub fn build_qa_pool<R: Rng + ?Sized>(lesson: &Lesson, rng: &mut R) -> Vec<QuestionItem> {
    let valid_choices = lesson
        .multiple_choice
        .iter()
        .filter(|i| i.has_valid_options())
        .cloned();
    let mut pool: Vec<QuestionItem> = if lesson.is_default_subject() {
        lesson
            .samples
            .iter()
            .chain(&lesson.true_false)
            .cloned()
            .chain(valid_choices)
            .chain(lesson.fill_in_blank.iter().cloned())
            .chain(lesson.short_answer.iter().cloned())
            .collect()
    } else if !lesson.samples.is_empty() {
        lesson.samples.clone()
    } else {
        lesson
            .true_false
            .iter()
            .cloned()
            .chain(valid_choices)
            .chain(lesson.fill_in_blank.iter().cloned())
            .collect()
    };
    pool.shuffle(rng);
    pool
}

/// An ad-hoc shuffled list consumed head-first.
#[derive(Debug, Clone, Default)]
pub struct Pool {
    items: VecDeque<QuestionItem>,
}

impl Pool {
    pub fn from_items(items: Vec<QuestionItem>) -> Self {
        Self {
            items: items.into(),
        }
    }

    pub fn next(&mut self) -> Option<QuestionItem> {
        self.items.pop_front()
    }

    /// Rebuilds the pool from the lesson.
    pub fn refill<R: Rng + ?Sized>(&mut self, lesson: &Lesson, rng: &mut R) {
        self.items = build_qa_pool(lesson, rng).into();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lesson::Category;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn lesson(subject: Option<&str>, with_samples: bool) -> Lesson {
        let mut lesson = Lesson::new("l1", "Lesson");
        lesson.subject = subject.map(str::to_string);
        if with_samples {
            lesson.samples = vec![QuestionItem::new("s1", "1", Category::Sample)];
        }
        lesson.true_false = vec![QuestionItem::new("tf1", "true", Category::TrueFalse)];
        lesson.multiple_choice = vec![
            QuestionItem::new("mc1", "A", Category::MultipleChoice)
                .with_options(vec!["x".into(), "y".into()]),
            QuestionItem::new("mc-bad", "Z", Category::MultipleChoice),
        ];
        lesson.fill_in_blank = vec![QuestionItem::new("fib1", "cat", Category::FillInBlank)];
        lesson.short_answer = vec![QuestionItem::new("sa1", "", Category::ShortAnswer)];
        lesson
    }

    fn prompts(items: &[QuestionItem]) -> Vec<String> {
        let mut p: Vec<String> = items.iter().map(|i| i.prompt.clone()).collect();
        p.sort();
        p
    }

    #[test]
    fn test_default_subject_merges_everything_valid() {
        let mut rng = StdRng::seed_from_u64(9);
        let pool = build_qa_pool(&lesson(None, true), &mut rng);
        assert_eq!(prompts(&pool), vec!["fib1", "mc1", "s1", "sa1", "tf1"]);
    }

    #[test]
    fn test_other_subject_prefers_samples() {
        let mut rng = StdRng::seed_from_u64(9);
        let pool = build_qa_pool(&lesson(Some("reading"), true), &mut rng);
        assert_eq!(prompts(&pool), vec!["s1"]);
    }

    #[test]
    fn test_other_subject_fallback_excludes_short_answer() {
        let mut rng = StdRng::seed_from_u64(9);
        let pool = build_qa_pool(&lesson(Some("science"), false), &mut rng);
        assert_eq!(prompts(&pool), vec!["fib1", "mc1", "tf1"]);
    }

    #[test]
    fn test_pool_consumes_head_first_and_refills() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut pool = Pool::from_items(vec![
            QuestionItem::new("a", "1", Category::Sample),
            QuestionItem::new("b", "2", Category::Sample),
        ]);
        assert_eq!(pool.next().unwrap().prompt, "a");
        assert_eq!(pool.next().unwrap().prompt, "b");
        assert!(pool.next().is_none());
        pool.refill(&lesson(None, true), &mut rng);
        assert_eq!(pool.len(), 5);
    }
}
