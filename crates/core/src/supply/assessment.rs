use super::SupplyError;
use crate::lesson::{Category, Lesson, QuestionItem};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Category mix for assessment sets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quotas {
    /// Target share of word problems.
    pub word_problem_share: f64,
    /// Cap on short-answer items as a share of the target length.
    pub short_answer_cap: f64,
    /// Cap on fill-in-the-blank items as a share of the target length.
    pub fill_in_blank_cap: f64,
}

impl Default for Quotas {
    fn default() -> Self {
        Self {
            word_problem_share: 0.3,
            short_answer_cap: 0.1,
            fill_in_blank_cap: 0.1,
        }
    }
}

impl Quotas {
    fn count(share: f64, target: usize) -> usize {
        ((target as f64) * share).round().max(0.0) as usize
    }
}

/// Accumulates a set while refusing repeated prompts.
struct Selection {
    target: usize,
    chosen: Vec<QuestionItem>,
    seen: HashSet<String>,
}

impl Selection {
    fn new(target: usize) -> Self {
        Self {
            target,
            chosen: Vec::with_capacity(target),
            seen: HashSet::new(),
        }
    }

    fn is_full(&self) -> bool {
        self.chosen.len() >= self.target
    }

    /// Takes up to `limit` unseen items from `source`, in order.
    fn take_from(&mut self, source: &[QuestionItem], limit: usize) -> usize {
        let mut taken = 0;
        for item in source {
            if taken >= limit || self.is_full() {
                break;
            }
            if self.seen.insert(item.prompt_key()) {
                self.chosen.push(item.clone());
                taken += 1;
            }
        }
        taken
    }
}

fn shuffled<R: Rng + ?Sized>(items: &[QuestionItem], rng: &mut R) -> Vec<QuestionItem> {
    let mut items = items.to_vec();
    items.shuffle(rng);
    items
}

/// Builds an assessment set of exactly `target` items.
///
/// 1. A quota-mixed base: about 30% word problems, short-answer and
///    fill-in-the-blank each capped at about 10%, the rest from samples,
///    true/false and multiple-choice.
/// 2. Top-up from any unused items without repeating a chosen prompt
///    (uncapped categories first, capped categories last).
/// 3. Only if still short, repeat items by cycling through the combined pool.
pub fn build_assessment_set<R: Rng + ?Sized>(
    lesson: &Lesson,
    target: usize,
    quotas: &Quotas,
    rng: &mut R,
) -> Result<Vec<QuestionItem>, SupplyError> {
    if target == 0 {
        return Ok(Vec::new());
    }

    let word_problems = shuffled(lesson.pool(Category::WordProblem), rng);
    let short_answer = shuffled(lesson.pool(Category::ShortAnswer), rng);
    let fill_in_blank = shuffled(lesson.pool(Category::FillInBlank), rng);
    let general: Vec<QuestionItem> = {
        let mut items: Vec<QuestionItem> = lesson
            .samples
            .iter()
            .chain(&lesson.true_false)
            .cloned()
            .chain(
                lesson
                    .multiple_choice
                    .iter()
                    .filter(|i| i.has_valid_options())
                    .cloned(),
            )
            .collect();
        items.shuffle(rng);
        items
    };

    let mut selection = Selection::new(target);
    selection.take_from(
        &word_problems,
        Quotas::count(quotas.word_problem_share, target),
    );
    selection.take_from(&short_answer, Quotas::count(quotas.short_answer_cap, target));
    selection.take_from(
        &fill_in_blank,
        Quotas::count(quotas.fill_in_blank_cap, target),
    );
    selection.take_from(&general, target);

    if !selection.is_full() {
        selection.take_from(&word_problems, target);
        selection.take_from(&general, target);
    }
    if !selection.is_full() {
        selection.take_from(&short_answer, target);
        selection.take_from(&fill_in_blank, target);
    }

    let mut set = selection.chosen;
    if set.len() < target {
        let combined: Vec<QuestionItem> = general
            .iter()
            .chain(&word_problems)
            .chain(&fill_in_blank)
            .chain(&short_answer)
            .cloned()
            .collect();
        if combined.is_empty() {
            return Err(SupplyError::NoContent);
        }
        warn!(
            lesson_id = %lesson.id,
            available = set.len(),
            target,
            "Not enough distinct questions, repeating items"
        );
        let mut i = 0;
        while set.len() < target {
            set.push(combined[i % combined.len()].clone());
            i += 1;
        }
    }

    set.shuffle(rng);
    debug!(lesson_id = %lesson.id, target, "Built assessment set");
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn numbered(prefix: &str, n: usize, category: Category) -> Vec<QuestionItem> {
        (0..n)
            .map(|i| {
                let item = QuestionItem::new(format!("{prefix} {i}"), "A", category);
                if category == Category::MultipleChoice {
                    item.with_options(vec!["yes".into(), "no".into()])
                } else {
                    item
                }
            })
            .collect()
    }

    fn distinct_prompts(set: &[QuestionItem]) -> usize {
        set.iter().map(|i| i.prompt_key()).collect::<HashSet<_>>().len()
    }

    #[test]
    fn test_true_false_and_choice_lesson_fills_worksheet_of_eight() {
        let mut lesson = Lesson::new("l", "Lesson");
        lesson.true_false = numbered("tf", 5, Category::TrueFalse);
        lesson.multiple_choice = numbered("mc", 5, Category::MultipleChoice);
        let mut rng = StdRng::seed_from_u64(42);

        let set = build_assessment_set(&lesson, 8, &Quotas::default(), &mut rng).unwrap();
        assert_eq!(set.len(), 8);
        assert_eq!(distinct_prompts(&set), 8);
        let capped = set
            .iter()
            .filter(|i| matches!(i.category, Category::ShortAnswer | Category::FillInBlank))
            .count();
        assert!(capped <= 1);
    }

    #[test]
    fn test_quotas_shape_the_base_selection() {
        let mut lesson = Lesson::new("l", "Lesson");
        lesson.word_problems = numbered("wp", 10, Category::WordProblem);
        lesson.short_answer = numbered("sa", 10, Category::ShortAnswer);
        lesson.fill_in_blank = numbered("fib", 10, Category::FillInBlank);
        lesson.true_false = numbered("tf", 10, Category::TrueFalse);
        let mut rng = StdRng::seed_from_u64(1);

        let set = build_assessment_set(&lesson, 10, &Quotas::default(), &mut rng).unwrap();
        let count = |c| set.iter().filter(|i| i.category == c).count();
        assert_eq!(set.len(), 10);
        assert_eq!(count(Category::WordProblem), 3);
        assert_eq!(count(Category::ShortAnswer), 1);
        assert_eq!(count(Category::FillInBlank), 1);
        assert_eq!(count(Category::TrueFalse), 5);
    }

    #[test]
    fn test_sufficient_content_never_duplicates() {
        let mut lesson = Lesson::new("l", "Lesson");
        lesson.word_problems = numbered("wp", 2, Category::WordProblem);
        lesson.short_answer = numbered("sa", 6, Category::ShortAnswer);
        lesson.samples = numbered("s", 3, Category::Sample);
        let mut rng = StdRng::seed_from_u64(8);
        for target in 1..=11 {
            let set = build_assessment_set(&lesson, target, &Quotas::default(), &mut rng).unwrap();
            assert_eq!(set.len(), target);
            assert_eq!(distinct_prompts(&set), target, "target {target}");
        }
    }

    #[test]
    fn test_short_content_repeats_to_reach_target() {
        let mut lesson = Lesson::new("l", "Lesson");
        lesson.samples = numbered("s", 3, Category::Sample);
        let mut rng = StdRng::seed_from_u64(8);
        let set = build_assessment_set(&lesson, 7, &Quotas::default(), &mut rng).unwrap();
        assert_eq!(set.len(), 7);
        assert_eq!(distinct_prompts(&set), 3);
    }

    #[test]
    fn test_empty_lesson_is_an_error() {
        let lesson = Lesson::new("l", "Lesson");
        let mut rng = StdRng::seed_from_u64(8);
        assert!(matches!(
            build_assessment_set(&lesson, 3, &Quotas::default(), &mut rng),
            Err(SupplyError::NoContent)
        ));
        assert!(build_assessment_set(&lesson, 0, &Quotas::default(), &mut rng)
            .unwrap()
            .is_empty());
    }
}
