use crate::lesson::{Category, QuestionItem};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::debug;

/// A shuffled, fixed-order sequence over one question category.
///
/// No item repeats until the cursor passes the end; the deck then reshuffles
/// and starts over.
#[derive(Debug, Clone)]
pub struct Deck {
    category: Category,
    items: Vec<QuestionItem>,
    cursor: usize,
    cycles: usize,
}

impl Deck {
    pub fn new<R: Rng + ?Sized>(category: Category, mut items: Vec<QuestionItem>, rng: &mut R) -> Self {
        items.shuffle(rng);
        Self {
            category,
            items,
            cursor: 0,
            cycles: 0,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items left before the next reshuffle.
    pub fn remaining(&self) -> usize {
        self.items.len().saturating_sub(self.cursor)
    }

    /// Number of completed passes over the deck.
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<QuestionItem> {
        if self.items.is_empty() {
            return None;
        }
        if self.cursor >= self.items.len() {
            self.items.shuffle(rng);
            self.cursor = 0;
            self.cycles += 1;
            debug!(category = ?self.category, cycles = self.cycles, "Deck exhausted, reshuffled");
        }
        let item = self.items[self.cursor].clone();
        self.cursor += 1;
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::{HashMap, HashSet};

    fn items(n: usize) -> Vec<QuestionItem> {
        (0..n)
            .map(|i| QuestionItem::new(format!("prompt {i}"), i.to_string(), Category::Sample))
            .collect()
    }

    #[test]
    fn test_draws_within_deck_size_are_distinct() {
        let mut rng = StdRng::seed_from_u64(11);
        for n in 1..=8 {
            let mut deck = Deck::new(Category::Sample, items(8), &mut rng);
            let drawn: HashSet<String> = (0..n)
                .map(|_| deck.draw(&mut rng).unwrap().prompt)
                .collect();
            assert_eq!(drawn.len(), n);
        }
    }

    #[test]
    fn test_overdraw_repeats_at_most_once_per_extra_pass() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut deck = Deck::new(Category::Sample, items(5), &mut rng);
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..9 {
            *counts.entry(deck.draw(&mut rng).unwrap().prompt).or_default() += 1;
        }
        assert!(counts.values().all(|c| *c <= 2));
        assert_eq!(counts.len(), 5);
        assert_eq!(deck.cycles(), 1);
        assert_eq!(deck.remaining(), 1);
    }

    #[test]
    fn test_empty_deck_draws_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut deck = Deck::new(Category::WordProblem, Vec::new(), &mut rng);
        assert!(deck.draw(&mut rng).is_none());
        assert!(deck.is_empty());
    }
}
