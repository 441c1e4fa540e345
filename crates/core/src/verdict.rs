//! Cue-Phrase Protocol
//!
//! Extracts structured verdicts from free-text dialogue replies. The dialogue
//! service is told to emit fixed sentinel phrases verbatim; this module scans
//! for them by exact substring match. A missing sentinel always reads as
//! "incorrect".

use rand::Rng;
use rand::seq::IndexedRandom;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

pub const CORRECT_LEAD_IN: &str = "Correct!";
pub const NOT_QUITE_LEAD_IN: &str = "Not quite right.";

/// Celebratory sentinels marking a correct test answer during review.
///
/// No phrase is a substring of another.
pub const CUE_PHRASES: [&str; 16] = [
    "Way to go, superstar!",
    "You nailed it!",
    "Fantastic work, brainiac!",
    "Brilliant thinking!",
    "Spot on, champion!",
    "Terrific job, ace!",
    "Outstanding answer!",
    "High five for that one!",
    "Super smart work!",
    "Bravo, that's perfect!",
    "You're on fire!",
    "Gold star for you!",
    "Magnificent effort!",
    "That's the spirit, genius!",
    "Hooray, right on target!",
    "Top marks, well done!",
];

/// Verdict read from the opening of a judged reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadIn {
    Correct,
    NotQuite,
    Missing,
}

impl LeadIn {
    pub fn is_correct(self) -> bool {
        self == LeadIn::Correct
    }
}

/// Folds typographic quotes into their ASCII forms.
pub fn normalize_quotes(text: &str) -> String {
    text.replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
}

/// Reads the fixed lead-in token at the start of a reply.
///
/// Leading quotes, asterisks and whitespace are ignored; anything else
/// yields [`LeadIn::Missing`].
pub fn read_lead_in(reply: &str) -> LeadIn {
    let cleaned = normalize_quotes(reply);
    let trimmed = cleaned.trim_start_matches(|c: char| c.is_whitespace() || c == '*' || c == '"');
    if trimmed.starts_with(CORRECT_LEAD_IN) {
        LeadIn::Correct
    } else if trimmed.starts_with(NOT_QUITE_LEAD_IN) {
        LeadIn::NotQuite
    } else {
        LeadIn::Missing
    }
}

/// First phrase from `phrases` found verbatim in `text`.
pub fn find_cue<'a>(text: &str, phrases: &[&'a str]) -> Option<&'a str> {
    let cleaned = normalize_quotes(text);
    phrases.iter().copied().find(|p| cleaned.contains(p))
}

/// Number of occurrences of `phrase` in `text`.
pub fn count_cue(text: &str, phrase: &str) -> usize {
    if phrase.is_empty() {
        return 0;
    }
    normalize_quotes(text).matches(phrase).count()
}

/// Hands out cue phrases that have not been used yet in this session.
///
/// Once every phrase has been handed out the picker starts a fresh cycle.
#[derive(Debug, Clone, Default)]
pub struct CuePicker {
    used: HashSet<&'static str>,
}

impl CuePicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> &'static str {
        let mut fresh: Vec<&'static str> = CUE_PHRASES
            .iter()
            .copied()
            .filter(|p| !self.used.contains(p))
            .collect();
        if fresh.is_empty() {
            self.used.clear();
            fresh = CUE_PHRASES.to_vec();
        }
        let phrase = fresh.choose(rng).copied().unwrap_or(CUE_PHRASES[0]);
        self.used.insert(phrase);
        phrase
    }

    /// `n` phrases, distinct within the batch while the list allows.
    pub fn pick_many<R: Rng + ?Sized>(&mut self, n: usize, rng: &mut R) -> Vec<&'static str> {
        (0..n).map(|_| self.pick(rng)).collect()
    }
}

static QUESTION_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bquestion\s+(\d+)\s*[.:)]").expect("question heading pattern is valid")
});

/// Splits a full-review reply into per-question blocks on "Question N."
/// headings. Index `i` holds the text for question `i + 1`; missing headings
/// leave an empty block, repeated headings extend the earlier block.
pub fn split_question_blocks(reply: &str, total: usize) -> Vec<String> {
    let mut blocks = vec![String::new(); total];
    let headings: Vec<(usize, usize)> = QUESTION_HEADING
        .captures_iter(reply)
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let number = caps.get(1)?.as_str().parse::<usize>().ok()?;
            Some((start, number))
        })
        .collect();
    for (i, (start, number)) in headings.iter().enumerate() {
        let end = headings.get(i + 1).map(|(s, _)| *s).unwrap_or(reply.len());
        if *number >= 1 && *number <= total {
            blocks[*number - 1].push_str(&reply[*start..end]);
        }
    }
    blocks
}

/// Aggregate test score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewScore {
    pub correct: u32,
    pub total: u32,
    pub percent: u32,
}

impl ReviewScore {
    /// `percent = round(correct / total * 100)`; `correct` is clamped to `total`.
    pub fn new(correct: u32, total: u32) -> Self {
        let correct = correct.min(total);
        let percent = if total == 0 {
            0
        } else {
            ((correct as f64 / total as f64) * 100.0).round() as u32
        };
        Self {
            correct,
            total,
            percent,
        }
    }
}
