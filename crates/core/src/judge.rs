//! Answer Judge
//!
//! Normalizes learner text and compares it against an item's accepted answers
//! or keyword threshold. For model-mediated turns the judge does not decide on
//! its own: it packages the comparison contract into a directive that the
//! dialogue service is instructed to apply.

use crate::lesson::{Category, QuestionItem};
use crate::verdict::{CORRECT_LEAD_IN, NOT_QUITE_LEAD_IN};
use serde::Serialize;
use std::collections::BTreeSet;

const NUMBER_WORDS: [&str; 21] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen", "twenty",
];

/// Digit form of a number word between zero and twenty.
pub fn digit_for_word(word: &str) -> Option<u8> {
    NUMBER_WORDS.iter().position(|w| *w == word).map(|i| i as u8)
}

/// Word form of a number between 0 and 20.
pub fn word_for_digit(token: &str) -> Option<&'static str> {
    token
        .parse::<usize>()
        .ok()
        .and_then(|n| NUMBER_WORDS.get(n).copied())
}

/// Lowercases, replaces punctuation and symbols with spaces, collapses
/// whitespace and maps the number words "zero" to "twenty" onto digits.
///
/// Idempotent: normalizing an already normalized string returns it unchanged.
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .map(|token| match digit_for_word(token) {
            Some(n) => n.to_string(),
            None => token.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Spells digits 0 to 20 back out as words, for showing both forms in a contract.
pub fn spell_numbers(normalized: &str) -> String {
    normalized
        .split_whitespace()
        .map(|token| word_for_digit(token).unwrap_or(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Letter label for the option at `index` ("A", "B", ...).
pub fn option_label(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

/// Every normalized form an exact-mode answer may take.
///
/// Multiple-choice items additionally accept the correct option's letter
/// (either case, which normalization folds) and its cleaned option text.
pub fn accepted_variants(item: &QuestionItem) -> Vec<String> {
    let mut variants = BTreeSet::new();
    for answer in &item.answers {
        let n = normalize(answer);
        if !n.is_empty() {
            variants.insert(n);
        }
    }
    if item.category == Category::MultipleChoice {
        if let Some(i) = item.correct_option_index() {
            variants.insert(option_label(i).to_ascii_lowercase().to_string());
            let text = normalize(&item.options[i]);
            if !text.is_empty() {
                variants.insert(text);
            }
        }
    }
    variants.into_iter().collect()
}

/// Correct iff the normalized answer equals one of the accepted variants.
pub fn judge_exact(item: &QuestionItem, answer: &str) -> bool {
    let answer = normalize(answer);
    !answer.is_empty() && accepted_variants(item).contains(&answer)
}

/// Number of distinct keywords found in the answer as whole-word matches.
pub fn keyword_hits(keywords: &[String], answer: &str) -> usize {
    let haystack = format!(" {} ", normalize(answer));
    let distinct: BTreeSet<String> = keywords
        .iter()
        .map(|k| normalize(k))
        .filter(|k| !k.is_empty())
        .collect();
    distinct
        .iter()
        .filter(|k| haystack.contains(&format!(" {} ", k)))
        .count()
}

/// Effective minimum keyword count for a short-answer item.
pub fn keyword_threshold(item: &QuestionItem) -> usize {
    let available = item.keywords.len().max(1);
    item.min_keywords.unwrap_or(1).clamp(1, available)
}

/// Correct iff at least the item's minimum number of distinct keywords appear,
/// regardless of order or extra words.
pub fn judge_short_answer(item: &QuestionItem, answer: &str) -> bool {
    keyword_hits(&item.keywords, answer) >= keyword_threshold(item)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeMode {
    Exact,
    Keywords,
}

/// Local judgment of an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Judgment {
    pub mode: JudgeMode,
    pub correct: bool,
}

pub fn judge(item: &QuestionItem, answer: &str) -> Judgment {
    if item.is_keyword_judged() {
        Judgment {
            mode: JudgeMode::Keywords,
            correct: judge_short_answer(item, answer),
        }
    } else {
        Judgment {
            mode: JudgeMode::Exact,
            correct: judge_exact(item, answer),
        }
    }
}

/// The comparison contract the dialogue service is told to apply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgeContract {
    pub prompt: String,
    pub mode: JudgeMode,
    pub expected: String,
    pub accepted: Vec<String>,
    pub keywords: Vec<String>,
    pub min_keywords: usize,
}

impl JudgeContract {
    pub fn for_item(item: &QuestionItem) -> Self {
        let keyworded = item.is_keyword_judged();
        let mut accepted = Vec::new();
        if !keyworded {
            for variant in accepted_variants(item) {
                let spelled = spell_numbers(&variant);
                if spelled != variant {
                    accepted.push(spelled);
                }
                accepted.push(variant);
            }
        }
        Self {
            prompt: item.prompt.clone(),
            mode: if keyworded {
                JudgeMode::Keywords
            } else {
                JudgeMode::Exact
            },
            expected: expected_answer(item),
            accepted,
            keywords: if keyworded {
                item.keywords.clone()
            } else {
                Vec::new()
            },
            min_keywords: if keyworded { keyword_threshold(item) } else { 0 },
        }
    }

    /// Directive text for judging `learner_answer` against this contract.
    pub fn directive(&self, learner_answer: &str) -> String {
        let mut out = String::new();
        out.push_str("Judge the learner's answer using only the rules below.\n");
        out.push_str(&format!("Question: {}\n", self.prompt));
        out.push_str(&format!("Expected answer: {}\n", self.expected));
        out.push_str(&format!("Learner answer: \"{}\"\n", learner_answer.trim()));
        out.push_str(
            "Normalization: ignore case, punctuation and extra spaces; number words zero to twenty equal their digits.\n",
        );
        match self.mode {
            JudgeMode::Exact => {
                out.push_str(&format!(
                    "The answer is correct only if, after normalization, it equals one of: {}.\n",
                    self.accepted.join(" | ")
                ));
            }
            JudgeMode::Keywords => {
                out.push_str(&format!(
                    "The answer is correct if it contains at least {} of these keywords as whole words, in any order: {}.\n",
                    self.min_keywords,
                    self.keywords.join(", ")
                ));
            }
        }
        out.push_str(&format!(
            "Begin your reply with exactly \"{}\" if correct or exactly \"{}\" if not, then give one short, kind sentence of feedback. Do not ask a new question.",
            CORRECT_LEAD_IN, NOT_QUITE_LEAD_IN
        ));
        out
    }
}

/// Human-readable expected answer, used in directives and review.
pub fn expected_answer(item: &QuestionItem) -> String {
    if item.is_keyword_judged() {
        return format!("an answer mentioning {}", item.keywords.join(", "));
    }
    if item.category == Category::MultipleChoice {
        if let Some(i) = item.correct_option_index() {
            return format!("{}. {}", option_label(i), item.options[i].trim());
        }
    }
    item.primary_answer().unwrap_or_default().trim().to_string()
}
