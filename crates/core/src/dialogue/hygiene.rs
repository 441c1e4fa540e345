use super::StepKind;
use crate::text::{is_question, sentences};
use crate::verdict::normalize_quotes;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Gate question asked after teaching when the model offers none of its own.
pub const REPEAT_QUESTION: &str = "Would you like me to go over that again?";

static FUTURE_PHASE_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(worksheets?|tests?|quiz(zes)?|exercises?|exams?|comprehension checks?)\b",
    )
    .expect("future phase pattern is valid")
});

static REPEAT_OFFER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(again|repeat|go over|review)\b").expect("repeat offer pattern is valid")
});

static HEADING_MARKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*#+\s*").expect("heading pattern is valid"));

/// Post-processing rules for one step kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyHygiene {
    /// Drop sentences that mention phases the learner hasn't reached.
    pub strip_future_terms: bool,
    /// End with exactly one question (the repeat gate).
    pub terminal_question: bool,
    /// Drop questions entirely; feedback must not open a new exchange.
    pub no_questions: bool,
    /// Cue phrase that must appear at most once.
    pub required_cue: Option<String>,
}

impl ReplyHygiene {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn for_step(step: StepKind) -> Self {
        match step {
            StepKind::Greeting | StepKind::Banter => Self {
                strip_future_terms: true,
                ..Self::default()
            },
            StepKind::Teach => Self {
                strip_future_terms: true,
                terminal_question: true,
                ..Self::default()
            },
            StepKind::Judge => Self {
                no_questions: true,
                ..Self::default()
            },
            StepKind::Ask | StepKind::Review | StepKind::ReviewAll | StepKind::Closing => {
                Self::default()
            }
        }
    }

    pub fn with_cue(mut self, cue: impl Into<String>) -> Self {
        self.required_cue = Some(cue.into());
        self
    }

    pub fn apply(&self, raw: &str) -> String {
        let text = normalize_quotes(raw).replace('*', "");
        let text = HEADING_MARKS.replace_all(&text, "").into_owned();
        let mut parts = sentences(&text);

        if self.strip_future_terms {
            parts = keep_unless_empty(parts, |s| !FUTURE_PHASE_TERMS.is_match(s));
        }
        if self.no_questions {
            parts = keep_unless_empty(parts, |s| !is_question(s));
        }
        if self.terminal_question {
            let gate = parts
                .iter()
                .rev()
                .find(|s| is_question(s) && REPEAT_OFFER.is_match(s))
                .cloned()
                .unwrap_or_else(|| REPEAT_QUESTION.to_string());
            parts.retain(|s| !is_question(s));
            parts.push(gate);
        }

        let mut out = parts.join(" ");
        if let Some(cue) = &self.required_cue {
            out = keep_first_occurrence(&out, cue);
        }
        out
    }
}

/// Filters sentences, keeping the original list if nothing would survive.
fn keep_unless_empty(parts: Vec<String>, keep: impl Fn(&str) -> bool) -> Vec<String> {
    let kept: Vec<String> = parts.iter().filter(|s| keep(s)).cloned().collect();
    if kept.is_empty() && !parts.is_empty() {
        debug!("Hygiene would empty the reply, keeping it unfiltered");
        return parts;
    }
    kept
}

fn keep_first_occurrence(text: &str, phrase: &str) -> String {
    if phrase.is_empty() {
        return text.to_string();
    }
    let Some(first) = text.find(phrase) else {
        return text.to_string();
    };
    let split = first + phrase.len();
    let (head, tail) = text.split_at(split);
    let rest = tail.replace(phrase, "");
    let joined = format!("{}{}", head, rest);
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}
