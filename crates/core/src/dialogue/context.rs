use crate::lesson::Lesson;
use crate::phase::Phase;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const DEFAULT_GUARDRAILS: &str = "You are a warm, patient tutor for a young learner. \
Stay strictly within the lesson below. Never share personal opinions, never discuss \
unsafe or adult topics, and never ask for personal information. If the learner goes \
off topic, gently steer back to the lesson.";

const DEFAULT_STYLE: &str = "Use short, simple sentences. Be encouraging. Do not use \
markdown, lists or headings; your words are read aloud.";

/// Prompt templates, loaded from `<PROMPTS_PATH>/*.md` by file stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub guardrails: String,
    pub style: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            guardrails: DEFAULT_GUARDRAILS.to_string(),
            style: DEFAULT_STYLE.to_string(),
        }
    }
}

impl PromptSet {
    /// Uses `system_prompt` and `style` entries when present, built-in text otherwise.
    pub fn from_map(prompts: &HashMap<String, String>) -> Self {
        let pick = |key: &str, fallback: &str| {
            prompts
                .get(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };
        Self {
            guardrails: pick("system_prompt", DEFAULT_GUARDRAILS),
            style: pick("style", DEFAULT_STYLE),
        }
    }
}

/// Builds the context description sent with each dialogue request.
#[derive(Debug, Clone)]
pub struct ContextComposer {
    lesson: Arc<Lesson>,
    prompts: Arc<PromptSet>,
}

impl ContextComposer {
    pub fn new(lesson: Arc<Lesson>, prompts: Arc<PromptSet>) -> Self {
        Self { lesson, prompts }
    }

    pub fn compose(&self, phase: Phase, include_guardrails: bool) -> String {
        let lesson = &self.lesson;
        let mut out = String::new();
        if include_guardrails {
            out.push_str(&self.prompts.guardrails);
            out.push_str("\n\n");
        }
        out.push_str(&format!("Lesson: {}\n", lesson.title));
        if let Some(subject) = &lesson.subject {
            out.push_str(&format!("Subject: {}\n", subject));
        }
        out.push_str(&format!("Current part of the session: {}\n", phase));
        if let Some(notes) = lesson.teaching_notes.as_deref().filter(|n| !n.trim().is_empty()) {
            out.push_str(&format!("Teaching notes: {}\n", notes.trim()));
        }
        if !lesson.vocabulary.is_empty() {
            out.push_str("Vocabulary:\n");
            for entry in &lesson.vocabulary {
                match &entry.definition {
                    Some(def) => out.push_str(&format!("- {}: {}\n", entry.term, def)),
                    None => out.push_str(&format!("- {}\n", entry.term)),
                }
            }
        }
        out.push_str(&format!("Style: {}", self.prompts.style));
        out
    }
}

/// Tracks which phases have already received the guardrail declaration.
#[derive(Debug, Clone, Default)]
pub struct GuardrailLedger {
    declared: HashSet<Phase>,
}

impl GuardrailLedger {
    pub fn needs(&self, phase: Phase) -> bool {
        !self.declared.contains(&phase)
    }

    pub fn mark(&mut self, phase: Phase) {
        self.declared.insert(phase);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lesson::VocabularyEntry;

    #[test]
    fn test_compose_includes_vocabulary_and_optional_guardrails() {
        let mut lesson = Lesson::new("l", "Adding Fractions");
        lesson.vocabulary = vec![VocabularyEntry {
            term: "denominator".into(),
            definition: Some("the bottom number".into()),
        }];
        let composer = ContextComposer::new(Arc::new(lesson), Arc::new(PromptSet::default()));

        let full = composer.compose(Phase::Discussion, true);
        assert!(full.starts_with(DEFAULT_GUARDRAILS));
        assert!(full.contains("- denominator: the bottom number"));
        assert!(full.contains("Current part of the session: discussion"));

        let lean = composer.compose(Phase::Discussion, false);
        assert!(!lean.contains(DEFAULT_GUARDRAILS));
    }

    #[test]
    fn test_prompt_set_falls_back_per_entry() {
        let mut map = HashMap::new();
        map.insert("system_prompt".to_string(), "Be kind.".to_string());
        map.insert("style".to_string(), "   ".to_string());
        let prompts = PromptSet::from_map(&map);
        assert_eq!(prompts.guardrails, "Be kind.");
        assert_eq!(prompts.style, DEFAULT_STYLE);
    }

    #[test]
    fn test_ledger_marks_once_per_phase() {
        let mut ledger = GuardrailLedger::default();
        assert!(ledger.needs(Phase::Exercise));
        ledger.mark(Phase::Exercise);
        assert!(!ledger.needs(Phase::Exercise));
        assert!(ledger.needs(Phase::Test));
    }
}
