//! Lesson Content
//!
//! The read-only lesson document a session is built from, the question items
//! it carries, and the source that loads it once per session.

use crate::judge::normalize;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

/// Subject whose question pool mixes every category together.
pub const DEFAULT_SUBJECT: &str = "math";

/// The pool a question item was drawn from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    Sample,
    WordProblem,
    TrueFalse,
    MultipleChoice,
    FillInBlank,
    ShortAnswer,
}

/// A single question. Immutable once drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionItem {
    pub prompt: String,
    /// Primary answer first, then accepted synonyms.
    #[serde(default)]
    pub answers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_keywords: Option<usize>,
    #[serde(default)]
    pub category: Category,
}

impl QuestionItem {
    pub fn new(prompt: impl Into<String>, answer: impl Into<String>, category: Category) -> Self {
        Self {
            prompt: prompt.into(),
            answers: vec![answer.into()],
            options: Vec::new(),
            keywords: Vec::new(),
            min_keywords: None,
            category,
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    pub fn with_keywords(mut self, keywords: Vec<String>, min_keywords: usize) -> Self {
        self.keywords = keywords;
        self.min_keywords = Some(min_keywords);
        self
    }

    pub fn primary_answer(&self) -> Option<&str> {
        self.answers.first().map(String::as_str)
    }

    /// Key used to detect duplicate prompts.
    pub fn prompt_key(&self) -> String {
        normalize(&self.prompt)
    }

    /// Index of the correct option for a multiple-choice item.
    ///
    /// The primary answer may be the option text itself or its letter label.
    pub fn correct_option_index(&self) -> Option<usize> {
        let answer = self.primary_answer()?.trim();
        let target = normalize(answer);
        if let Some(i) = self.options.iter().position(|o| normalize(o) == target) {
            return Some(i);
        }
        let mut chars = answer.chars();
        match (chars.next(), chars.next()) {
            (Some(letter), None) if letter.is_ascii_alphabetic() => {
                let i = (letter.to_ascii_uppercase() as u8 - b'A') as usize;
                (i < self.options.len()).then_some(i)
            }
            _ => None,
        }
    }

    /// A multiple-choice item is usable only with at least two options and a
    /// resolvable correct option.
    pub fn has_valid_options(&self) -> bool {
        self.options.len() >= 2 && self.correct_option_index().is_some()
    }

    /// Short-answer items are judged by keyword threshold instead of exact match.
    pub fn is_keyword_judged(&self) -> bool {
        self.category == Category::ShortAnswer && !self.keywords.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub term: String,
    #[serde(default)]
    pub definition: Option<String>,
}

/// A lesson document, loaded once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subject: Option<String>,
    /// Author-maintained revision tag; may be left empty.
    #[serde(default)]
    pub revision: String,
    #[serde(default)]
    pub teaching_notes: Option<String>,
    #[serde(default)]
    pub vocabulary: Vec<VocabularyEntry>,
    #[serde(default)]
    pub samples: Vec<QuestionItem>,
    #[serde(default)]
    pub word_problems: Vec<QuestionItem>,
    #[serde(default)]
    pub true_false: Vec<QuestionItem>,
    #[serde(default)]
    pub multiple_choice: Vec<QuestionItem>,
    #[serde(default)]
    pub fill_in_blank: Vec<QuestionItem>,
    #[serde(default)]
    pub short_answer: Vec<QuestionItem>,
}

impl Lesson {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            subject: None,
            revision: String::new(),
            teaching_notes: None,
            vocabulary: Vec::new(),
            samples: Vec::new(),
            word_problems: Vec::new(),
            true_false: Vec::new(),
            multiple_choice: Vec::new(),
            fill_in_blank: Vec::new(),
            short_answer: Vec::new(),
        }
    }

    /// Parses a lesson document, tags every item with its pool category and
    /// drops multiple-choice items that cannot be judged.
    pub fn from_json(text: &str) -> Result<Self, LessonError> {
        let mut lesson: Lesson = serde_json::from_str(text)?;
        if lesson.id.trim().is_empty() {
            return Err(LessonError::Invalid("lesson id is empty".to_string()));
        }
        lesson.prepare();
        Ok(lesson)
    }

    /// Tags items with their categories and removes unusable multiple-choice items.
    pub fn prepare(&mut self) {
        for category in [
            Category::Sample,
            Category::WordProblem,
            Category::TrueFalse,
            Category::MultipleChoice,
            Category::FillInBlank,
            Category::ShortAnswer,
        ] {
            for item in self.pool_mut(category).iter_mut() {
                item.category = category;
            }
        }
        let before = self.multiple_choice.len();
        self.multiple_choice.retain(QuestionItem::has_valid_options);
        let dropped = before - self.multiple_choice.len();
        if dropped > 0 {
            warn!(lesson_id = %self.id, dropped, "Dropped multiple-choice items without a valid option list");
        }
    }

    pub fn is_default_subject(&self) -> bool {
        self.subject
            .as_deref()
            .is_none_or(|s| s.trim().eq_ignore_ascii_case(DEFAULT_SUBJECT))
    }

    pub fn pool(&self, category: Category) -> &[QuestionItem] {
        match category {
            Category::Sample => &self.samples,
            Category::WordProblem => &self.word_problems,
            Category::TrueFalse => &self.true_false,
            Category::MultipleChoice => &self.multiple_choice,
            Category::FillInBlank => &self.fill_in_blank,
            Category::ShortAnswer => &self.short_answer,
        }
    }

    fn pool_mut(&mut self, category: Category) -> &mut Vec<QuestionItem> {
        match category {
            Category::Sample => &mut self.samples,
            Category::WordProblem => &mut self.word_problems,
            Category::TrueFalse => &mut self.true_false,
            Category::MultipleChoice => &mut self.multiple_choice,
            Category::FillInBlank => &mut self.fill_in_blank,
            Category::ShortAnswer => &mut self.short_answer,
        }
    }

    /// Every item across all pools.
    pub fn all_items(&self) -> impl Iterator<Item = &QuestionItem> {
        self.samples
            .iter()
            .chain(&self.word_problems)
            .chain(&self.true_false)
            .chain(&self.multiple_choice)
            .chain(&self.fill_in_blank)
            .chain(&self.short_answer)
    }

    pub fn contains_prompt(&self, prompt_key: &str) -> bool {
        self.all_items().any(|i| i.prompt_key() == prompt_key)
    }

    /// Hash of every question item, answers and options included.
    ///
    /// Catches edits that keep the revision tag. Only stable within one build,
    /// so a new binary regenerates cached sets once.
    pub fn fingerprint(&self) -> String {
        let mut hasher = DefaultHasher::new();
        for item in self.all_items() {
            serde_json::to_string(item)
                .unwrap_or_default()
                .hash(&mut hasher);
        }
        format!("{:016x}", hasher.finish())
    }
}

#[derive(Debug, Error)]
pub enum LessonError {
    #[error("lesson '{0}' not found")]
    NotFound(String),
    #[error("invalid lesson document: {0}")]
    Invalid(String),
    #[error(transparent)]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read-only access to lesson documents by stable reference.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LessonSource: Send + Sync {
    async fn load(&self, lesson_id: &str) -> Result<Lesson, LessonError>;
}

/// Loads `<root>/<lesson_id>.json` documents.
pub struct DirectoryLessonSource {
    root: PathBuf,
}

impl DirectoryLessonSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, lesson_id: &str) -> Result<PathBuf, LessonError> {
        let safe = !lesson_id.is_empty()
            && lesson_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(LessonError::Invalid(format!(
                "lesson id '{}' contains unsupported characters",
                lesson_id
            )));
        }
        Ok(self.root.join(format!("{}.json", lesson_id)))
    }
}

#[async_trait]
impl LessonSource for DirectoryLessonSource {
    async fn load(&self, lesson_id: &str) -> Result<Lesson, LessonError> {
        let path = self.path_for(lesson_id)?;
        debug!(path = %path.display(), "Loading lesson document");
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LessonError::NotFound(lesson_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let lesson = Lesson::from_json(&text)?;
        if lesson.id != lesson_id {
            warn!(requested = %lesson_id, found = %lesson.id, "Lesson id differs from file name");
        }
        Ok(lesson)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LESSON_JSON: &str = r#"{
        "id": "fractions-1",
        "title": "Fractions",
        "revision": "r1",
        "true_false": [{"prompt": "1/2 is bigger than 1/3.", "answers": ["true"]}],
        "multiple_choice": [
            {"prompt": "Which is half of 8?", "answers": ["B"], "options": ["2", "4", "6"]},
            {"prompt": "Broken item", "answers": ["7"], "options": ["1"]}
        ]
    }"#;

    #[test]
    fn test_from_json_tags_categories_and_drops_invalid_choices() {
        let lesson = Lesson::from_json(LESSON_JSON).unwrap();
        assert_eq!(lesson.true_false[0].category, Category::TrueFalse);
        assert_eq!(lesson.multiple_choice.len(), 1);
        assert_eq!(lesson.multiple_choice[0].category, Category::MultipleChoice);
        assert!(lesson.is_default_subject());
    }

    #[test]
    fn test_correct_option_index_by_letter_and_text() {
        let by_letter = QuestionItem::new("q", "b", Category::MultipleChoice)
            .with_options(vec!["x".into(), "y".into()]);
        assert_eq!(by_letter.correct_option_index(), Some(1));

        let by_text = QuestionItem::new("q", "Y", Category::MultipleChoice)
            .with_options(vec!["x".into(), "y".into()]);
        assert_eq!(by_text.correct_option_index(), Some(1));

        let out_of_range = QuestionItem::new("q", "D", Category::MultipleChoice)
            .with_options(vec!["x".into(), "y".into()]);
        assert!(!out_of_range.has_valid_options());
    }

    #[test]
    fn test_from_json_rejects_empty_id() {
        let err = Lesson::from_json(r#"{"id": " ", "title": "t"}"#).unwrap_err();
        assert!(matches!(err, LessonError::Invalid(_)));
    }

    #[test]
    fn test_fingerprint_tracks_answers_options_and_keywords() {
        let lesson = Lesson::from_json(LESSON_JSON).unwrap();
        assert_eq!(lesson.fingerprint(), lesson.clone().fingerprint());

        let mut answers = lesson.clone();
        answers.true_false[0].answers = vec!["false".to_string()];
        assert_ne!(answers.fingerprint(), lesson.fingerprint());

        let mut options = lesson.clone();
        options.multiple_choice[0].options.push("8".to_string());
        assert_ne!(options.fingerprint(), lesson.fingerprint());

        let mut keywords = lesson.clone();
        keywords.true_false[0] = keywords.true_false[0]
            .clone()
            .with_keywords(vec!["bigger".to_string()], 1);
        assert_ne!(keywords.fingerprint(), lesson.fingerprint());

        // the title is not question content
        let mut retitled = lesson.clone();
        retitled.title = "Halves and thirds".to_string();
        assert_eq!(retitled.fingerprint(), lesson.fingerprint());
    }

    #[tokio::test]
    async fn test_directory_source_loads_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fractions-1.json"), LESSON_JSON).unwrap();
        let source = DirectoryLessonSource::new(dir.path());

        let lesson = source.load("fractions-1").await.unwrap();
        assert_eq!(lesson.title, "Fractions");

        let missing = source.load("unknown").await.unwrap_err();
        assert!(matches!(missing, LessonError::NotFound(id) if id == "unknown"));

        let traversal = source.load("../etc").await.unwrap_err();
        assert!(matches!(traversal, LessonError::Invalid(_)));
    }
}
