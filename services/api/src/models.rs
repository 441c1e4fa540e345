//! API Models
//!
//! Request and response bodies for the REST endpoints, documented with `utoipa`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tutor_core::config::TargetOverrides;
use tutor_core::printable::{PrintableItem, PrintableSheet};
use tutor_core::supply::{AssessmentKind, StoredAssessments};
use utoipa::ToSchema;

/// Which assessment set a printable sheet is built from.
#[derive(Deserialize, Serialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SheetKind {
    Worksheet,
    Test,
}

impl From<SheetKind> for AssessmentKind {
    fn from(kind: SheetKind) -> Self {
        match kind {
            SheetKind::Worksheet => AssessmentKind::Worksheet,
            SheetKind::Test => AssessmentKind::Test,
        }
    }
}

impl FromStr for SheetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "worksheet" => Ok(SheetKind::Worksheet),
            "test" => Ok(SheetKind::Test),
            other => Err(format!("'{}' is not a sheet kind (expected worksheet or test)", other)),
        }
    }
}

impl fmt::Display for SheetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetKind::Worksheet => write!(f, "Worksheet"),
            SheetKind::Test => write!(f, "Test"),
        }
    }
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct RefreshAssessmentsPayload {
    #[schema(example = "fractions-1")]
    pub lesson_id: String,
    #[schema(example = "learner-42")]
    pub learner_id: String,
    pub worksheet_length: Option<usize>,
    pub test_length: Option<usize>,
}

impl RefreshAssessmentsPayload {
    pub fn overrides(&self) -> TargetOverrides {
        TargetOverrides {
            worksheet_length: self.worksheet_length,
            test_length: self.test_length,
            ..TargetOverrides::default()
        }
    }
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
pub struct AssessmentSummary {
    pub lesson_id: String,
    pub learner_id: String,
    pub lesson_revision: String,
    pub worksheet_count: usize,
    pub test_count: usize,
}

impl AssessmentSummary {
    pub fn new(lesson_id: &str, learner_id: &str, sets: &StoredAssessments) -> Self {
        Self {
            lesson_id: lesson_id.to_string(),
            learner_id: learner_id.to_string(),
            lesson_revision: sets.lesson_revision.clone(),
            worksheet_count: sets.worksheet.len(),
            test_count: sets.test.len(),
        }
    }
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
pub struct SheetItem {
    pub number: usize,
    #[schema(example = "true_false")]
    pub category: String,
    pub text: String,
    pub options: Vec<String>,
    pub answer_lines: usize,
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
pub struct Sheet {
    pub title: String,
    pub items: Vec<SheetItem>,
}

impl From<PrintableItem> for SheetItem {
    fn from(item: PrintableItem) -> Self {
        let category = serde_json::to_value(item.category)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        Self {
            number: item.number,
            category,
            text: item.text,
            options: item.options,
            answer_lines: item.answer_lines,
        }
    }
}

impl From<PrintableSheet> for Sheet {
    fn from(sheet: PrintableSheet) -> Self {
        Self {
            title: sheet.title,
            items: sheet.items.into_iter().map(SheetItem::from).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_core::lesson::{Category, QuestionItem};
    use tutor_core::printable::render_sheet;

    #[test]
    fn test_sheet_kind_parsing() {
        assert_eq!("Worksheet".parse::<SheetKind>(), Ok(SheetKind::Worksheet));
        assert_eq!("test".parse::<SheetKind>(), Ok(SheetKind::Test));
        assert!("quiz".parse::<SheetKind>().is_err());
        assert_eq!(AssessmentKind::from(SheetKind::Test), AssessmentKind::Test);
    }

    #[test]
    fn test_sheet_from_printable_uses_snake_case_category() {
        let items = vec![QuestionItem::new("2 is even.", "true", Category::TrueFalse)];
        let sheet = Sheet::from(render_sheet("Numbers - Test", &items));
        assert_eq!(sheet.items[0].category, "true_false");
        assert_eq!(sheet.items[0].text, "True or False: 2 is even.");

        let json = serde_json::to_value(&sheet).unwrap();
        assert_eq!(json["title"], "Numbers - Test");
        assert_eq!(json["items"][0]["number"], 1);
    }

    #[test]
    fn test_refresh_payload_overrides_lengths_only() {
        let payload: RefreshAssessmentsPayload = serde_json::from_str(
            r#"{"lesson_id": "l1", "learner_id": "u1", "test_length": 6}"#,
        )
        .unwrap();
        let overrides = payload.overrides();
        assert_eq!(overrides.test_length, Some(6));
        assert_eq!(overrides.worksheet_length, None);
        assert_eq!(overrides.comprehension, None);
    }

    #[test]
    fn test_summary_counts_sets() {
        let sets = StoredAssessments {
            lesson_revision: "r7".to_string(),
            lesson_fingerprint: String::new(),
            worksheet: vec![QuestionItem::new("a", "b", Category::Sample)],
            test: Vec::new(),
        };
        let summary = AssessmentSummary::new("l1", "u1", &sets);
        assert_eq!(summary.lesson_revision, "r7");
        assert_eq!((summary.worksheet_count, summary.test_count), (1, 0));
    }
}
