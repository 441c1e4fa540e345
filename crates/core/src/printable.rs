//! Printable worksheet and test sheets, handed to an external renderer.

use crate::judge::option_label;
use crate::lesson::{Category, QuestionItem};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

const BLANK: &str = "__________";
const ANSWER_LINES: usize = 3;

static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_{2,}").expect("blank pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrintableItem {
    pub number: usize,
    pub category: Category,
    pub text: String,
    /// Lettered options, e.g. "A. 3".
    pub options: Vec<String>,
    /// Ruled lines left for a written answer.
    pub answer_lines: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrintableSheet {
    pub title: String,
    pub items: Vec<PrintableItem>,
}

impl PrintableSheet {
    /// Plain-text rendering, one item per paragraph.
    pub fn to_text(&self) -> String {
        let mut out = format!("{}\n", self.title);
        for item in &self.items {
            out.push_str(&format!("\n{}. {}\n", item.number, item.text));
            for option in &item.options {
                out.push_str(&format!("   {option}\n"));
            }
            for _ in 0..item.answer_lines {
                out.push_str("   ______________________________\n");
            }
        }
        out
    }
}

fn format_item(number: usize, item: &QuestionItem) -> PrintableItem {
    let prompt = item.prompt.trim();
    let text = match item.category {
        Category::TrueFalse => format!("True or False: {prompt}"),
        Category::FillInBlank => BLANK_RUN.replace_all(prompt, BLANK).into_owned(),
        _ => prompt.to_string(),
    };
    let options = item
        .options
        .iter()
        .enumerate()
        .map(|(i, o)| format!("{}. {}", option_label(i), o.trim()))
        .collect();
    let answer_lines = match item.category {
        Category::WordProblem => ANSWER_LINES,
        Category::ShortAnswer | Category::Sample => 1,
        _ => 0,
    };
    PrintableItem {
        number,
        category: item.category,
        text,
        options,
        answer_lines,
    }
}

pub fn render_sheet(title: &str, items: &[QuestionItem]) -> PrintableSheet {
    PrintableSheet {
        title: title.trim().to_string(),
        items: items
            .iter()
            .enumerate()
            .map(|(i, item)| format_item(i + 1, item))
            .collect(),
    }
}
