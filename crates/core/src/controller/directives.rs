use crate::judge::{normalize, option_label};
use crate::lesson::{Category, Lesson, QuestionItem};
use crate::phase::Phase;

pub fn greeting(lesson: &Lesson) -> String {
    format!(
        "Greet the learner warmly and say that today's lesson is \"{}\" in one sentence. \
         Then ask one friendly question about their day or what they enjoy. \
         Do not start teaching yet.",
        lesson.title
    )
}

pub fn banter() -> String {
    "Reply briefly and warmly to what the learner just said, in one or two sentences. \
     You may ask one more friendly question. Do not start teaching yet."
        .to_string()
}

pub fn teach(lesson: &Lesson, again: bool) -> String {
    let mut out = if again {
        "The learner asked to hear it again. Explain the same key ideas once more in a \
         different, simpler way, with a fresh everyday example."
            .to_string()
    } else {
        format!(
            "Teach the key ideas of \"{}\" using the teaching notes and vocabulary. \
             Use one everyday example.",
            lesson.title
        )
    };
    out.push_str(
        " Keep it to five or six short sentences. Finish by asking whether they would \
         like you to go over it again.",
    );
    out
}

/// The question as the learner should see it, with lettered options.
pub fn question_text(item: &QuestionItem) -> String {
    let mut text = match item.category {
        Category::TrueFalse => format!("True or false: {}", item.prompt.trim()),
        _ => item.prompt.trim().to_string(),
    };
    if !item.options.is_empty() {
        let options: Vec<String> = item
            .options
            .iter()
            .enumerate()
            .map(|(i, o)| format!("{}. {}", option_label(i), o.trim()))
            .collect();
        text.push_str(&format!(" {}", options.join(" ")));
    }
    text
}

pub fn ask(item: &QuestionItem, phase: Phase) -> String {
    let lead = match phase {
        Phase::Exercise => "Set up this practice problem with one short, encouraging sentence",
        Phase::Worksheet => "Read out this worksheet question",
        _ => "Ask this question to check understanding",
    };
    format!(
        "{lead}, then ask it exactly as written, including any lettered options:\n{}\n\
         Do not reveal or hint at the answer. End with the question.",
        question_text(item)
    )
}

/// Narrated text for a silent test question. No dialogue call is made.
pub fn test_question(item: &QuestionItem, number: usize, total: usize) -> String {
    format!("Question {} of {}. {}", number, total, question_text(item))
}

pub fn closing_without_score(lesson: &Lesson) -> String {
    format!(
        "The learner has reached the end of the lesson \"{}\". Congratulate them warmly \
         in three short sentences and say goodbye. Do not mention a score. Do not ask a question.",
        lesson.title
    )
}

/// Whether the learner's answer to the repeat gate asks for another explanation.
pub fn wants_repeat(text: &str) -> bool {
    const NO: [&str; 6] = ["no", "nope", "nah", "not", "dont", "don"];
    const YES: [&str; 8] = ["yes", "yeah", "yep", "sure", "again", "repeat", "please", "ok"];
    let normalized = normalize(text);
    let words: Vec<&str> = normalized.split_whitespace().collect();
    if words.iter().any(|w| NO.contains(w)) {
        return false;
    }
    words.iter().any(|w| YES.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_text_letters_options() {
        let item = QuestionItem::new("Which is even?", "B", Category::MultipleChoice)
            .with_options(vec!["3".into(), "4".into()]);
        assert_eq!(question_text(&item), "Which is even? A. 3 B. 4");
        let tf = QuestionItem::new("2 is even.", "true", Category::TrueFalse);
        assert_eq!(question_text(&tf), "True or false: 2 is even.");
    }

    #[test]
    fn test_ask_never_contains_answer_field() {
        let item = QuestionItem::new("What is 6 x 7?", "42", Category::Sample);
        let text = ask(&item, Phase::Comprehension);
        assert!(text.contains("What is 6 x 7?"));
        assert!(!text.contains("42"));
    }

    #[test]
    fn test_wants_repeat() {
        assert!(wants_repeat("Yes please!"));
        assert!(wants_repeat("can you say it again"));
        assert!(!wants_repeat("No, I got it"));
        assert!(!wants_repeat("I don't need it again"));
        assert!(!wants_repeat("I understand"));
    }
}
