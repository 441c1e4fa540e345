/// Splits text into sentences on `.`, `!` or `?` followed by whitespace.
///
/// Terminal punctuation stays with its sentence. Runs of punctuation
/// (`?!`, `...`) are kept together.
pub fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            while let Some(&next) = chars.peek() {
                if matches!(next, '.' | '!' | '?' | '"' | '\'' | ')') {
                    current.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            if chars.peek().is_none_or(|n| n.is_whitespace()) {
                let sentence = current.split_whitespace().collect::<Vec<_>>().join(" ");
                if !sentence.is_empty() {
                    out.push(sentence);
                }
                current.clear();
            }
        }
    }
    let tail = current.split_whitespace().collect::<Vec<_>>().join(" ");
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn is_question(sentence: &str) -> bool {
    sentence
        .trim_end_matches(['"', '\'', ')'])
        .ends_with('?')
}
