//! Test Review Sequencer
//!
//! Replays the learner's recorded test answers through the dialogue service
//! and reads correctness back out of the replies with the cue-phrase protocol.

use crate::config::ReviewStrategy;
use crate::dialogue::StepKind;
use crate::judge::{JudgeContract, JudgeMode, option_label};
use crate::lesson::QuestionItem;
use crate::verdict::{CUE_PHRASES, CuePicker, ReviewScore, find_cue, split_question_blocks};
use rand::Rng;
use tracing::{debug, info};

/// A test question with the learner's recorded answer.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResponse {
    pub item: QuestionItem,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDirective {
    pub step: StepKind,
    pub instruction: String,
    /// Cue the reply must carry at most once, for single-question reviews.
    pub required_cue: Option<&'static str>,
}

pub struct ReviewSequencer {
    strategy: ReviewStrategy,
    responses: Vec<TestResponse>,
    cues: Vec<&'static str>,
    verdicts: Vec<Option<bool>>,
    cursor: usize,
    in_flight: bool,
}

impl ReviewSequencer {
    /// Prepares a review, assigning each question a cue phrase not used
    /// earlier in the session.
    pub fn new<R: Rng + ?Sized>(
        strategy: ReviewStrategy,
        responses: Vec<TestResponse>,
        picker: &mut CuePicker,
        rng: &mut R,
    ) -> Self {
        let cues = picker.pick_many(responses.len(), rng);
        let verdicts = vec![None; responses.len()];
        Self {
            strategy,
            responses,
            cues,
            verdicts,
            cursor: 0,
            in_flight: false,
        }
    }

    pub fn total(&self) -> usize {
        self.responses.len()
    }

    pub fn is_complete(&self) -> bool {
        self.verdicts.iter().all(Option::is_some)
    }

    /// The next directive to send, or `None` while a reply is outstanding or
    /// once every question has a verdict.
    pub fn next_directive(&mut self) -> Option<ReviewDirective> {
        if self.in_flight || self.is_complete() {
            return None;
        }
        let directive = match self.strategy {
            ReviewStrategy::PerItem => {
                let i = self.cursor;
                ReviewDirective {
                    step: StepKind::Review,
                    instruction: self.item_instruction(i),
                    required_cue: Some(self.cues[i]),
                }
            }
            ReviewStrategy::SingleCall => ReviewDirective {
                step: StepKind::ReviewAll,
                instruction: self.full_instruction(),
                required_cue: None,
            },
        };
        self.in_flight = true;
        Some(directive)
    }

    /// Reads verdicts out of a reply to the outstanding directive.
    ///
    /// Per-item replies count as correct when any cue phrase appears; a
    /// full review counts at most one correct per "Question N." block.
    pub fn record_reply(&mut self, reply: &str) {
        if !self.in_flight {
            return;
        }
        self.in_flight = false;
        match self.strategy {
            ReviewStrategy::PerItem => {
                let correct = find_cue(reply, &CUE_PHRASES).is_some();
                debug!(question = self.cursor + 1, correct, "Review verdict");
                self.verdicts[self.cursor] = Some(correct);
                self.cursor += 1;
            }
            ReviewStrategy::SingleCall => {
                let blocks = split_question_blocks(reply, self.responses.len());
                for (i, block) in blocks.iter().enumerate() {
                    self.verdicts[i] = Some(find_cue(block, &CUE_PHRASES).is_some());
                }
                self.cursor = self.responses.len();
            }
        }
        if self.is_complete() {
            info!(correct = self.correct(), total = self.total(), "Test review complete");
        }
    }

    pub fn correct(&self) -> u32 {
        self.verdicts.iter().filter(|v| **v == Some(true)).count() as u32
    }

    pub fn score(&self) -> ReviewScore {
        ReviewScore::new(self.correct(), self.total() as u32)
    }

    fn question_text(item: &QuestionItem) -> String {
        let mut text = item.prompt.trim().to_string();
        if !item.options.is_empty() {
            let options: Vec<String> = item
                .options
                .iter()
                .enumerate()
                .map(|(i, o)| format!("{}. {}", option_label(i), o.trim()))
                .collect();
            text.push_str(&format!(" Options: {}", options.join("; ")));
        }
        text
    }

    fn answer_text(answer: &str) -> &str {
        let trimmed = answer.trim();
        if trimmed.is_empty() { "(no answer)" } else { trimmed }
    }

    fn rule_text(contract: &JudgeContract) -> String {
        match contract.mode {
            JudgeMode::Exact => format!(
                "ignoring case, punctuation and extra spaces (number words equal digits), it matches one of: {}",
                contract.accepted.join(" | ")
            ),
            JudgeMode::Keywords => format!(
                "it mentions at least {} of these keywords as whole words: {}",
                contract.min_keywords,
                contract.keywords.join(", ")
            ),
        }
    }

    fn item_instruction(&self, i: usize) -> String {
        let response = &self.responses[i];
        let contract = JudgeContract::for_item(&response.item);
        format!(
            "Review test question {n} of {total}.\n\
             Question: {question}\n\
             Expected answer: {expected}\n\
             Learner's answer: \"{answer}\"\n\
             In two or three short sentences, restate the question, state the expected answer, \
             and state the learner's answer. The answer is correct only if {rule}.\n\
             If and only if it is correct, end your reply with exactly this phrase, verbatim: \"{cue}\"\n\
             If it is not correct, use no celebration phrase at all and kindly explain the right answer.",
            n = i + 1,
            total = self.responses.len(),
            question = Self::question_text(&response.item),
            expected = contract.expected,
            answer = Self::answer_text(&response.answer),
            rule = Self::rule_text(&contract),
            cue = self.cues[i],
        )
    }

    fn full_instruction(&self) -> String {
        let mut out = format!(
            "Review all {} test questions. Write one block per question, in order, each starting \
             with \"Question N.\" where N is the question number. In each block restate the question, \
             state the expected answer and state the learner's answer. If and only if the learner's \
             answer is correct, end that block with its celebration phrase exactly as given. Never use \
             a celebration phrase in a block whose answer is wrong, and never use another question's phrase.\n",
            self.responses.len()
        );
        for (i, response) in self.responses.iter().enumerate() {
            let contract = JudgeContract::for_item(&response.item);
            out.push_str(&format!(
                "\nQuestion {n}. {question}\nExpected answer: {expected}\nLearner's answer: \"{answer}\"\n\
                 Correct only if {rule}.\nCelebration phrase: \"{cue}\"\n",
                n = i + 1,
                question = Self::question_text(&response.item),
                expected = contract.expected,
                answer = Self::answer_text(&response.answer),
                rule = Self::rule_text(&contract),
                cue = self.cues[i],
            ));
        }
        out
    }
}

/// Closing directive carrying the authoritative score.
pub fn closing_instruction(score: &ReviewScore, lesson_title: &str) -> String {
    format!(
        "The learner has finished every part of the lesson \"{title}\". Their test score is final: \
         {correct} correct out of {total}, which is {percent} percent. Use exactly these numbers and \
         do not recompute them. Congratulate the learner warmly in three or four short sentences, \
         mention the score once, and say goodbye. Do not ask a question.",
        title = lesson_title,
        correct = score.correct,
        total = score.total,
        percent = score.percent,
    )
}
