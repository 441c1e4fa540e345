use serde::{Deserialize, Serialize};
use std::fmt;

/// The major phases of a tutoring session, in their fixed forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Discussion,
    Comprehension,
    Exercise,
    Worksheet,
    Test,
    Congrats,
}

impl Phase {
    pub const ORDER: [Phase; 6] = [
        Phase::Discussion,
        Phase::Comprehension,
        Phase::Exercise,
        Phase::Worksheet,
        Phase::Test,
        Phase::Congrats,
    ];

    fn position(self) -> usize {
        Self::ORDER
            .iter()
            .position(|p| *p == self)
            .unwrap_or_default()
    }

    /// The next major phase, or `None` from `Congrats`.
    pub fn next(self) -> Option<Phase> {
        Self::ORDER.get(self.position() + 1).copied()
    }

    /// The previous major phase, or `None` from `Discussion`.
    pub fn previous(self) -> Option<Phase> {
        self.position()
            .checked_sub(1)
            .and_then(|i| Self::ORDER.get(i).copied())
    }

    /// Whether the phase asks questions that are judged one by one.
    pub fn is_questioning(self) -> bool {
        matches!(
            self,
            Phase::Comprehension | Phase::Exercise | Phase::Worksheet
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Discussion => "discussion",
            Phase::Comprehension => "comprehension",
            Phase::Exercise => "exercise",
            Phase::Worksheet => "worksheet",
            Phase::Test => "test",
            Phase::Congrats => "congrats",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finer steps inside a major phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubPhase {
    /// Waiting for an explicit start action from the learner.
    AwaitingBegin,
    /// Opening step of the phase (greeting, banter, closing).
    Start,
    /// Teaching sub-track of the discussion.
    Teaching,
    /// Waiting on the "go over that again?" answer after teaching.
    AwaitingGate,
    /// Questions are being asked and answered.
    Active,
    /// Test answers are being replayed and scored.
    Review,
    Complete,
}

impl SubPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SubPhase::AwaitingBegin => "awaiting-begin",
            SubPhase::Start => "start",
            SubPhase::Teaching => "teaching",
            SubPhase::AwaitingGate => "awaiting-gate",
            SubPhase::Active => "active",
            SubPhase::Review => "review",
            SubPhase::Complete => "complete",
        }
    }
}

impl fmt::Display for SubPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-phase counters. Reset to zero whenever the major phase changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub asked: u32,
    pub correct: u32,
}

impl Ticker {
    pub fn record(&mut self, correct: bool) {
        self.asked += 1;
        if correct {
            self.correct += 1;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_navigation() {
        assert_eq!(Phase::Discussion.next(), Some(Phase::Comprehension));
        assert_eq!(Phase::Test.next(), Some(Phase::Congrats));
        assert_eq!(Phase::Congrats.next(), None);
        assert_eq!(Phase::Discussion.previous(), None);
        assert_eq!(Phase::Worksheet.previous(), Some(Phase::Exercise));
    }

    #[test]
    fn test_sub_phase_serializes_kebab_case() {
        let json = serde_json::to_string(&SubPhase::AwaitingBegin).unwrap();
        assert_eq!(json, "\"awaiting-begin\"");
        assert_eq!(SubPhase::AwaitingGate.to_string(), "awaiting-gate");
    }

    #[test]
    fn test_ticker_record_and_reset() {
        let mut ticker = Ticker::default();
        ticker.record(true);
        ticker.record(false);
        assert_eq!(ticker, Ticker { asked: 2, correct: 1 });
        ticker.reset();
        assert_eq!(ticker, Ticker::default());
    }
}
