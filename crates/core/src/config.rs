//! Session configuration value object, resolved once at session start.

use crate::narration::captions::CaptionTiming;
use crate::supply::Quotas;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// How test answers are replayed and scored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStrategy {
    /// One dialogue call per test question, chained after narration.
    #[default]
    PerItem,
    /// One dialogue call covering every question, parsed per "Question N." block.
    SingleCall,
}

#[derive(Debug, Error)]
#[error("unknown review strategy '{0}' (expected per_item or single_call)")]
pub struct UnknownReviewStrategy(String);

impl FromStr for ReviewStrategy {
    type Err = UnknownReviewStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "per_item" => Ok(ReviewStrategy::PerItem),
            "single_call" => Ok(ReviewStrategy::SingleCall),
            other => Err(UnknownReviewStrategy(other.to_string())),
        }
    }
}

/// Numeric per-learner targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTargets {
    /// Correct answers needed to leave the comprehension phase.
    pub comprehension: u32,
    /// Correct answers needed to leave the exercise phase.
    pub exercise: u32,
    pub worksheet_length: usize,
    pub test_length: usize,
}

impl Default for SessionTargets {
    fn default() -> Self {
        Self {
            comprehension: 3,
            exercise: 3,
            worksheet_length: 10,
            test_length: 10,
        }
    }
}

/// Learner-supplied overrides applied on top of deployment defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOverrides {
    pub comprehension: Option<u32>,
    pub exercise: Option<u32>,
    pub worksheet_length: Option<usize>,
    pub test_length: Option<usize>,
}

impl SessionTargets {
    /// Applies overrides; zero values are ignored.
    pub fn with_overrides(mut self, overrides: &TargetOverrides) -> Self {
        if let Some(n) = overrides.comprehension.filter(|n| *n > 0) {
            self.comprehension = n;
        }
        if let Some(n) = overrides.exercise.filter(|n| *n > 0) {
            self.exercise = n;
        }
        if let Some(n) = overrides.worksheet_length.filter(|n| *n > 0) {
            self.worksheet_length = n;
        }
        if let Some(n) = overrides.test_length.filter(|n| *n > 0) {
            self.test_length = n;
        }
        self
    }
}

/// Retry policy for "not ready" dialogue failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(400),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), growing linearly.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff * attempt.max(1)
    }
}

/// Everything a session needs to know about its configuration.
///
/// Shared by `Arc` through the controller; never mutated after start.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub targets: SessionTargets,
    pub review_strategy: ReviewStrategy,
    /// Learner banter turns before teaching starts.
    pub banter_turns: u32,
    /// Window after a forced transition during which in-flight replies are ignored.
    pub awaiting_lock: Duration,
    pub dialogue_timeout: Duration,
    pub retry: RetryPolicy,
    pub captions: CaptionTiming,
    pub quotas: Quotas,
    pub speech_speed: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            targets: SessionTargets::default(),
            review_strategy: ReviewStrategy::default(),
            banter_turns: 1,
            awaiting_lock: Duration::from_millis(800),
            dialogue_timeout: Duration::from_secs(25),
            retry: RetryPolicy::default(),
            captions: CaptionTiming::default(),
            quotas: Quotas::default(),
            speech_speed: 1.0,
        }
    }
}

impl SessionConfig {
    pub fn with_overrides(mut self, overrides: &TargetOverrides) -> Self {
        self.targets = self.targets.with_overrides(overrides);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_strategy_parses_both_spellings() {
        assert_eq!("per_item".parse::<ReviewStrategy>().unwrap(), ReviewStrategy::PerItem);
        assert_eq!(
            "Single-Call".parse::<ReviewStrategy>().unwrap(),
            ReviewStrategy::SingleCall
        );
        assert!("batch".parse::<ReviewStrategy>().is_err());
    }

    #[test]
    fn test_overrides_replace_only_positive_values() {
        let targets = SessionTargets::default().with_overrides(&TargetOverrides {
            comprehension: Some(5),
            exercise: Some(0),
            worksheet_length: None,
            test_length: Some(4),
        });
        assert_eq!(targets.comprehension, 5);
        assert_eq!(targets.exercise, 3);
        assert_eq!(targets.worksheet_length, 10);
        assert_eq!(targets.test_length, 4);
    }

    #[test]
    fn test_retry_delay_grows() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(400));
        assert_eq!(policy.delay(2), Duration::from_millis(800));
    }
}
