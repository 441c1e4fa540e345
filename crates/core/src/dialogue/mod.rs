//! Dialogue Client
//!
//! Sends a composed instruction to an external language service and returns
//! the reply text with optional synthesized speech. Calls are cancellable,
//! transient "not ready" failures are retried, and replies are cleaned per
//! step kind before anyone else sees them.

pub mod client;
pub mod context;
pub mod hygiene;
pub mod openai;

pub use client::{DialogueCall, DialogueClient};
pub use context::{ContextComposer, GuardrailLedger, PromptSet};
pub use hygiene::ReplyHygiene;
pub use openai::OpenAiDialogueService;

use crate::phase::{Phase, SubPhase, Ticker};
use crate::speech::SpeechClip;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The kind of step a dialogue call serves. Drives reply hygiene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Greeting,
    Banter,
    Teach,
    Ask,
    Judge,
    Review,
    ReviewAll,
    Closing,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepKind::Greeting => "greeting",
            StepKind::Banter => "banter",
            StepKind::Teach => "teach",
            StepKind::Ask => "ask",
            StepKind::Judge => "judge",
            StepKind::Review => "review",
            StepKind::ReviewAll => "review_all",
            StepKind::Closing => "closing",
        };
        f.write_str(s)
    }
}

/// Session metadata attached to every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionMetadata {
    pub phase: Phase,
    pub sub_phase: SubPhase,
    pub lesson_id: String,
    pub ticker: Ticker,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DialogueRequest {
    /// Lesson scope, vocabulary, style constraints and (once per phase) guardrails.
    pub context: String,
    /// Short task instruction for this step.
    pub instruction: String,
    pub utterance: Option<String>,
    pub metadata: SessionMetadata,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Raw reply from the dialogue service.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueResponse {
    pub text: String,
    pub usage: Option<Usage>,
}

/// A cleaned reply, ready for narration.
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueReply {
    pub step: StepKind,
    pub text: String,
    pub speech: Option<SpeechClip>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("dialogue service error (status {status:?}): {message}")]
    Status {
        status: Option<u16>,
        message: String,
    },
    #[error("dialogue route not ready: {0}")]
    NotReady(String),
    #[error("dialogue call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("dialogue call aborted")]
    Aborted,
    #[error("dialogue service returned an empty reply")]
    EmptyReply,
    #[error("dialogue transport error: {0}")]
    Transport(String),
}

impl DialogueError {
    /// Only "not ready" failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DialogueError::NotReady(_))
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, DialogueError::Aborted)
    }
}

/// An opaque language-capable service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DialogueService: Send + Sync {
    async fn respond(&self, request: DialogueRequest) -> Result<DialogueResponse, DialogueError>;
}
