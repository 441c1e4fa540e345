//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the assessment store and service clients.

use crate::config::Config;
use std::sync::Arc;
use tutor_core::config::SessionConfig;
use tutor_core::dialogue::{DialogueClient, DialogueService, PromptSet};
use tutor_core::lesson::LessonSource;
use tutor_core::speech::SpeechSynthesizer;
use tutor_core::supply::{AssessmentGenerator, AssessmentStore};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub lessons: Arc<dyn LessonSource>,
    pub store: Arc<dyn AssessmentStore>,
    pub dialogue: Arc<dyn DialogueService>,
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
    pub prompts: Arc<PromptSet>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn assessments(&self, session: &SessionConfig) -> AssessmentGenerator {
        AssessmentGenerator::new(self.store.clone(), session.quotas)
    }

    /// A dialogue client configured for one session.
    pub fn dialogue_client(&self, session: &SessionConfig) -> DialogueClient {
        let client = DialogueClient::new(self.dialogue.clone(), session.retry, session.dialogue_timeout);
        match &self.speech {
            Some(speech) => client.with_speech(speech.clone(), session.speech_speed),
            None => client,
        }
    }
}
