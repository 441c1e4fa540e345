use super::{DialogueError, DialogueReply, DialogueRequest, DialogueResponse, DialogueService, StepKind};
use super::hygiene::ReplyHygiene;
use crate::config::RetryPolicy;
use crate::speech::SpeechSynthesizer;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One dialogue call: the request plus how to clean its reply.
#[derive(Debug, Clone)]
pub struct DialogueCall {
    pub step: StepKind,
    pub request: DialogueRequest,
    pub hygiene: ReplyHygiene,
}

impl DialogueCall {
    /// A call with the default hygiene for its step kind.
    pub fn new(step: StepKind, request: DialogueRequest) -> Self {
        Self {
            step,
            request,
            hygiene: ReplyHygiene::for_step(step),
        }
    }

    pub fn with_hygiene(mut self, hygiene: ReplyHygiene) -> Self {
        self.hygiene = hygiene;
        self
    }
}

/// Wraps a [`DialogueService`] with cancellation, timeout, retry, reply
/// hygiene and optional speech synthesis.
#[derive(Clone)]
pub struct DialogueClient {
    service: Arc<dyn DialogueService>,
    speech: Option<Arc<dyn SpeechSynthesizer>>,
    retry: RetryPolicy,
    timeout: Duration,
    speech_speed: f32,
}

impl DialogueClient {
    pub fn new(service: Arc<dyn DialogueService>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            service,
            speech: None,
            retry,
            timeout,
            speech_speed: 1.0,
        }
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechSynthesizer>, speed: f32) -> Self {
        self.speech = Some(speech);
        self.speech_speed = speed;
        self
    }

    /// Sends `call`, returning [`DialogueError::Aborted`] as soon as `cancel` fires.
    pub async fn send(
        &self,
        call: DialogueCall,
        cancel: CancellationToken,
    ) -> Result<DialogueReply, DialogueError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(step = %call.step, "Dialogue call aborted");
                Err(DialogueError::Aborted)
            }
            result = self.run(&call) => result,
        }
    }

    async fn run(&self, call: &DialogueCall) -> Result<DialogueReply, DialogueError> {
        let response = self.respond_with_retry(&call.request).await?;
        let text = call.hygiene.apply(&response.text);
        if text.trim().is_empty() {
            return Err(DialogueError::EmptyReply);
        }

        let speech = match &self.speech {
            Some(synth) => match synth.synthesize(&text, self.speech_speed).await {
                Ok(clip) => Some(clip),
                Err(e) => {
                    warn!(step = %call.step, error = %e, "Speech synthesis failed, using captions only");
                    None
                }
            },
            None => None,
        };

        Ok(DialogueReply {
            step: call.step,
            text,
            speech,
            usage: response.usage,
        })
    }

    async fn respond_with_retry(
        &self,
        request: &DialogueRequest,
    ) -> Result<DialogueResponse, DialogueError> {
        let mut attempt = 0;
        loop {
            let result = tokio::time::timeout(self.timeout, self.service.respond(request.clone()))
                .await
                .unwrap_or(Err(DialogueError::Timeout(self.timeout)));
            match result {
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay(attempt);
                    warn!(attempt, ?delay, error = %e, "Dialogue route not ready, retrying");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
