use super::{DialogueError, DialogueRequest, DialogueResponse, DialogueService, Usage};
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse,
    },
};
use async_trait::async_trait;
use tracing::debug;

/// A `DialogueService` for any OpenAI-compatible chat completions API.
pub struct OpenAiDialogueService {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiDialogueService {
    /// Creates a new service.
    ///
    /// # Arguments
    ///
    /// * `config` - API key and base URL of the OpenAI-compatible endpoint.
    /// * `model` - The chat model identifier (e.g., "gpt-4o-mini").
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }

    fn messages(
        request: &DialogueRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        let mut user = request.instruction.clone();
        if let Some(utterance) = request.utterance.as_deref().filter(|u| !u.trim().is_empty()) {
            user.push_str(&format!("\n\nThe learner said: \"{}\"", utterance.trim()));
        }
        Ok(vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.context.clone())
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()?
                .into(),
        ])
    }
}

/// Maps an HTTP status onto the dialogue error taxonomy.
pub fn classify_status(status: u16, message: String) -> DialogueError {
    match status {
        425 | 502 | 503 | 504 => DialogueError::NotReady(message),
        _ => DialogueError::Status {
            status: Some(status),
            message,
        },
    }
}

fn classify(error: OpenAIError) -> DialogueError {
    match error {
        OpenAIError::Reqwest(e) => {
            if e.is_timeout() {
                DialogueError::NotReady(e.to_string())
            } else if let Some(status) = e.status() {
                classify_status(status.as_u16(), e.to_string())
            } else {
                DialogueError::Transport(e.to_string())
            }
        }
        OpenAIError::ApiError(api) => {
            let lowered = api.message.to_ascii_lowercase();
            if lowered.contains("not ready")
                || lowered.contains("unavailable")
                || lowered.contains("overloaded")
            {
                DialogueError::NotReady(api.message)
            } else {
                DialogueError::Status {
                    status: None,
                    message: api.message,
                }
            }
        }
        other => DialogueError::Transport(other.to_string()),
    }
}

#[async_trait]
impl DialogueService for OpenAiDialogueService {
    async fn respond(&self, request: DialogueRequest) -> Result<DialogueResponse, DialogueError> {
        let messages = Self::messages(&request).map_err(classify)?;
        let chat = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()
            .map_err(classify)?;

        debug!(
            model = %self.model,
            phase = %request.metadata.phase,
            sub_phase = %request.metadata.sub_phase,
            "Sending dialogue request"
        );
        let response: CreateChatCompletionResponse =
            self.client.chat().create(chat).await.map_err(classify)?;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();
        let usage = response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });
        Ok(DialogueResponse { text, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_statuses_are_not_ready() {
        for status in [425, 502, 503, 504] {
            assert!(classify_status(status, "busy".into()).is_retryable());
        }
        assert!(matches!(
            classify_status(401, "bad key".into()),
            DialogueError::Status {
                status: Some(401),
                ..
            }
        ));
    }

    #[test]
    fn test_request_building_errors_are_transport() {
        assert!(matches!(
            classify(OpenAIError::InvalidArgument("model".into())),
            DialogueError::Transport(_)
        ));
    }
}
