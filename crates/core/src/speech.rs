use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{CreateSpeechRequestArgs, SpeechModel, SpeechResponseFormat, Voice},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Sample rate of the raw PCM returned by the speech endpoint.
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

/// Synthesized speech as raw 16-bit little-endian mono PCM.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechClip {
    pub audio: Bytes,
    pub sample_rate: u32,
}

impl SpeechClip {
    pub fn new(audio: Bytes, sample_rate: u32) -> Self {
        Self { audio, sample_rate }
    }

    /// Playback length derived from the sample count.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let samples = self.audio.len() / 2;
        Duration::from_secs_f64(samples as f64 / self.sample_rate as f64)
    }
}

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
    #[error("speech synthesis returned no audio")]
    Empty,
}

/// Text to audio. Failures degrade the session to caption-only pacing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, speed: f32) -> Result<SpeechClip, SpeechError>;
}

/// Speech synthesis through an OpenAI-compatible speech endpoint.
pub struct OpenAiSpeechSynthesizer {
    client: Client<OpenAIConfig>,
    model: String,
    voice: Voice,
}

impl OpenAiSpeechSynthesizer {
    pub fn new(config: OpenAIConfig, model: String, voice: &str) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            voice: parse_voice(voice),
        }
    }
}

fn parse_voice(name: &str) -> Voice {
    match name.trim().to_ascii_lowercase().as_str() {
        "alloy" => Voice::Alloy,
        "echo" => Voice::Echo,
        "fable" => Voice::Fable,
        "onyx" => Voice::Onyx,
        "nova" => Voice::Nova,
        "shimmer" => Voice::Shimmer,
        other => {
            warn!(voice = %other, "Unknown speech voice, using alloy");
            Voice::Alloy
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeechSynthesizer {
    async fn synthesize(&self, text: &str, speed: f32) -> Result<SpeechClip, SpeechError> {
        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .model(SpeechModel::Other(self.model.clone()))
            .voice(self.voice.clone())
            .response_format(SpeechResponseFormat::Pcm)
            .speed(speed.clamp(0.25, 4.0))
            .build()
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;

        let response = self
            .client
            .audio()
            .speech(request)
            .await
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;

        if response.bytes.is_empty() {
            return Err(SpeechError::Empty);
        }
        debug!(bytes = response.bytes.len(), "Synthesized speech");
        Ok(SpeechClip::new(response.bytes, SPEECH_SAMPLE_RATE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_duration_from_pcm16_length() {
        // one second of 24 kHz mono PCM16
        let clip = SpeechClip::new(Bytes::from(vec![0u8; 48_000]), SPEECH_SAMPLE_RATE);
        assert_eq!(clip.duration(), Duration::from_secs(1));
        assert_eq!(SpeechClip::new(Bytes::new(), 0).duration(), Duration::ZERO);
    }

    #[test]
    fn test_parse_voice_falls_back_to_alloy() {
        assert!(matches!(parse_voice("Nova"), Voice::Nova));
        assert!(matches!(parse_voice("robot"), Voice::Alloy));
    }
}
