//! Playback strategies that run on the browser, driven over the socket.
//!
//! Each clip is sent as an `audio` message and the strategy waits for the
//! client's `playback` acknowledgement to learn whether it actually started.

use super::protocol::{AudioAction, PlaybackStatus, ServerMessage};
use crate::audio_utils::{encode_f32_to_base64_i16, encode_pcm16, pcm16_to_f32, resample};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, warn};
use tutor_core::narration::{PlaybackError, PlaybackStrategy};
use tutor_core::speech::SpeechClip;

/// Shared link to the client's audio players.
pub struct ClientAudio {
    outbound: mpsc::UnboundedSender<ServerMessage>,
    acks: Mutex<HashMap<u64, oneshot::Sender<PlaybackStatus>>>,
    current: Mutex<Option<u64>>,
    next_clip: AtomicU64,
    ack_timeout: Duration,
}

impl ClientAudio {
    pub fn new(outbound: mpsc::UnboundedSender<ServerMessage>, ack_timeout: Duration) -> Self {
        Self {
            outbound,
            acks: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            next_clip: AtomicU64::new(1),
            ack_timeout,
        }
    }

    /// Routes a client `playback` message to the strategy waiting on it.
    pub async fn acknowledge(&self, clip_id: u64, status: PlaybackStatus) {
        match self.acks.lock().await.remove(&clip_id) {
            Some(waiter) => {
                let _ = waiter.send(status);
            }
            None => debug!(clip_id, ?status, "Acknowledgement for an unknown or superseded clip"),
        }
    }

    async fn play(&self, strategy: &'static str, sample_rate: u32, data: String) -> Result<(), PlaybackError> {
        let clip_id = self.next_clip.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut acks = self.acks.lock().await;
            acks.clear();
            acks.insert(clip_id, tx);
        }
        self.outbound
            .send(ServerMessage::Audio {
                clip_id,
                strategy,
                sample_rate,
                data,
            })
            .map_err(|_| PlaybackError::Failed("client connection closed".to_string()))?;

        let status = match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(status)) => status,
            Ok(Err(_)) => return Err(PlaybackError::Failed("clip superseded".to_string())),
            Err(_) => {
                self.acks.lock().await.remove(&clip_id);
                return Err(PlaybackError::Failed("no acknowledgement from client".to_string()));
            }
        };
        match status {
            PlaybackStatus::Started => {
                *self.current.lock().await = Some(clip_id);
                Ok(())
            }
            PlaybackStatus::Blocked => Err(PlaybackError::Blocked),
            PlaybackStatus::Failed => Err(PlaybackError::Failed(format!("{strategy} player failed"))),
        }
    }

    async fn control(&self, action: AudioAction) {
        let current = match action {
            AudioAction::Stop => self.current.lock().await.take(),
            _ => *self.current.lock().await,
        };
        if let Some(clip_id) = current {
            let _ = self
                .outbound
                .send(ServerMessage::AudioControl { clip_id, action });
        }
    }
}

/// PCM16 streamed at its native rate to a media element.
pub struct StreamedPlayback {
    audio: Arc<ClientAudio>,
}

impl StreamedPlayback {
    pub fn new(audio: Arc<ClientAudio>) -> Self {
        Self { audio }
    }
}

#[async_trait]
impl PlaybackStrategy for StreamedPlayback {
    fn name(&self) -> &'static str {
        "streamed"
    }

    async fn start(&self, clip: &SpeechClip) -> Result<(), PlaybackError> {
        self.audio
            .play(self.name(), clip.sample_rate, encode_pcm16(&clip.audio))
            .await
    }

    async fn pause(&self) {
        self.audio.control(AudioAction::Pause).await;
    }

    async fn resume(&self) {
        self.audio.control(AudioAction::Resume).await;
    }

    async fn stop(&self) {
        self.audio.control(AudioAction::Stop).await;
    }
}

/// PCM resampled to the client's audio-context rate and played through a
/// decoded buffer source.
pub struct DecodedPlayback {
    audio: Arc<ClientAudio>,
    target_rate: u32,
}

impl DecodedPlayback {
    pub fn new(audio: Arc<ClientAudio>, target_rate: u32) -> Self {
        Self { audio, target_rate }
    }
}

#[async_trait]
impl PlaybackStrategy for DecodedPlayback {
    fn name(&self) -> &'static str {
        "decoded"
    }

    async fn start(&self, clip: &SpeechClip) -> Result<(), PlaybackError> {
        let samples = pcm16_to_f32(&clip.audio);
        let resampled = resample(&samples, clip.sample_rate, self.target_rate).map_err(|e| {
            warn!(error = %e, "Resampling failed");
            PlaybackError::Failed(e.to_string())
        })?;
        self.audio
            .play(self.name(), self.target_rate, encode_f32_to_base64_i16(&resampled))
            .await
    }

    async fn pause(&self) {
        self.audio.control(AudioAction::Pause).await;
    }

    async fn resume(&self) {
        self.audio.control(AudioAction::Resume).await;
    }

    async fn stop(&self) {
        self.audio.control(AudioAction::Stop).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn clip() -> SpeechClip {
        SpeechClip::new(Bytes::from(vec![0u8; 4800]), 24_000)
    }

    /// Answers every `audio` message with `status`, forwarding what it saw.
    fn spawn_client(
        audio: Arc<ClientAudio>,
        mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
        status: PlaybackStatus,
    ) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (seen_tx, seen) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(msg) = outbound.recv().await {
                if let ServerMessage::Audio { clip_id, .. } = &msg {
                    audio.acknowledge(*clip_id, status).await;
                }
                let _ = seen_tx.send(msg);
            }
        });
        seen
    }

    #[tokio::test]
    async fn test_streamed_start_waits_for_ack() {
        let (tx, rx) = mpsc::unbounded_channel();
        let audio = Arc::new(ClientAudio::new(tx, Duration::from_secs(2)));
        let mut seen = spawn_client(audio.clone(), rx, PlaybackStatus::Started);

        let strategy = StreamedPlayback::new(audio.clone());
        assert_eq!(strategy.start(&clip()).await, Ok(()));
        strategy.pause().await;

        match seen.recv().await.unwrap() {
            ServerMessage::Audio {
                strategy,
                sample_rate,
                ..
            } => {
                assert_eq!(strategy, "streamed");
                assert_eq!(sample_rate, 24_000);
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert!(matches!(
            seen.recv().await.unwrap(),
            ServerMessage::AudioControl {
                action: AudioAction::Pause,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_blocked_ack_maps_to_blocked() {
        let (tx, rx) = mpsc::unbounded_channel();
        let audio = Arc::new(ClientAudio::new(tx, Duration::from_secs(2)));
        let _seen = spawn_client(audio.clone(), rx, PlaybackStatus::Blocked);

        let strategy = StreamedPlayback::new(audio);
        assert_eq!(strategy.start(&clip()).await, Err(PlaybackError::Blocked));
    }

    #[tokio::test]
    async fn test_decoded_resamples_to_client_rate() {
        let (tx, rx) = mpsc::unbounded_channel();
        let audio = Arc::new(ClientAudio::new(tx, Duration::from_secs(2)));
        let mut seen = spawn_client(audio.clone(), rx, PlaybackStatus::Started);

        let strategy = DecodedPlayback::new(audio, 48_000);
        assert_eq!(strategy.start(&clip()).await, Ok(()));
        match seen.recv().await.unwrap() {
            ServerMessage::Audio { sample_rate, .. } => assert_eq!(sample_rate, 48_000),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_ack_times_out_as_failure() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let audio = Arc::new(ClientAudio::new(tx, Duration::from_secs(2)));
        let strategy = StreamedPlayback::new(audio);
        assert!(matches!(
            strategy.start(&clip()).await,
            Err(PlaybackError::Failed(_))
        ));
    }
}
