//! Defines the WebSocket message protocol between the browser client and the API server.

use serde::{Deserialize, Serialize};
use tutor_core::config::TargetOverrides;
use tutor_core::narration::TranscriptLine;
use tutor_core::phase::{Phase, SubPhase, Ticker};
use tutor_core::{MediaState, SessionEvent, SessionInput};

/// How the client reports on an audio clip it was asked to play.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    Started,
    /// The browser refused to play without a user gesture.
    Blocked,
    Failed,
}

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts a session. This must be the first message.
    Init {
        lesson_id: String,
        learner_id: String,
        #[serde(default)]
        overrides: TargetOverrides,
        /// Sample rate of the client's audio context, for decoded playback.
        #[serde(default)]
        audio_rate: Option<u32>,
    },
    Begin,
    Reply {
        text: String,
    },
    Skip,
    Back,
    Pause,
    Resume,
    Mute {
        muted: bool,
    },
    UnlockAudio,
    RefreshAssessments,
    /// Acknowledges an `audio` message.
    Playback {
        clip_id: u64,
        status: PlaybackStatus,
    },
}

impl ClientMessage {
    /// The controller input this message maps to, if any.
    pub fn into_input(self) -> Option<SessionInput> {
        match self {
            ClientMessage::Begin => Some(SessionInput::Begin),
            ClientMessage::Reply { text } => Some(SessionInput::Reply(text)),
            ClientMessage::Skip => Some(SessionInput::Skip),
            ClientMessage::Back => Some(SessionInput::Back),
            ClientMessage::Pause => Some(SessionInput::Pause),
            ClientMessage::Resume => Some(SessionInput::Resume),
            ClientMessage::Mute { muted } => Some(SessionInput::Mute(muted)),
            ClientMessage::UnlockAudio => Some(SessionInput::UnlockAudio),
            ClientMessage::RefreshAssessments => Some(SessionInput::RefreshAssessments),
            ClientMessage::Init { .. } | ClientMessage::Playback { .. } => None,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AudioAction {
    Pause,
    Resume,
    Stop,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the session is ready for `begin`.
    Initialized {
        lesson_id: String,
        title: String,
    },
    Phase {
        phase: Phase,
        sub_phase: SubPhase,
        ticker: Ticker,
    },
    Transcript {
        line: TranscriptLine,
    },
    Caption {
        batch: u64,
        index: usize,
        text: String,
    },
    /// A clip to play. The client answers with a `playback` message.
    Audio {
        clip_id: u64,
        strategy: &'static str,
        sample_rate: u32,
        /// Base64 PCM16, little endian, mono.
        data: String,
    },
    AudioControl {
        clip_id: u64,
        action: AudioAction,
    },
    AwaitingLearner,
    SoundBlocked,
    Media {
        state: MediaState,
    },
    Score {
        correct: u32,
        total: u32,
        percent: u32,
    },
    Notice {
        message: String,
    },
    Error {
        message: String,
    },
    Finished,
}

impl From<SessionEvent> for ServerMessage {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::PhaseChanged {
                phase,
                sub_phase,
                ticker,
            } => ServerMessage::Phase {
                phase,
                sub_phase,
                ticker,
            },
            SessionEvent::Transcript(line) => ServerMessage::Transcript { line },
            SessionEvent::Caption { batch, index, text } => {
                ServerMessage::Caption { batch, index, text }
            }
            SessionEvent::AwaitingLearner => ServerMessage::AwaitingLearner,
            SessionEvent::SoundBlocked => ServerMessage::SoundBlocked,
            SessionEvent::Media(state) => ServerMessage::Media { state },
            SessionEvent::Score(score) => ServerMessage::Score {
                correct: score.correct,
                total: score.total,
                percent: score.percent,
            },
            SessionEvent::Notice(message) => ServerMessage::Notice { message },
            SessionEvent::Unavailable(message) => ServerMessage::Error { message },
            SessionEvent::Finished => ServerMessage::Finished,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_core::verdict::ReviewScore;

    #[test]
    fn test_init_message_defaults() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "init", "lesson_id": "l1", "learner_id": "u1"}"#)
                .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Init {
                lesson_id: "l1".to_string(),
                learner_id: "u1".to_string(),
                overrides: TargetOverrides::default(),
                audio_rate: None,
            }
        );
    }

    #[test]
    fn test_client_messages_map_to_inputs() {
        let reply: ClientMessage =
            serde_json::from_str(r#"{"type": "reply", "text": "seven"}"#).unwrap();
        assert_eq!(reply.into_input(), Some(SessionInput::Reply("seven".to_string())));

        let mute: ClientMessage = serde_json::from_str(r#"{"type": "mute", "muted": true}"#).unwrap();
        assert_eq!(mute.into_input(), Some(SessionInput::Mute(true)));

        let ack: ClientMessage =
            serde_json::from_str(r#"{"type": "playback", "clip_id": 3, "status": "blocked"}"#)
                .unwrap();
        assert_eq!(
            ack,
            ClientMessage::Playback {
                clip_id: 3,
                status: PlaybackStatus::Blocked
            }
        );
        assert_eq!(ack.into_input(), None);
    }

    #[test]
    fn test_server_message_shapes() {
        let score = ServerMessage::from(SessionEvent::Score(ReviewScore::new(1, 3)));
        let json = serde_json::to_value(&score).unwrap();
        assert_eq!(json["type"], "score");
        assert_eq!(json["percent"], 33);

        let phase = ServerMessage::from(SessionEvent::PhaseChanged {
            phase: Phase::Exercise,
            sub_phase: SubPhase::AwaitingBegin,
            ticker: Ticker::default(),
        });
        let json = serde_json::to_value(&phase).unwrap();
        assert_eq!(json["type"], "phase");
        assert_eq!(json["sub_phase"], "awaiting-begin");

        let unavailable = ServerMessage::from(SessionEvent::Unavailable("down".to_string()));
        assert_eq!(
            unavailable,
            ServerMessage::Error {
                message: "down".to_string()
            }
        );
    }
}
