//! Speech & Caption Synchronizer
//!
//! Turns a reply into transcript lines and timed captions, and drives audio
//! through the playback chain. Everything it learns (caption advances,
//! narration end, playback outcomes) comes back to the controller as
//! [`NarrationEvent`]s tagged with the batch they belong to.

pub mod captions;
pub mod playback;

pub use captions::{CaptionPlan, CaptionScheduler, CaptionTiming};
pub use playback::{PlaybackChain, PlaybackError, PlaybackOutcome, PlaybackStrategy};

use crate::speech::SpeechClip;
use crate::text::sentences;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum NarrationEvent {
    Caption {
        batch: u64,
        index: usize,
        text: String,
    },
    /// The batch's narration time has fully elapsed.
    Finished { batch: u64 },
    Playback {
        batch: u64,
        outcome: PlaybackOutcome,
    },
}

impl NarrationEvent {
    pub fn batch(&self) -> u64 {
        match self {
            NarrationEvent::Caption { batch, .. }
            | NarrationEvent::Finished { batch }
            | NarrationEvent::Playback { batch, .. } => *batch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Tutor,
    Learner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    lines: Vec<TranscriptLine>,
}

impl Transcript {
    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) -> TranscriptLine {
        let line = TranscriptLine {
            speaker,
            text: text.into(),
        };
        self.lines.push(line.clone());
        line
    }

    pub fn lines(&self) -> &[TranscriptLine] {
        &self.lines
    }
}

/// What a call to [`Narrator::present`] produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Presented {
    pub batch: u64,
    pub lines: Vec<TranscriptLine>,
}

pub struct Narrator {
    scheduler: CaptionScheduler,
    chain: Arc<PlaybackChain>,
    events: mpsc::UnboundedSender<NarrationEvent>,
    transcript: Transcript,
    next_batch: u64,
    playback_cancel: CancellationToken,
    paused: bool,
    /// Clip of a batch presented while paused; played on resume.
    held: Option<(u64, SpeechClip)>,
}

impl Narrator {
    pub fn new(
        chain: PlaybackChain,
        timing: CaptionTiming,
        events: mpsc::UnboundedSender<NarrationEvent>,
    ) -> Self {
        Self {
            scheduler: CaptionScheduler::new(events.clone(), timing),
            chain: Arc::new(chain),
            events,
            transcript: Transcript::default(),
            next_batch: 1,
            playback_cancel: CancellationToken::new(),
            paused: false,
            held: None,
        }
    }

    pub fn current_batch(&self) -> Option<u64> {
        self.scheduler.current_batch()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Adds a learner line. Learner lines are never narrated.
    pub fn push_learner(&mut self, text: &str) -> TranscriptLine {
        self.transcript.push(Speaker::Learner, text.trim())
    }

    /// Narrates a reply, superseding whatever was playing.
    ///
    /// While paused the new batch is queued at its first sentence and its
    /// audio is held, so nothing is shown or heard until [`resume`](Self::resume).
    pub async fn present(&mut self, text: &str, clip: Option<SpeechClip>) -> Presented {
        self.halt().await;
        let batch = self.next_batch;
        self.next_batch += 1;

        let parts = sentences(text);
        let lines: Vec<TranscriptLine> = parts
            .iter()
            .map(|s| self.transcript.push(Speaker::Tutor, s.clone()))
            .collect();

        let audio = clip.as_ref().map(SpeechClip::duration);
        if self.paused {
            self.scheduler.schedule_paused(batch, parts, audio);
            self.held = clip.map(|clip| (batch, clip));
            debug!(batch, lines = lines.len(), "Presented reply while paused");
        } else {
            self.scheduler.schedule(batch, parts, audio);
            if let Some(clip) = clip {
                self.start_playback(batch, clip);
            }
            debug!(batch, lines = lines.len(), "Presented reply");
        }
        Presented { batch, lines }
    }

    fn start_playback(&mut self, batch: u64, clip: SpeechClip) {
        let cancel = CancellationToken::new();
        self.playback_cancel = cancel.clone();
        let chain = self.chain.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            if cancel.is_cancelled() {
                return;
            }
            let outcome = chain.play(&clip).await;
            if cancel.is_cancelled() {
                return;
            }
            let _ = events.send(NarrationEvent::Playback { batch, outcome });
        });
    }

    /// The learner's gesture: replays a blocked clip for the current batch.
    pub fn unlock(&mut self) {
        let chain = self.chain.clone();
        let Some(batch) = self.current_batch() else {
            tokio::spawn(async move {
                chain.unlock().await;
            });
            return;
        };
        let cancel = self.playback_cancel.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = chain.unlock().await;
            if cancel.is_cancelled() {
                return;
            }
            if let Some(outcome) = outcome {
                let _ = events.send(NarrationEvent::Playback { batch, outcome });
            }
        });
    }

    pub async fn pause(&mut self) {
        self.paused = true;
        self.scheduler.pause();
        self.chain.pause().await;
    }

    pub async fn resume(&mut self) {
        self.paused = false;
        self.scheduler.resume();
        self.chain.resume().await;
        if let Some((batch, clip)) = self.held.take() {
            if Some(batch) == self.current_batch() {
                self.start_playback(batch, clip);
            }
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.chain.set_muted(muted);
    }

    /// Stops everything and leaves the paused state.
    pub async fn stop_all(&mut self) {
        self.halt().await;
        self.paused = false;
        self.chain.resume().await;
    }

    /// Cancels playback starts and caption timers, and stops any audio.
    async fn halt(&mut self) {
        self.playback_cancel.cancel();
        self.held = None;
        self.scheduler.cancel_all();
        self.chain.stop().await;
    }
}
