use crate::speech::SpeechClip;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// Playback refused until the learner makes a gesture (autoplay policy).
    #[error("playback blocked until the learner enables sound")]
    Blocked,
    #[error("playback failed: {0}")]
    Failed(String),
}

/// One way of getting audio to the learner's ears.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaybackStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn start(&self, clip: &SpeechClip) -> Result<(), PlaybackError>;
    async fn pause(&self);
    async fn resume(&self);
    async fn stop(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "strategy")]
pub enum PlaybackOutcome {
    Playing(&'static str),
    /// Sound is blocked; the learner must enable it.
    NeedsGesture,
    /// No strategy could play; captions pace the reply alone.
    CaptionOnly,
}

/// Ordered playback strategies tried in sequence.
///
/// A blocked start before the learner has unlocked audio asks for a gesture
/// and keeps the clip. After the unlock the clip is replayed, and whichever
/// strategy succeeds is tried first from then on.
///
/// The chain's state sits behind a short-lived lock that is never held
/// across a strategy call, so `pause`, `resume` and `stop` go through while
/// a start is still waiting on the client.
pub struct PlaybackChain {
    strategies: Vec<Arc<dyn PlaybackStrategy>>,
    state: Mutex<ChainState>,
}

#[derive(Default)]
struct ChainState {
    unlocked: bool,
    preferred: Option<usize>,
    muted: bool,
    active: Option<usize>,
    pending: Option<SpeechClip>,
    /// A start that lands while paused is paused straight away.
    paused: bool,
    /// Bumped by every stop; a start that finishes under an older
    /// generation has been superseded.
    generation: u64,
}

impl PlaybackChain {
    pub fn new(strategies: Vec<Arc<dyn PlaybackStrategy>>) -> Self {
        Self {
            strategies,
            state: Mutex::new(ChainState::default()),
        }
    }

    /// A chain with no strategies: everything is caption-only.
    pub fn silent() -> Self {
        Self::new(Vec::new())
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_unlocked(&self) -> bool {
        self.state().unlocked
    }

    pub fn set_muted(&self, muted: bool) {
        self.state().muted = muted;
    }

    fn order(&self, preferred: Option<usize>) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.strategies.len()).collect();
        if let Some(p) = preferred {
            order.retain(|i| *i != p);
            order.insert(0, p);
        }
        order
    }

    pub async fn play(&self, clip: &SpeechClip) -> PlaybackOutcome {
        self.stop().await;
        let (generation, muted, preferred) = {
            let state = self.state();
            (state.generation, state.muted, state.preferred)
        };
        if muted {
            debug!("Muted, pacing with captions only");
            return PlaybackOutcome::CaptionOnly;
        }
        for i in self.order(preferred) {
            if self.state().generation != generation {
                debug!("Playback superseded before it started");
                return PlaybackOutcome::CaptionOnly;
            }
            let strategy = self.strategies[i].clone();
            let result = strategy.start(clip).await;
            match result {
                Ok(()) => {
                    let (superseded, paused) = {
                        let mut state = self.state();
                        if state.generation == generation {
                            state.active = Some(i);
                            if state.unlocked {
                                state.preferred = Some(i);
                            }
                            (false, state.paused)
                        } else {
                            (true, false)
                        }
                    };
                    if superseded {
                        debug!(strategy = strategy.name(), "Playback superseded while starting, stopping it");
                        strategy.stop().await;
                        return PlaybackOutcome::CaptionOnly;
                    }
                    if paused {
                        strategy.pause().await;
                    }
                    return PlaybackOutcome::Playing(strategy.name());
                }
                Err(PlaybackError::Blocked) => {
                    let blocked = {
                        let mut state = self.state();
                        let blocked = !state.unlocked;
                        if blocked && state.generation == generation {
                            state.pending = Some(clip.clone());
                        }
                        blocked
                    };
                    if blocked {
                        info!(strategy = strategy.name(), "Playback blocked, asking learner to enable sound");
                        return PlaybackOutcome::NeedsGesture;
                    }
                    warn!(strategy = strategy.name(), "Playback blocked after unlock, trying next");
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "Playback strategy failed, trying next");
                }
            }
        }
        warn!("Every playback strategy failed, continuing with captions only");
        PlaybackOutcome::CaptionOnly
    }

    /// Records the learner's gesture and replays the clip that was blocked, if any.
    pub async fn unlock(&self) -> Option<PlaybackOutcome> {
        let clip = {
            let mut state = self.state();
            state.unlocked = true;
            state.pending.take()
        }?;
        Some(self.play(&clip).await)
    }

    pub async fn pause(&self) {
        let active = {
            let mut state = self.state();
            state.paused = true;
            state.active
        };
        if let Some(i) = active {
            self.strategies[i].pause().await;
        }
    }

    pub async fn resume(&self) {
        let active = {
            let mut state = self.state();
            state.paused = false;
            state.active
        };
        if let Some(i) = active {
            self.strategies[i].resume().await;
        }
    }

    pub async fn stop(&self) {
        let active = {
            let mut state = self.state();
            state.pending = None;
            state.generation += 1;
            state.active.take()
        };
        if let Some(i) = active {
            self.strategies[i].stop().await;
        }
    }
}
