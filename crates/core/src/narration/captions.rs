use super::NarrationEvent;
use crate::text::word_count;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptionTiming {
    /// Shortest time any sentence stays on screen.
    pub min_sentence: Duration,
    /// Reading pace used when no audio duration is known.
    pub words_per_second: f64,
}

impl Default for CaptionTiming {
    fn default() -> Self {
        Self {
            min_sentence: Duration::from_millis(600),
            words_per_second: 2.6,
        }
    }
}

impl CaptionTiming {
    pub fn estimate(&self, words: usize) -> Duration {
        if self.words_per_second <= 0.0 {
            return self.min_sentence * words.max(1) as u32;
        }
        Duration::from_secs_f64(words as f64 / self.words_per_second)
    }
}

/// Start offsets of each sentence within a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionPlan {
    pub offsets: Vec<Duration>,
    pub total: Duration,
}

impl CaptionPlan {
    /// Each sentence gets a share of the remaining duration proportional to
    /// its word count, never less than the floor. Without an audio duration
    /// the total is estimated from the word count.
    pub fn new(sentences: &[String], audio: Option<Duration>, timing: &CaptionTiming) -> Self {
        let counts: Vec<usize> = sentences.iter().map(|s| word_count(s).max(1)).collect();
        let total_words: usize = counts.iter().sum();
        let total = audio
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| timing.estimate(total_words));

        let mut offsets = Vec::with_capacity(counts.len());
        let mut elapsed = Duration::ZERO;
        let mut remaining = total;
        let mut remaining_words = total_words;
        for words in counts {
            offsets.push(elapsed);
            let share = if remaining_words == 0 {
                Duration::ZERO
            } else {
                remaining.mul_f64(words as f64 / remaining_words as f64)
            };
            let share = share.max(timing.min_sentence);
            elapsed += share;
            remaining = remaining.saturating_sub(share);
            remaining_words -= words;
        }
        Self {
            offsets,
            total: total.max(elapsed),
        }
    }

    /// Index of the first sentence not yet shown after `elapsed`.
    fn next_index(&self, elapsed: Duration) -> usize {
        self.offsets
            .iter()
            .position(|o| *o > elapsed)
            .unwrap_or(self.offsets.len())
    }
}

struct ActiveBatch {
    id: u64,
    sentences: Vec<String>,
    plan: CaptionPlan,
    /// Instant matching offset zero; shifted on resume.
    origin: Instant,
    paused_at: Option<Duration>,
    cancel: CancellationToken,
}

/// Owns the caption timers. At most one batch is scheduled at any time.
pub struct CaptionScheduler {
    events: mpsc::UnboundedSender<NarrationEvent>,
    timing: CaptionTiming,
    current: Option<ActiveBatch>,
}

impl CaptionScheduler {
    pub fn new(events: mpsc::UnboundedSender<NarrationEvent>, timing: CaptionTiming) -> Self {
        Self {
            events,
            timing,
            current: None,
        }
    }

    pub fn current_batch(&self) -> Option<u64> {
        self.current.as_ref().map(|b| b.id)
    }

    pub fn is_paused(&self) -> bool {
        self.current.as_ref().is_some_and(|b| b.paused_at.is_some())
    }

    /// Schedules a new batch, clearing every timer from the previous one first.
    pub fn schedule(&mut self, id: u64, sentences: Vec<String>, audio: Option<Duration>) {
        let batch = self.replace_batch(id, sentences, audio);
        self.spawn_from(&batch, Duration::ZERO);
        self.current = Some(batch);
    }

    /// Like [`schedule`](Self::schedule), but the batch starts out paused at
    /// its first sentence and nothing is shown until [`resume`](Self::resume).
    pub fn schedule_paused(&mut self, id: u64, sentences: Vec<String>, audio: Option<Duration>) {
        let mut batch = self.replace_batch(id, sentences, audio);
        batch.paused_at = Some(Duration::ZERO);
        self.current = Some(batch);
    }

    fn replace_batch(&mut self, id: u64, sentences: Vec<String>, audio: Option<Duration>) -> ActiveBatch {
        self.cancel_all();
        let plan = CaptionPlan::new(&sentences, audio, &self.timing);
        debug!(batch = id, sentences = sentences.len(), total = ?plan.total, "Scheduling captions");
        ActiveBatch {
            id,
            sentences,
            plan,
            origin: Instant::now(),
            paused_at: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Halts timers, keeping progress.
    pub fn pause(&mut self) {
        if let Some(batch) = self.current.as_mut() {
            if batch.paused_at.is_some() {
                return;
            }
            let elapsed = Instant::now().saturating_duration_since(batch.origin);
            batch.cancel.cancel();
            batch.paused_at = Some(elapsed);
            debug!(batch = batch.id, ?elapsed, "Captions paused");
        }
    }

    /// Re-schedules only the remaining slice of the paused batch.
    pub fn resume(&mut self) {
        let Some(mut batch) = self.current.take() else {
            return;
        };
        if let Some(elapsed) = batch.paused_at.take() {
            batch.origin = Instant::now() - elapsed;
            batch.cancel = CancellationToken::new();
            debug!(batch = batch.id, ?elapsed, "Captions resumed");
            self.spawn_from(&batch, elapsed);
        }
        self.current = Some(batch);
    }

    pub fn cancel_all(&mut self) {
        if let Some(batch) = self.current.take() {
            batch.cancel.cancel();
        }
    }

    fn spawn_from(&self, batch: &ActiveBatch, elapsed: Duration) {
        let first = batch.plan.next_index(elapsed);
        let first = if elapsed.is_zero() { 0 } else { first };
        let cues: Vec<(usize, Instant, String)> = (first..batch.sentences.len())
            .map(|i| {
                (
                    i,
                    batch.origin + batch.plan.offsets[i],
                    batch.sentences[i].clone(),
                )
            })
            .collect();
        let end = batch.origin + batch.plan.total;
        let id = batch.id;
        let cancel = batch.cancel.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            for (index, at, text) in cues {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = sleep_until(at) => {}
                }
                if events
                    .send(NarrationEvent::Caption {
                        batch: id,
                        index,
                        text,
                    })
                    .is_err()
                {
                    return;
                }
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = sleep_until(end) => {}
            }
            let _ = events.send(NarrationEvent::Finished { batch: id });
        });
    }
}

impl Drop for CaptionScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
