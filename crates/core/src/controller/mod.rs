//! Phase Controller
//!
//! The session state machine. One task owns all session state and reacts to
//! three streams: learner input, dialogue results and narration events.
//! Dialogue calls run as spawned tasks tagged with an `(epoch, seq)` ticket;
//! a forced transition bumps the epoch so anything still in flight is
//! discarded when it lands.

pub mod directives;

use crate::config::SessionConfig;
use crate::dialogue::{
    ContextComposer, DialogueCall, DialogueClient, DialogueError, DialogueReply, DialogueRequest,
    GuardrailLedger, PromptSet, ReplyHygiene, SessionMetadata, StepKind,
};
use crate::judge::{JudgeContract, Judgment, judge};
use crate::lesson::{Lesson, QuestionItem};
use crate::narration::{NarrationEvent, Narrator, PlaybackChain, PlaybackOutcome, TranscriptLine};
use crate::phase::{Phase, SubPhase, Ticker};
use crate::review::{ReviewSequencer, TestResponse, closing_instruction};
use crate::supply::{AssessmentGenerator, AssessmentKey, QuestionSupply, StoredAssessments};
use crate::verdict::{CuePicker, LeadIn, ReviewScore, read_lead_in};
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const UNAVAILABLE_MESSAGE: &str = "The tutor can't respond right now. Press begin to try again.";
const NO_QUESTIONS_MESSAGE: &str =
    "There are no questions for this part of the lesson. Skip ahead when you're ready.";
const FINISH_TEST_MESSAGE: &str = "Let's finish the test first.";

/// Learner and UI actions.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    Begin,
    Reply(String),
    Skip,
    Back,
    Pause,
    Resume,
    Mute(bool),
    UnlockAudio,
    RefreshAssessments,
    Shutdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MediaState {
    pub paused: bool,
    pub muted: bool,
}

/// Everything the controller reports outward.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PhaseChanged {
        phase: Phase,
        sub_phase: SubPhase,
        ticker: Ticker,
    },
    Transcript(TranscriptLine),
    Caption {
        batch: u64,
        index: usize,
        text: String,
    },
    /// The controller is waiting for the learner to answer.
    AwaitingLearner,
    /// Audio was blocked; show an "enable sound" control.
    SoundBlocked,
    Media(MediaState),
    Score(ReviewScore),
    Notice(String),
    Unavailable(String),
    Finished,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("the session controller has stopped")]
    Closed,
}

/// Collaborators a session is built from.
pub struct SessionDeps {
    pub dialogue: DialogueClient,
    pub assessments: AssessmentGenerator,
    pub prompts: Arc<PromptSet>,
    pub playback: PlaybackChain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    epoch: u64,
    seq: u64,
}

/// What to do with a reply once it arrives.
#[derive(Debug, Clone)]
enum Purpose {
    Greeting,
    Banter { teach_next: bool },
    Teach,
    Ask(QuestionItem),
    Judge { item: QuestionItem, local: Judgment },
    Review,
    Closing,
}

#[derive(Debug, Clone)]
struct PendingCall {
    purpose: Purpose,
    call: DialogueCall,
}

struct InFlight {
    ticket: Ticket,
    cancel: CancellationToken,
    pending: PendingCall,
}

struct CallResult {
    ticket: Ticket,
    phase: Phase,
    result: Result<DialogueReply, DialogueError>,
}

/// Internal work items, run after each handled message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    StartPhase,
    StartTeaching,
    AskNext,
    Advance,
    BeginReview,
    NextReview,
    Finish,
}

struct Receivers {
    results: mpsc::UnboundedReceiver<CallResult>,
    narration: mpsc::UnboundedReceiver<NarrationEvent>,
}

pub struct PhaseController {
    config: Arc<SessionConfig>,
    lesson: Arc<Lesson>,
    key: AssessmentKey,
    dialogue: DialogueClient,
    assessments: AssessmentGenerator,
    composer: ContextComposer,
    ledger: GuardrailLedger,
    supply: QuestionSupply,
    narrator: Narrator,
    picker: CuePicker,
    events: mpsc::UnboundedSender<SessionEvent>,

    phase: Phase,
    sub_phase: SubPhase,
    ticker: Ticker,
    current: Option<QuestionItem>,
    banter_count: u32,
    sets: Option<StoredAssessments>,
    read_index: usize,
    test_answers: Vec<TestResponse>,
    review: Option<ReviewSequencer>,
    score: Option<ReviewScore>,
    media: MediaState,

    epoch: u64,
    seq: u64,
    in_flight: Option<InFlight>,
    failed: Option<PendingCall>,
    lock_until: Option<Instant>,
    follow_up: Option<(u64, Step)>,
    queue: VecDeque<Step>,

    results_tx: mpsc::UnboundedSender<CallResult>,
    receivers: Option<Receivers>,
}

impl PhaseController {
    pub fn new(
        config: Arc<SessionConfig>,
        lesson: Arc<Lesson>,
        learner_id: impl Into<String>,
        deps: SessionDeps,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let (results_tx, results) = mpsc::unbounded_channel();
        let (narration_tx, narration) = mpsc::unbounded_channel();
        let key = AssessmentKey::new(
            lesson.id.clone(),
            learner_id,
            config.targets.worksheet_length,
            config.targets.test_length,
        );
        Self {
            key,
            dialogue: deps.dialogue,
            assessments: deps.assessments,
            composer: ContextComposer::new(lesson.clone(), deps.prompts),
            ledger: GuardrailLedger::default(),
            supply: QuestionSupply::new(lesson.clone()),
            narrator: Narrator::new(deps.playback, config.captions, narration_tx),
            picker: CuePicker::new(),
            events,
            phase: Phase::Discussion,
            sub_phase: SubPhase::AwaitingBegin,
            ticker: Ticker::default(),
            current: None,
            banter_count: 0,
            sets: None,
            read_index: 0,
            test_answers: Vec::new(),
            review: None,
            score: None,
            media: MediaState::default(),
            epoch: 0,
            seq: 0,
            in_flight: None,
            failed: None,
            lock_until: None,
            follow_up: None,
            queue: VecDeque::new(),
            results_tx,
            receivers: Some(Receivers {
                results,
                narration,
            }),
            config,
            lesson,
        }
    }

    /// Replaces the session's random source, for reproducible question order.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.supply = QuestionSupply::with_rng(self.lesson.clone(), rng);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn sub_phase(&self) -> SubPhase {
        self.sub_phase
    }

    /// Runs the controller on its own task.
    pub fn spawn(self) -> SessionHandle {
        let (inbox_tx, inbox) = mpsc::channel(64);
        let task = tokio::spawn(self.run(inbox));
        SessionHandle {
            inbox: inbox_tx,
            task,
        }
    }

    pub async fn run(mut self, mut inbox: mpsc::Receiver<SessionInput>) {
        let Some(Receivers {
            mut results,
            mut narration,
        }) = self.receivers.take()
        else {
            return;
        };
        info!(lesson_id = %self.lesson.id, learner = %self.key.learner_id, "Session controller started");
        self.emit_phase();

        loop {
            tokio::select! {
                input = inbox.recv() => match input {
                    None | Some(SessionInput::Shutdown) => break,
                    Some(input) => self.handle_input(input).await,
                },
                Some(result) = results.recv() => self.handle_result(result).await,
                Some(event) = narration.recv() => self.handle_narration(event).await,
            }
            self.drain_queue().await;
        }

        self.abort_all().await;
        info!(lesson_id = %self.lesson.id, "Session controller stopped");
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn emit_phase(&self) {
        self.emit(SessionEvent::PhaseChanged {
            phase: self.phase,
            sub_phase: self.sub_phase,
            ticker: self.ticker,
        });
    }

    fn notice(&self, message: &str) {
        self.emit(SessionEvent::Notice(message.to_string()));
    }

    fn set_sub_phase(&mut self, sub_phase: SubPhase) {
        if self.sub_phase != sub_phase {
            debug!(phase = %self.phase, from = %self.sub_phase, to = %sub_phase, "Sub-phase change");
        }
        self.sub_phase = sub_phase;
        self.emit_phase();
    }

    fn is_locked(&self) -> bool {
        self.lock_until.is_some_and(|until| Instant::now() < until)
    }

    async fn handle_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::Begin => self.on_begin(),
            SessionInput::Reply(text) => self.on_reply(text).await,
            SessionInput::Skip => self.on_navigate(true).await,
            SessionInput::Back => self.on_navigate(false).await,
            SessionInput::Pause => {
                if !self.media.paused {
                    self.narrator.pause().await;
                    self.media.paused = true;
                    self.emit(SessionEvent::Media(self.media));
                }
            }
            SessionInput::Resume => {
                if self.media.paused {
                    self.narrator.resume().await;
                    self.media.paused = false;
                    self.emit(SessionEvent::Media(self.media));
                }
            }
            SessionInput::Mute(muted) => {
                self.narrator.set_muted(muted);
                self.media.muted = muted;
                self.emit(SessionEvent::Media(self.media));
            }
            SessionInput::UnlockAudio => self.narrator.unlock(),
            SessionInput::RefreshAssessments => self.on_refresh().await,
            SessionInput::Shutdown => {}
        }
    }

    fn on_begin(&mut self) {
        if self.sub_phase == SubPhase::AwaitingBegin {
            self.lock_until = None;
            self.queue.push_back(Step::StartPhase);
        } else if let Some(pending) = self.failed.take() {
            info!(phase = %self.phase, step = %pending.call.step, "Retrying failed dialogue call");
            self.send(pending);
        } else {
            debug!(phase = %self.phase, sub_phase = %self.sub_phase, "Begin ignored");
        }
    }

    async fn on_reply(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        let line = self.narrator.push_learner(&text);
        self.emit(SessionEvent::Transcript(line));

        match (self.phase, self.sub_phase) {
            (_, SubPhase::AwaitingBegin) => self.notice("Press begin when you're ready."),
            (Phase::Discussion, SubPhase::Start) => {
                self.banter_count += 1;
                let teach_next = self.banter_count >= self.config.banter_turns;
                self.dispatch(
                    Purpose::Banter { teach_next },
                    StepKind::Banter,
                    directives::banter(),
                    Some(text),
                );
            }
            (Phase::Discussion, SubPhase::AwaitingGate) => {
                if directives::wants_repeat(&text) {
                    self.set_sub_phase(SubPhase::Teaching);
                    self.dispatch(
                        Purpose::Teach,
                        StepKind::Teach,
                        directives::teach(&self.lesson, true),
                        Some(text),
                    );
                } else {
                    self.queue.push_back(Step::Advance);
                }
            }
            (Phase::Test, SubPhase::Active) => self.record_test_answer(text).await,
            (phase, SubPhase::Active) if phase.is_questioning() => match self.current.take() {
                Some(item) => {
                    let local = judge(&item, &text);
                    let directive = JudgeContract::for_item(&item).directive(&text);
                    self.dispatch(
                        Purpose::Judge { item, local },
                        StepKind::Judge,
                        directive,
                        Some(text),
                    );
                }
                None => self.notice("Hold on, the next question is on its way."),
            },
            (phase, sub_phase) => {
                debug!(%phase, %sub_phase, "Learner reply ignored in this step");
            }
        }
    }

    /// The test can't be left or restarted once its first question is out.
    fn test_in_progress(&self) -> bool {
        self.phase == Phase::Test && matches!(self.sub_phase, SubPhase::Active | SubPhase::Review)
    }

    async fn on_navigate(&mut self, forward: bool) {
        if self.test_in_progress() {
            info!(forward, "Navigation refused during the test");
            self.notice(FINISH_TEST_MESSAGE);
            return;
        }
        let target = if forward {
            self.phase.next()
        } else {
            self.phase.previous()
        };
        match target {
            Some(target) => self.force_phase(target).await,
            None => debug!(phase = %self.phase, forward, "No phase to navigate to"),
        }
    }

    async fn on_refresh(&mut self) {
        if self.test_in_progress() {
            info!("Assessment refresh refused during the test");
            self.notice(FINISH_TEST_MESSAGE);
            return;
        }
        match self
            .assessments
            .refresh(&self.lesson, &self.key, self.supply.rng())
            .await
        {
            Ok(sets) => {
                self.sets = Some(sets);
                self.read_index = 0;
                if matches!(self.phase, Phase::Worksheet | Phase::Test) {
                    self.force_phase(self.phase).await;
                }
                self.notice("Worksheet and test questions have been refreshed.");
            }
            Err(e) => {
                warn!(error = %e, "Assessment refresh failed");
                self.notice(NO_QUESTIONS_MESSAGE);
            }
        }
    }

    /// Cancels the in-flight call, stops narration and clears transient input.
    async fn abort_all(&mut self) {
        self.epoch += 1;
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel.cancel();
            debug!(step = %in_flight.pending.call.step, "Cancelled in-flight dialogue call");
        }
        self.failed = None;
        self.follow_up = None;
        self.queue.clear();
        self.current = None;
        self.narrator.stop_all().await;
        if self.media.paused {
            self.media.paused = false;
            self.emit(SessionEvent::Media(self.media));
        }
    }

    /// Skip/back: lands in the target phase's awaiting-begin step.
    async fn force_phase(&mut self, target: Phase) {
        info!(from = %self.phase, to = %target, "Forced phase change");
        self.abort_all().await;
        self.phase = target;
        self.ticker.reset();
        self.test_answers.clear();
        self.review = None;
        self.lock_until = Some(Instant::now() + self.config.awaiting_lock);
        self.set_sub_phase(SubPhase::AwaitingBegin);
    }

    async fn drain_queue(&mut self) {
        while let Some(step) = self.queue.pop_front() {
            self.run_step(step).await;
        }
    }

    async fn run_step(&mut self, step: Step) {
        match step {
            Step::StartPhase => self.start_phase().await,
            Step::StartTeaching => {
                self.set_sub_phase(SubPhase::Teaching);
                self.dispatch(
                    Purpose::Teach,
                    StepKind::Teach,
                    directives::teach(&self.lesson, false),
                    None,
                );
            }
            Step::AskNext => self.ask_next(),
            Step::Advance => self.advance(),
            Step::BeginReview => self.begin_review(),
            Step::NextReview => self.next_review(),
            Step::Finish => {
                self.assessments.discard(&self.key).await;
                info!(lesson_id = %self.lesson.id, "Lesson complete");
                self.emit(SessionEvent::Finished);
            }
        }
    }

    /// Natural progression: next phase, counters reset, started right away.
    fn advance(&mut self) {
        let Some(next) = self.phase.next() else {
            return;
        };
        info!(from = %self.phase, to = %next, ticker = ?self.ticker, "Advancing phase");
        self.phase = next;
        self.ticker.reset();
        self.current = None;
        self.queue.push_back(Step::StartPhase);
    }

    async fn start_phase(&mut self) {
        info!(phase = %self.phase, "Starting phase");
        match self.phase {
            Phase::Discussion => {
                self.banter_count = 0;
                self.set_sub_phase(SubPhase::Start);
                self.dispatch(
                    Purpose::Greeting,
                    StepKind::Greeting,
                    directives::greeting(&self.lesson),
                    None,
                );
            }
            Phase::Comprehension | Phase::Exercise => {
                self.set_sub_phase(SubPhase::Active);
                self.ask_next();
            }
            Phase::Worksheet => {
                if self.ensure_sets().await {
                    self.read_index = 0;
                    self.set_sub_phase(SubPhase::Active);
                    self.ask_next();
                }
            }
            Phase::Test => {
                if self.ensure_sets().await {
                    self.read_index = 0;
                    self.test_answers.clear();
                    self.review = None;
                    self.set_sub_phase(SubPhase::Active);
                    self.present_test_question().await;
                }
            }
            Phase::Congrats => {
                self.set_sub_phase(SubPhase::Start);
                let instruction = match &self.score {
                    Some(score) => closing_instruction(score, &self.lesson.title),
                    None => directives::closing_without_score(&self.lesson),
                };
                self.dispatch(Purpose::Closing, StepKind::Closing, instruction, None);
            }
        }
    }

    fn stall(&mut self, message: &str) {
        self.set_sub_phase(SubPhase::AwaitingBegin);
        self.notice(message);
    }

    async fn ensure_sets(&mut self) -> bool {
        if self.sets.is_some() {
            return true;
        }
        match self
            .assessments
            .ensure(&self.lesson, &self.key, self.supply.rng())
            .await
        {
            Ok(sets) => {
                self.sets = Some(sets);
                true
            }
            Err(e) => {
                warn!(error = %e, "Could not build assessment sets");
                self.stall(NO_QUESTIONS_MESSAGE);
                false
            }
        }
    }

    fn ask_next(&mut self) {
        let next = match self.phase {
            Phase::Comprehension => self.supply.next_comprehension().ok(),
            Phase::Exercise => self.supply.next_exercise().ok(),
            Phase::Worksheet => self
                .sets
                .as_ref()
                .and_then(|s| s.worksheet.get(self.read_index).cloned()),
            _ => return,
        };
        match next {
            Some(item) => {
                let instruction = directives::ask(&item, self.phase);
                self.dispatch(Purpose::Ask(item), StepKind::Ask, instruction, None);
            }
            None => {
                warn!(phase = %self.phase, "No question available");
                self.stall(NO_QUESTIONS_MESSAGE);
            }
        }
    }

    async fn present_test_question(&mut self) {
        let Some(test) = self.sets.as_ref().map(|s| s.test.clone()) else {
            return;
        };
        match test.get(self.read_index) {
            Some(item) => {
                let text = directives::test_question(item, self.read_index + 1, test.len());
                self.current = Some(item.clone());
                let presented = self.narrator.present(&text, None).await;
                for line in presented.lines {
                    self.emit(SessionEvent::Transcript(line));
                }
                self.emit(SessionEvent::AwaitingLearner);
            }
            None => self.queue.push_back(Step::BeginReview),
        }
    }

    async fn record_test_answer(&mut self, answer: String) {
        let Some(item) = self.current.take() else {
            self.notice("Hold on, the next question is on its way.");
            return;
        };
        debug!(question = self.read_index + 1, "Recorded test answer");
        self.test_answers.push(TestResponse { item, answer });
        self.read_index += 1;
        self.present_test_question().await;
    }

    fn begin_review(&mut self) {
        self.set_sub_phase(SubPhase::Review);
        let responses = std::mem::take(&mut self.test_answers);
        info!(questions = responses.len(), strategy = ?self.config.review_strategy, "Starting test review");
        self.review = Some(ReviewSequencer::new(
            self.config.review_strategy,
            responses,
            &mut self.picker,
            self.supply.rng(),
        ));
        self.queue.push_back(Step::NextReview);
    }

    fn next_review(&mut self) {
        let Some(review) = self.review.as_mut() else {
            return;
        };
        let directive = review.next_directive();
        let done = review.is_complete();
        let score = review.score();
        match directive {
            Some(directive) => {
                let mut hygiene = ReplyHygiene::for_step(directive.step);
                if let Some(cue) = directive.required_cue {
                    hygiene = hygiene.with_cue(cue);
                }
                self.dispatch_with(
                    Purpose::Review,
                    directive.step,
                    directive.instruction,
                    None,
                    hygiene,
                );
            }
            None if done => {
                info!(correct = score.correct, total = score.total, percent = score.percent, "Test scored");
                self.score = Some(score);
                self.emit(SessionEvent::Score(score));
                self.advance();
            }
            None => {}
        }
    }

    fn dispatch(&mut self, purpose: Purpose, step: StepKind, instruction: String, utterance: Option<String>) {
        self.dispatch_with(purpose, step, instruction, utterance, ReplyHygiene::for_step(step));
    }

    fn dispatch_with(
        &mut self,
        purpose: Purpose,
        step: StepKind,
        instruction: String,
        utterance: Option<String>,
        hygiene: ReplyHygiene,
    ) {
        let request = DialogueRequest {
            context: self
                .composer
                .compose(self.phase, self.ledger.needs(self.phase)),
            instruction,
            utterance,
            metadata: SessionMetadata {
                phase: self.phase,
                sub_phase: self.sub_phase,
                lesson_id: self.lesson.id.clone(),
                ticker: self.ticker,
            },
        };
        let call = DialogueCall::new(step, request).with_hygiene(hygiene);
        self.send(PendingCall { purpose, call });
    }

    /// Starts a call, superseding any call still in flight.
    fn send(&mut self, pending: PendingCall) {
        if let Some(previous) = self.in_flight.take() {
            debug!(step = %previous.pending.call.step, "Superseding in-flight dialogue call");
            previous.cancel.cancel();
        }
        self.seq += 1;
        let ticket = Ticket {
            epoch: self.epoch,
            seq: self.seq,
        };
        let cancel = CancellationToken::new();
        let client = self.dialogue.clone();
        let results = self.results_tx.clone();
        let call = pending.call.clone();
        let token = cancel.clone();
        let phase = self.phase;
        debug!(step = %call.step, %phase, seq = ticket.seq, "Dispatching dialogue call");
        tokio::spawn(async move {
            let result = client.send(call, token).await;
            let _ = results.send(CallResult {
                ticket,
                phase,
                result,
            });
        });
        self.in_flight = Some(InFlight {
            ticket,
            cancel,
            pending,
        });
    }

    async fn handle_result(&mut self, result: CallResult) {
        let current = self.in_flight.as_ref().map(|f| f.ticket);
        if result.ticket.epoch != self.epoch || current != Some(result.ticket) {
            debug!(epoch = result.ticket.epoch, seq = result.ticket.seq, "Dropping stale dialogue result");
            return;
        }
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };
        if self.is_locked() {
            info!(step = %in_flight.pending.call.step, "Awaiting lock active, dropping dialogue result");
            return;
        }
        match result.result {
            Ok(reply) => {
                self.ledger.mark(result.phase);
                self.failed = None;
                self.on_dialogue_reply(in_flight.pending.purpose, reply).await;
            }
            Err(e) if e.is_aborted() => {
                debug!(step = %in_flight.pending.call.step, "Dialogue call aborted");
            }
            Err(e) => {
                warn!(step = %in_flight.pending.call.step, error = %e, "Dialogue call failed");
                self.failed = Some(in_flight.pending);
                self.emit(SessionEvent::Unavailable(UNAVAILABLE_MESSAGE.to_string()));
            }
        }
    }

    async fn on_dialogue_reply(&mut self, purpose: Purpose, reply: DialogueReply) {
        let presented = self.narrator.present(&reply.text, reply.speech).await;
        for line in presented.lines {
            self.emit(SessionEvent::Transcript(line));
        }
        let batch = presented.batch;

        match purpose {
            Purpose::Greeting => {
                if self.config.banter_turns == 0 {
                    self.follow_up = Some((batch, Step::StartTeaching));
                } else {
                    self.emit(SessionEvent::AwaitingLearner);
                }
            }
            Purpose::Banter { teach_next } => {
                if teach_next {
                    self.follow_up = Some((batch, Step::StartTeaching));
                } else {
                    self.emit(SessionEvent::AwaitingLearner);
                }
            }
            Purpose::Teach => {
                self.set_sub_phase(SubPhase::AwaitingGate);
                self.emit(SessionEvent::AwaitingLearner);
            }
            Purpose::Ask(item) => {
                self.current = Some(item);
                self.emit(SessionEvent::AwaitingLearner);
            }
            Purpose::Judge { item, local } => {
                let correct = self.read_verdict(&item, local, &reply.text);
                self.ticker.record(correct);
                let next = self.after_judgment();
                self.emit_phase();
                self.follow_up = Some((batch, next));
            }
            Purpose::Review => {
                if let Some(review) = self.review.as_mut() {
                    review.record_reply(&reply.text);
                }
                self.follow_up = Some((batch, Step::NextReview));
            }
            Purpose::Closing => {
                self.set_sub_phase(SubPhase::Complete);
                self.follow_up = Some((batch, Step::Finish));
            }
        }
    }

    /// The model's lead-in decides; the local judge only cross-checks.
    fn read_verdict(&self, item: &QuestionItem, local: Judgment, reply: &str) -> bool {
        let lead_in = read_lead_in(reply);
        if lead_in == LeadIn::Missing {
            warn!(prompt = %item.prompt, "Judged reply has no lead-in, counting it as incorrect");
        }
        let correct = lead_in.is_correct();
        if correct != local.correct {
            warn!(
                prompt = %item.prompt,
                mode = ?local.mode,
                local = local.correct,
                model = correct,
                "Local judge disagrees with dialogue verdict"
            );
        }
        correct
    }

    fn after_judgment(&mut self) -> Step {
        let targets = &self.config.targets;
        match self.phase {
            Phase::Comprehension if self.ticker.correct >= targets.comprehension => Step::Advance,
            Phase::Exercise if self.ticker.correct >= targets.exercise => Step::Advance,
            Phase::Worksheet => {
                self.read_index += 1;
                let total = self.sets.as_ref().map_or(0, |s| s.worksheet.len());
                if self.read_index >= total {
                    Step::Advance
                } else {
                    Step::AskNext
                }
            }
            _ => Step::AskNext,
        }
    }

    async fn handle_narration(&mut self, event: NarrationEvent) {
        if Some(event.batch()) != self.narrator.current_batch() {
            debug!(batch = event.batch(), "Dropping narration event from a superseded batch");
            return;
        }
        match event {
            NarrationEvent::Caption { batch, index, text } => {
                self.emit(SessionEvent::Caption { batch, index, text });
            }
            NarrationEvent::Finished { batch } => match self.follow_up.take() {
                Some((expected, step)) if expected == batch => self.queue.push_back(step),
                other => self.follow_up = other,
            },
            NarrationEvent::Playback { batch, outcome } => match outcome {
                PlaybackOutcome::NeedsGesture => self.emit(SessionEvent::SoundBlocked),
                PlaybackOutcome::Playing(strategy) => debug!(batch, strategy, "Audio playing"),
                PlaybackOutcome::CaptionOnly => debug!(batch, "Captions only for this reply"),
            },
        }
    }
}

/// Sends input to a running controller.
pub struct SessionHandle {
    inbox: mpsc::Sender<SessionInput>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub async fn send(&self, input: SessionInput) -> Result<(), ControllerError> {
        self.inbox
            .send(input)
            .await
            .map_err(|_| ControllerError::Closed)
    }

    /// Stops the controller and waits for it to wind down.
    pub async fn shutdown(self) {
        let _ = self.inbox.send(SessionInput::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Session controller task ended abnormally");
        }
    }
}
